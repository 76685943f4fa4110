use std::sync::Arc;

use chrono::Duration;
use log::*;

use crate::db::{Database, ShowDao};
use crate::error::{Result, StorageResultExt, SyncError};
use crate::models::{Request, Show};
use crate::repos::last_request::LastRequestStore;
use crate::sources::{DataSources, ShowDataSource};
use crate::sync::merge::merge_show;

pub const SHOW_DETAILS_MAX_AGE: i64 = 7;

pub struct ShowRepository {
    db: Database,
    trakt: Arc<dyn ShowDataSource>,
    tmdb: Arc<dyn ShowDataSource>,
    last_requests: LastRequestStore,
}

impl ShowRepository {
    pub fn new(db: Database, sources: &DataSources) -> ShowRepository {
        ShowRepository {
            last_requests: LastRequestStore::new(db.clone(), Request::ShowDetails),
            trakt: sources.trakt_shows.clone(),
            tmdb: sources.tmdb_shows.clone(),
            db,
        }
    }

    pub async fn get_show(&self, show_id: i64) -> Result<Show> {
        self.db
            .run(move |conn| {
                ShowDao::show_with_id(conn, show_id)
                    .storage_context(|| format!("reading show {}", show_id))?
                    .ok_or_else(|| SyncError::not_found("show", show_id))
            })
            .await
    }

    /// Local id for a show known by its external ids, saving it if it is new.
    pub async fn get_id_or_save_placeholder(&self, show: &Show) -> Result<i64> {
        let show = show.clone();
        self.db
            .transaction(move |conn| {
                ShowDao::get_id_or_save_placeholder(conn, &show)
                    .storage_context(|| format!("resolving show {:?}", show.trakt_id))
            })
            .await
    }

    /// Due when never fetched, or fetched longer than `max_age` (default 7 days) ago.
    pub async fn needs_update(&self, show_id: i64, max_age: Option<Duration>) -> Result<bool> {
        let max_age = max_age.unwrap_or_else(|| Duration::days(SHOW_DETAILS_MAX_AGE));
        self.last_requests.is_request_expired(show_id, max_age).await
    }

    pub async fn needs_initial_update(&self, show_id: i64) -> Result<bool> {
        Ok(!self.last_requests.has_been_requested(show_id).await?)
    }

    /// Fetch Trakt and TMDb details concurrently and merge them into the stored show.
    ///
    /// One source failing is logged and ignored; both failing is [`SyncError::NoData`] and
    /// leaves the row untouched. The throttle only advances when Trakt answered.
    pub async fn update_show(&self, show_id: i64) -> Result<Show> {
        let local = self.get_show(show_id).await?;

        let (trakt, tmdb) = tokio::join!(self.trakt.get_show(&local), self.tmdb.get_show(&local));

        if let Err(SyncError::Unauthorized) = trakt {
            return Err(SyncError::Unauthorized);
        }
        let trakt = ok_or_log(trakt, "Trakt", show_id);
        let tmdb = ok_or_log(tmdb, "TMDb", show_id);
        let trakt_answered = trakt.is_some();

        if trakt.is_none() && tmdb.is_none() {
            return Err(SyncError::NoData(format!("show {}", show_id)));
        }

        let saved = self
            .db
            .transaction(move |conn| {
                // re-read inside the transaction, the row may have changed while we fetched
                let local = ShowDao::show_with_id(conn, show_id)
                    .storage_context(|| format!("reading show {}", show_id))?
                    .ok_or_else(|| SyncError::not_found("show", show_id))?;

                let merged = merge_show(
                    &local,
                    trakt.as_ref().unwrap_or(&Show::EMPTY),
                    tmdb.as_ref().unwrap_or(&Show::EMPTY),
                );
                let id = ShowDao::save(conn, &merged)
                    .storage_context(|| format!("saving show {}", show_id))?;
                Ok(Show { id, ..merged })
            })
            .await?;

        if trakt_answered {
            self.last_requests.update_last_request(show_id).await?;
        }

        info!("Updated show {} ({:?})", show_id, saved.title);
        Ok(saved)
    }
}

fn ok_or_log<T>(result: Result<T>, source: &str, show_id: i64) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("{} fetch for show {} failed: {}", source, show_id, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::EntityDao;
    use crate::test_utils::*;

    async fn setup(fakes: &Fakes) -> (ShowRepository, Database, i64) {
        let db = Database::in_memory().unwrap();
        let id = db
            .run(|conn| Ok(ShowDao::insert(conn, &trakt_show(1, "Local"))?))
            .await
            .unwrap();
        (ShowRepository::new(db.clone(), &fakes.data_sources()), db, id)
    }

    #[tokio::test]
    async fn update_merges_both_sources() {
        let fakes = Fakes::new();
        fakes.trakt_shows.show.set(Ok(Show {
            title: Some("Dark".to_string()),
            tmdb_id: Some(70523),
            ..trakt_show(1, "Dark")
        }));
        fakes.tmdb_shows.show.set(Ok(Show {
            title: Some("Ignored".to_string()),
            tmdb_poster_path: Some("/poster.jpg".to_string()),
            ..Show::EMPTY
        }));
        let (repo, _, id) = setup(&fakes).await;

        let show = repo.update_show(id).await.unwrap();

        assert_eq!(show.id, id);
        assert_eq!(show.title.as_deref(), Some("Dark"));
        assert_eq!(show.tmdb_id, Some(70523));
        assert_eq!(show.tmdb_poster_path.as_deref(), Some("/poster.jpg"));
        assert_eq!(repo.get_show(id).await.unwrap(), show);
        assert!(!repo.needs_update(id, None).await.unwrap());
    }

    #[tokio::test]
    async fn one_failing_source_still_updates() {
        let fakes = Fakes::new();
        fakes.trakt_shows.show.set(Err(503));
        fakes.tmdb_shows.show.set(Ok(Show {
            tmdb_backdrop_path: Some("/backdrop.jpg".to_string()),
            ..Show::EMPTY
        }));
        let (repo, _, id) = setup(&fakes).await;

        let show = repo.update_show(id).await.unwrap();

        assert_eq!(show.title.as_deref(), Some("Local"));
        assert_eq!(show.tmdb_backdrop_path.as_deref(), Some("/backdrop.jpg"));
        // only a Trakt answer counts as a refresh
        assert!(repo.needs_update(id, None).await.unwrap());
    }

    #[tokio::test]
    async fn both_sources_failing_is_no_data() {
        let fakes = Fakes::new();
        fakes.trakt_shows.show.set(Err(500));
        fakes.tmdb_shows.show.set(Err(404));
        let (repo, _, id) = setup(&fakes).await;

        let err = repo.update_show(id).await.unwrap_err();

        assert!(matches!(err, SyncError::NoData(_)));
        assert_eq!(repo.get_show(id).await.unwrap().title.as_deref(), Some("Local"));
        assert!(repo.needs_initial_update(id).await.unwrap());
    }

    #[tokio::test]
    async fn unauthorized_is_surfaced() {
        let fakes = Fakes::new();
        fakes.trakt_shows.show.set(Err(401));
        let (repo, _, id) = setup(&fakes).await;

        assert!(repo.update_show(id).await.unwrap_err().is_unauthorized());
    }

    #[tokio::test]
    async fn update_folds_in_a_row_with_the_same_tmdb_id() {
        let fakes = Fakes::new();
        fakes.trakt_shows.show.set(Ok(Show {
            tmdb_id: Some(500),
            ..trakt_show(1, "Dark")
        }));
        let (repo, db, id) = setup(&fakes).await;
        let dup = db
            .run(|conn| {
                Ok(ShowDao::insert(
                    conn,
                    &Show {
                        tmdb_id: Some(500),
                        tmdb_poster_path: Some("/dup.jpg".to_string()),
                        ..Show::EMPTY
                    },
                )?)
            })
            .await
            .unwrap();

        let show = repo.update_show(id).await.unwrap();

        assert_eq!(show.id, id);
        assert!(matches!(
            repo.get_show(dup).await,
            Err(SyncError::NotFound { .. })
        ));
        let all = db.run(|conn| Ok(ShowDao::all(conn)?)).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].tmdb_poster_path.as_deref(), Some("/dup.jpg"));
    }
}
