use diesel::prelude::*;
use log::*;

use crate::db::entity::{entity_dao, EntityDao};
use crate::db::{FollowedShowsDao, SeasonsDao};
use crate::models::Show;
use crate::schema::shows;
use crate::sync::merge::merge_show;

pub struct ShowDao;

entity_dao!(ShowDao, Show, shows, "show");

impl ShowDao {
    pub fn all(conn: &mut SqliteConnection) -> QueryResult<Vec<Show>> {
        shows::table
            .order(shows::id)
            .select(Show::as_select())
            .load(conn)
    }

    pub fn show_with_id(conn: &mut SqliteConnection, id: i64) -> QueryResult<Option<Show>> {
        Self::entity_with_id(conn, id)
    }

    pub fn shows_with_ids(conn: &mut SqliteConnection, ids: &[i64]) -> QueryResult<Vec<Show>> {
        shows::table
            .filter(shows::id.eq_any(ids))
            .order(shows::id)
            .select(Show::as_select())
            .load(conn)
    }

    pub fn show_with_trakt_id(
        conn: &mut SqliteConnection,
        trakt_id: i32,
    ) -> QueryResult<Option<Show>> {
        shows::table
            .filter(shows::trakt_id.eq(trakt_id))
            .select(Show::as_select())
            .first(conn)
            .optional()
    }

    pub fn show_with_tmdb_id(
        conn: &mut SqliteConnection,
        tmdb_id: i32,
    ) -> QueryResult<Option<Show>> {
        shows::table
            .filter(shows::tmdb_id.eq(tmdb_id))
            .select(Show::as_select())
            .first(conn)
            .optional()
    }

    pub fn id_for_trakt_id(conn: &mut SqliteConnection, trakt_id: i32) -> QueryResult<Option<i64>> {
        shows::table
            .filter(shows::trakt_id.eq(trakt_id))
            .select(shows::id)
            .first(conn)
            .optional()
    }

    pub fn id_for_tmdb_id(conn: &mut SqliteConnection, tmdb_id: i32) -> QueryResult<Option<i64>> {
        shows::table
            .filter(shows::tmdb_id.eq(tmdb_id))
            .select(shows::id)
            .first(conn)
            .optional()
    }

    pub fn delete(conn: &mut SqliteConnection, id: i64) -> QueryResult<usize> {
        diesel::delete(shows::table.find(id)).execute(conn)
    }

    /// Resolve a show known only by its external ids to a single local id.
    ///
    /// Two different rows claiming the ids (one by Trakt id, one by TMDb id) are merged into
    /// the Trakt row and the TMDb row is removed. Unknown shows are saved as given.
    /// Run inside a transaction.
    pub fn get_id_or_save_placeholder(conn: &mut SqliteConnection, show: &Show) -> QueryResult<i64> {
        let id_for_trakt_id = match show.trakt_id {
            Some(trakt_id) => Self::id_for_trakt_id(conn, trakt_id)?,
            None => None,
        };
        let id_for_tmdb_id = match show.tmdb_id {
            Some(tmdb_id) => Self::id_for_tmdb_id(conn, tmdb_id)?,
            None => None,
        };

        match (id_for_trakt_id, id_for_tmdb_id) {
            (Some(trakt_row), Some(tmdb_row)) if trakt_row == tmdb_row => Ok(trakt_row),
            (Some(trakt_row), Some(tmdb_row)) => {
                let for_trakt = Self::find_or_not_found(conn, trakt_row)?;
                let for_tmdb = Self::find_or_not_found(conn, tmdb_row)?;
                info!(
                    "Shows {} and {} are the same show, merging into {}",
                    trakt_row, tmdb_row, trakt_row
                );

                let merged = merge_show(&for_trakt, &for_trakt, &for_tmdb);
                Self::remove_duplicate(conn, &for_tmdb, merged.id)?;
                Self::upsert(conn, &merged)
            }
            (Some(id), None) | (None, Some(id)) => Ok(id),
            (None, None) => {
                let placeholder = Show {
                    id: 0,
                    ..show.clone()
                };
                let id = Self::insert(conn, &placeholder)?;
                debug!("Saved placeholder show {} for {:?}", id, show.title);
                Ok(id)
            }
        }
    }

    /// Upsert that folds any other row holding the same Trakt or TMDb id into this one.
    /// Run inside a transaction.
    pub fn save(conn: &mut SqliteConnection, show: &Show) -> QueryResult<i64> {
        Self::upsert_or_else(conn, show, Self::merge_conflicting)
    }

    fn merge_conflicting(conn: &mut SqliteConnection, show: &Show) -> QueryResult<i64> {
        let mut others: Vec<Show> = shows::table
            .filter(shows::id.ne(show.id))
            .filter(
                shows::trakt_id
                    .eq(show.trakt_id)
                    .or(shows::tmdb_id.eq(show.tmdb_id)),
            )
            .order(shows::id)
            .select(Show::as_select())
            .load(conn)?;

        if others.is_empty() {
            // not an identity clash, let the original error surface
            return Self::upsert(conn, show);
        }

        let mut merged = if show.id == 0 {
            let first = others.remove(0);
            merge_show(&first, show, show)
        } else {
            show.clone()
        };

        for dup in others {
            info!("Show {} duplicates show {}, merging", dup.id, merged.id);
            merged = Show {
                id: merged.id,
                ..merge_show(&dup, &merged, &merged)
            };
            Self::remove_duplicate(conn, &dup, merged.id)?;
        }

        Self::upsert(conn, &merged)
    }

    /// Move everything hanging off `dup` onto `survivor`, then delete `dup`.
    fn remove_duplicate(conn: &mut SqliteConnection, dup: &Show, survivor: i64) -> QueryResult<()> {
        SeasonsDao::reassign_show(conn, dup.id, survivor)?;
        FollowedShowsDao::reassign_show(conn, dup.id, survivor)?;
        Self::delete_entity(conn, dup)?;
        Ok(())
    }

    fn find_or_not_found(conn: &mut SqliteConnection, id: i64) -> QueryResult<Show> {
        Self::entity_with_id(conn, id)?.ok_or(diesel::result::Error::NotFound)
    }
}
