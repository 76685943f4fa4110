use std::sync::Arc;

use chrono::Duration;
use futures::stream::{self, StreamExt};
use log::*;
use tokio::task::JoinHandle;

use crate::auth::{AuthWatcher, SessionProvider, SessionState};
use crate::db::Database;
use crate::error::{Result, SyncError};
use crate::models::PendingAction;
use crate::repos::episodes::{EPISODE_WATCHES_MAX_AGE_HOURS, SHOW_SEASONS_MAX_AGE_DAYS};
use crate::repos::followed::FOLLOWED_SHOWS_MAX_AGE_HOURS;
use crate::repos::shows::SHOW_DETAILS_MAX_AGE;
use crate::repos::{FollowedShowsRepository, SeasonsEpisodesRepository, SeasonsSource, ShowRepository};
use crate::sources::DataSources;

/// How often each kind of data is refetched, and how many shows refresh at once.
#[derive(Clone, Copy, Debug)]
pub struct SyncSettings {
    pub seasons_source: SeasonsSource,
    pub followed_shows_max_age: Duration,
    pub show_details_max_age: Duration,
    pub show_seasons_max_age: Duration,
    pub episode_watches_max_age: Duration,
    pub concurrency: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            seasons_source: SeasonsSource::default(),
            followed_shows_max_age: Duration::hours(FOLLOWED_SHOWS_MAX_AGE_HOURS),
            show_details_max_age: Duration::days(SHOW_DETAILS_MAX_AGE),
            show_seasons_max_age: Duration::days(SHOW_SEASONS_MAX_AGE_DAYS),
            episode_watches_max_age: Duration::hours(EPISODE_WATCHES_MAX_AGE_HOURS),
            concurrency: 4,
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub followed_synced: bool,
    pub shows_refreshed: usize,
    pub failures: usize,
}

/// Owns the repositories and drives whole-library refreshes.
pub struct SyncManager {
    pub shows: ShowRepository,
    pub followed: FollowedShowsRepository,
    pub episodes: SeasonsEpisodesRepository,
    session: Arc<SessionProvider>,
    settings: SyncSettings,
}

impl SyncManager {
    pub fn new(
        db: Database,
        sources: DataSources,
        session: Arc<SessionProvider>,
        settings: SyncSettings,
    ) -> SyncManager {
        let state: Arc<dyn SessionState> = session.clone();
        SyncManager {
            shows: ShowRepository::new(db.clone(), &sources),
            followed: FollowedShowsRepository::new(db.clone(), &sources, state.clone()),
            episodes: SeasonsEpisodesRepository::new(db, &sources, state, settings.seasons_source),
            session,
            settings,
        }
    }

    pub fn session(&self) -> &SessionProvider {
        &self.session
    }

    /// Sync the followed list if it is due, then refresh every followed show whose data is
    /// due. One show failing doesn't stop the others; a 401 anywhere logs the session out.
    pub async fn refresh_all(&self) -> Result<RefreshSummary> {
        let mut summary = RefreshSummary::default();

        if self
            .followed
            .needs_followed_shows_sync(Some(self.settings.followed_shows_max_age))
            .await?
        {
            match self.followed.sync_followed_shows().await {
                Ok(result) => {
                    debug!(
                        "Followed shows synced: {} added, {} deleted",
                        result.added.len(),
                        result.deleted.len()
                    );
                    summary.followed_synced = true;
                }
                Err(err) => {
                    self.handle_failure(&err);
                    if err.is_unauthorized() {
                        return Err(err);
                    }
                    warn!("Followed shows sync failed: {}", err);
                    summary.failures += 1;
                }
            }
        }

        let show_ids: Vec<i64> = self
            .followed
            .get_followed_shows()
            .await?
            .into_iter()
            .filter(|entry| entry.pending_action != PendingAction::Delete)
            .map(|entry| entry.show_id)
            .collect();

        let results: Vec<(i64, Result<()>)> = stream::iter(show_ids)
            .map(|show_id| async move { (show_id, self.refresh_show(show_id).await) })
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        for (show_id, result) in results {
            match result {
                Ok(()) => summary.shows_refreshed += 1,
                Err(err) => {
                    warn!("Refreshing show {} failed: {}", show_id, err);
                    self.handle_failure(&err);
                    summary.failures += 1;
                }
            }
        }

        info!(
            "Refresh done: {} shows refreshed, {} failures",
            summary.shows_refreshed, summary.failures
        );
        Ok(summary)
    }

    /// Details, then seasons, then (when logged in) watches, each only if due.
    pub async fn refresh_show(&self, show_id: i64) -> Result<()> {
        let settings = &self.settings;

        if self
            .shows
            .needs_update(show_id, Some(settings.show_details_max_age))
            .await?
        {
            self.shows.update_show(show_id).await?;
        }

        if self
            .episodes
            .needs_show_seasons_update(show_id, Some(settings.show_seasons_max_age))
            .await?
        {
            self.episodes.update_seasons_episodes(show_id).await?;
        }

        if self.session.is_logged_in()
            && self
                .episodes
                .needs_show_episode_watches_sync(show_id, Some(settings.episode_watches_max_age))
                .await?
        {
            self.episodes.sync_episode_watches_for_show(show_id).await?;
        }

        Ok(())
    }

    fn handle_failure(&self, err: &SyncError) {
        if err.is_unauthorized() {
            warn!("Trakt rejected our credentials, logging out");
            self.session.logout();
        }
    }

    /// Run [`Self::refresh_all`] every time the user logs in.
    pub fn refresh_on_login(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        AuthWatcher::spawn(self.session.clone(), move || {
            let manager = manager.clone();
            async move {
                if let Err(err) = manager.refresh_all().await {
                    error!("Refresh after login failed: {}", err);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthState;
    use crate::models::{FollowedShowEntry, Show};
    use crate::test_utils::*;

    fn manager(fakes: &Fakes) -> SyncManager {
        SyncManager::new(
            Database::in_memory().unwrap(),
            fakes.data_sources(),
            fakes.session.clone(),
            SyncSettings::default(),
        )
    }

    fn follow_remote_show(fakes: &Fakes) {
        fakes.followed.list_shows.set(Ok(vec![(
            FollowedShowEntry {
                trakt_id: Some(11),
                ..Default::default()
            },
            trakt_show(1, "Placeholder"),
        )]));
        fakes.trakt_shows.show.set(Ok(Show {
            summary: Some("A missing child".to_string()),
            ..trakt_show(1, "Dark")
        }));
        fakes
            .trakt_seasons
            .seasons
            .set(Ok(vec![(remote_season(101, 1), vec![remote_episode(1001, 1)])]));
        fakes.watches.watches.set(Ok(vec![remote_watch(1001, 500)]));
    }

    #[tokio::test]
    async fn refresh_pulls_everything_for_followed_shows() {
        let fakes = Fakes::new();
        follow_remote_show(&fakes);
        let manager = manager(&fakes);

        let summary = manager.refresh_all().await.unwrap();

        assert_eq!(
            summary,
            RefreshSummary {
                followed_synced: true,
                shows_refreshed: 1,
                failures: 0,
            }
        );
        let show_id = manager.followed.get_followed_shows().await.unwrap()[0].show_id;
        let show = manager.shows.get_show(show_id).await.unwrap();
        assert_eq!(show.title.as_deref(), Some("Dark"));
        let seasons = manager.episodes.seasons_with_episodes(show_id).await.unwrap();
        assert_eq!(seasons.len(), 1);
        assert_eq!(seasons[0].1.len(), 1);
        let watches = manager.episodes.episode_watches_for_show(show_id).await.unwrap();
        assert_eq!(watches.len(), 1);
    }

    #[tokio::test]
    async fn fresh_data_is_not_refetched() {
        let fakes = Fakes::new();
        follow_remote_show(&fakes);
        let manager = manager(&fakes);
        manager.refresh_all().await.unwrap();

        fakes.trakt_shows.show.set(Ok(trakt_show(1, "Changed")));
        let summary = manager.refresh_all().await.unwrap();

        assert!(!summary.followed_synced);
        let show_id = manager.followed.get_followed_shows().await.unwrap()[0].show_id;
        let show = manager.shows.get_show(show_id).await.unwrap();
        assert_eq!(show.title.as_deref(), Some("Dark"));
    }

    #[tokio::test]
    async fn unauthorized_logs_out() {
        let fakes = Fakes::new();
        follow_remote_show(&fakes);
        fakes.trakt_shows.show.set(Err(401));
        let manager = manager(&fakes);

        let summary = manager.refresh_all().await.unwrap();

        assert_eq!(summary.failures, 1);
        assert_eq!(manager.session().current_state(), AuthState::LoggedOut);
    }

    #[tokio::test]
    async fn one_failing_show_does_not_stop_others() {
        let fakes = Fakes::new();
        fakes.followed.list_shows.set(Ok(vec![
            (FollowedShowEntry::default(), trakt_show(1, "One")),
            (FollowedShowEntry::default(), trakt_show(2, "Two")),
        ]));
        fakes.trakt_shows.show.set(Err(500));
        fakes.tmdb_shows.show.set(Err(500));
        let manager = manager(&fakes);

        let summary = manager.refresh_all().await.unwrap();

        assert!(summary.followed_synced);
        assert_eq!(summary.failures, 2);
        assert_eq!(manager.followed.get_followed_shows().await.unwrap().len(), 2);
        assert_eq!(manager.session().current_state(), AuthState::LoggedIn);
    }

    #[tokio::test]
    async fn logging_in_triggers_refresh() {
        let fakes = Fakes::new();
        fakes.session.logout();
        follow_remote_show(&fakes);
        let manager = Arc::new(manager(&fakes));
        let _watcher = manager.refresh_on_login();

        fakes.session.login();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        assert_eq!(manager.followed.get_followed_shows().await.unwrap().len(), 1);
    }
}
