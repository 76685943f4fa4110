/// The remote side of every sync, as seen by the repositories.
///
/// Implementations return plain local-model values (ids left at 0, pending actions at
/// `Nothing`) or fail; retrying is their business, not the caller's.
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Episode, EpisodeWatchEntry, FollowedShowEntry, Season, Show};
use crate::tmdb::TmdbApi;
use crate::trakt::TraktApi;

#[async_trait]
pub trait ShowDataSource: Send + Sync {
    async fn get_show(&self, show: &Show) -> Result<Show>;
}

#[async_trait]
pub trait SeasonsEpisodesDataSource: Send + Sync {
    /// Every season of the show with its episodes.
    async fn get_seasons_episodes(&self, show: &Show) -> Result<Vec<(Season, Vec<Episode>)>>;

    async fn get_season(&self, show: &Show, season_number: i32) -> Result<Season>;
}

#[async_trait]
pub trait EpisodeDataSource: Send + Sync {
    async fn get_episode(
        &self,
        show: &Show,
        season_number: i32,
        episode_number: i32,
    ) -> Result<Episode>;
}

#[async_trait]
pub trait EpisodeWatchesDataSource: Send + Sync {
    /// Watch history of a show, newest first. With `since`, only watches after it.
    /// The episode half of each pair only carries the episode's external ids.
    async fn get_show_episode_watches(
        &self,
        show: &Show,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<(Episode, EpisodeWatchEntry)>>;

    async fn add_episode_watches(&self, watches: &[(Episode, EpisodeWatchEntry)]) -> Result<()>;

    /// Removes by remote history id; entries without one are ignored.
    async fn remove_episode_watches(&self, watches: &[EpisodeWatchEntry]) -> Result<()>;
}

#[async_trait]
pub trait FollowedShowsDataSource: Send + Sync {
    /// Id of the remote list backing "followed shows", created if it doesn't exist yet.
    async fn get_followed_list_id(&self) -> Result<i64>;

    async fn get_list_shows(&self, list_id: i64) -> Result<Vec<(FollowedShowEntry, Show)>>;

    async fn add_show_ids_to_list(&self, list_id: i64, shows: &[Show]) -> Result<()>;

    async fn remove_show_ids_from_list(&self, list_id: i64, shows: &[Show]) -> Result<()>;
}

/// Every remote collaborator of the sync layer, wired once at startup.
#[derive(Clone)]
pub struct DataSources {
    pub trakt_shows: Arc<dyn ShowDataSource>,
    pub tmdb_shows: Arc<dyn ShowDataSource>,
    pub trakt_seasons: Arc<dyn SeasonsEpisodesDataSource>,
    pub tmdb_seasons: Arc<dyn SeasonsEpisodesDataSource>,
    pub trakt_episodes: Arc<dyn EpisodeDataSource>,
    pub tmdb_episodes: Arc<dyn EpisodeDataSource>,
    pub episode_watches: Arc<dyn EpisodeWatchesDataSource>,
    pub followed_shows: Arc<dyn FollowedShowsDataSource>,
}

impl DataSources {
    /// Trakt for everything it serves, TMDb for the rest.
    pub fn remote(trakt: Arc<TraktApi>, tmdb: Arc<TmdbApi>) -> DataSources {
        DataSources {
            trakt_shows: trakt.clone(),
            tmdb_shows: tmdb.clone(),
            trakt_seasons: trakt.clone(),
            tmdb_seasons: tmdb.clone(),
            trakt_episodes: trakt.clone(),
            tmdb_episodes: tmdb,
            episode_watches: trakt.clone(),
            followed_shows: trakt,
        }
    }
}
