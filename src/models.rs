use crate::schema::{
    episode_watch_entries, episodes, followed_shows, last_requests, seasons, shows,
};

use chrono::{NaiveDateTime, NaiveTime, Utc};
use diesel::prelude::*;

/// Common behaviour of every row owned by the local store.
///
/// An id of `0` means "not yet persisted": the upsert primitive inserts such rows and hands
/// back the generated id.
pub trait TiviEntity: Clone + std::fmt::Debug + PartialEq {
    fn id(&self) -> i64;
    fn set_id(&mut self, id: i64);
}

macro_rules! tivi_entity {
    ($($entity:ty),+ $(,)?) => {
        $(
            impl TiviEntity for $entity {
                fn id(&self) -> i64 {
                    self.id
                }

                fn set_id(&mut self, id: i64) {
                    self.id = id;
                }
            }
        )+
    };
}

/// Marker for a local mutation that the remote service has not confirmed yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, diesel_derive_enum::DbEnum)]
pub enum PendingAction {
    #[default]
    Nothing,
    Upload,
    Delete,
}

/// The kind of remote fetch a [`LastRequest`] row throttles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, diesel_derive_enum::DbEnum)]
pub enum Request {
    ShowDetails,
    ShowSeasons,
    SeasonDetails,
    EpisodeDetails,
    ShowEpisodeWatches,
    FollowedShows,
}

/// Which timestamp to record when marking a batch of episodes as watched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionDate {
    Now,
    AirDate,
}

#[derive(
    Clone, Debug, Default, PartialEq, Queryable, Selectable, Insertable, AsChangeset,
)]
#[diesel(table_name = shows)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Show {
    #[diesel(skip_insertion)]
    pub id: i64,
    pub title: Option<String>,
    pub original_title: Option<String>,
    pub trakt_id: Option<i32>,
    pub tmdb_id: Option<i32>,
    pub imdb_id: Option<String>,
    pub summary: Option<String>,
    pub homepage: Option<String>,
    pub trakt_rating: Option<f32>,
    pub trakt_votes: Option<i32>,
    pub certification: Option<String>,
    pub first_aired: Option<NaiveDateTime>,
    pub country: Option<String>,
    pub network: Option<String>,
    pub network_logo_path: Option<String>,
    pub runtime: Option<i32>,
    /// Comma separated, in the order the source listed them.
    pub genres: Option<String>,
    pub status: Option<String>,
    /// ISO weekday, Monday = 1.
    pub airs_day: Option<i32>,
    pub airs_time: Option<NaiveTime>,
    pub airs_tz: Option<String>,
    pub tmdb_poster_path: Option<String>,
    pub tmdb_backdrop_path: Option<String>,
}

impl Show {
    /// A source that has no opinion about any field.
    pub const EMPTY: Show = Show {
        id: 0,
        title: None,
        original_title: None,
        trakt_id: None,
        tmdb_id: None,
        imdb_id: None,
        summary: None,
        homepage: None,
        trakt_rating: None,
        trakt_votes: None,
        certification: None,
        first_aired: None,
        country: None,
        network: None,
        network_logo_path: None,
        runtime: None,
        genres: None,
        status: None,
        airs_day: None,
        airs_time: None,
        airs_tz: None,
        tmdb_poster_path: None,
        tmdb_backdrop_path: None,
    };

    pub fn genres_list(&self) -> Vec<&str> {
        self.genres
            .as_deref()
            .map(|g| g.split(',').map(str::trim).filter(|g| !g.is_empty()).collect())
            .unwrap_or_default()
    }
}

#[derive(
    Clone, Debug, Default, PartialEq, Queryable, Selectable, Insertable, AsChangeset,
)]
#[diesel(table_name = seasons)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Season {
    #[diesel(skip_insertion)]
    pub id: i64,
    pub show_id: i64,
    pub trakt_id: Option<i32>,
    pub tmdb_id: Option<i32>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub number: Option<i32>,
    pub network: Option<String>,
    pub episode_count: Option<i32>,
    pub episodes_aired: Option<i32>,
    pub trakt_rating: Option<f32>,
    pub trakt_votes: Option<i32>,
    pub tmdb_poster_path: Option<String>,
    pub tmdb_backdrop_path: Option<String>,
    /// Local only, never touched by a sync.
    pub ignored: bool,
}

impl Season {
    pub const EMPTY: Season = Season {
        id: 0,
        show_id: 0,
        trakt_id: None,
        tmdb_id: None,
        title: None,
        summary: None,
        number: None,
        network: None,
        episode_count: None,
        episodes_aired: None,
        trakt_rating: None,
        trakt_votes: None,
        tmdb_poster_path: None,
        tmdb_backdrop_path: None,
        ignored: false,
    };

    pub fn for_show(show_id: i64) -> Season {
        Season {
            show_id,
            ..Season::EMPTY
        }
    }
}

#[derive(
    Clone, Debug, Default, PartialEq, Queryable, Selectable, Insertable, AsChangeset,
)]
#[diesel(table_name = episodes)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Episode {
    #[diesel(skip_insertion)]
    pub id: i64,
    pub season_id: i64,
    pub trakt_id: Option<i32>,
    pub tmdb_id: Option<i32>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub number: Option<i32>,
    pub first_aired: Option<NaiveDateTime>,
    pub trakt_rating: Option<f32>,
    pub trakt_votes: Option<i32>,
    pub tmdb_backdrop_path: Option<String>,
}

impl Episode {
    pub const EMPTY: Episode = Episode {
        id: 0,
        season_id: 0,
        trakt_id: None,
        tmdb_id: None,
        title: None,
        summary: None,
        number: None,
        first_aired: None,
        trakt_rating: None,
        trakt_votes: None,
        tmdb_backdrop_path: None,
    };

    pub fn for_season(season_id: i64) -> Episode {
        Episode {
            season_id,
            ..Episode::EMPTY
        }
    }

    pub fn has_aired(&self) -> bool {
        self.first_aired
            .map(|aired| aired <= Utc::now().naive_utc())
            .unwrap_or(false)
    }
}

/// One watch of one episode. Rewatches produce more rows.
#[derive(
    Clone, Debug, Default, PartialEq, Queryable, Selectable, Insertable, AsChangeset,
)]
#[diesel(table_name = episode_watch_entries)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EpisodeWatchEntry {
    #[diesel(skip_insertion)]
    pub id: i64,
    pub episode_id: i64,
    /// Trakt history id, only known once the watch exists remotely.
    pub trakt_id: Option<i64>,
    pub watched_at: NaiveDateTime,
    pub pending_action: PendingAction,
}

#[derive(
    Clone, Debug, Default, PartialEq, Queryable, Selectable, Insertable, AsChangeset,
)]
#[diesel(table_name = followed_shows)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct FollowedShowEntry {
    #[diesel(skip_insertion)]
    pub id: i64,
    pub show_id: i64,
    pub followed_at: Option<NaiveDateTime>,
    pub pending_action: PendingAction,
    /// Trakt list item id.
    pub trakt_id: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = last_requests)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LastRequest {
    #[diesel(skip_insertion)]
    pub id: i64,
    pub request: Request,
    pub entity_id: i64,
    pub timestamp: NaiveDateTime,
}

tivi_entity!(
    Show,
    Season,
    Episode,
    EpisodeWatchEntry,
    FollowedShowEntry,
    LastRequest,
);
