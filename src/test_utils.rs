//! Fixtures and canned data sources shared by the unit tests.
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;

use crate::auth::{AuthState, SessionProvider};
use crate::db::{EntityDao, EpisodeWatchEntryDao, EpisodesDao, SeasonsDao, ShowDao};
use crate::error::{Result, SyncError};
use crate::models::*;
use crate::sources::*;

pub fn aired(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(20, 0, 0))
        .unwrap()
}

pub fn trakt_show(trakt_id: i32, title: &str) -> Show {
    Show {
        trakt_id: Some(trakt_id),
        title: Some(title.to_string()),
        ..Show::EMPTY
    }
}

pub fn remote_season(trakt_id: i32, number: i32) -> Season {
    Season {
        trakt_id: Some(trakt_id),
        number: Some(number),
        title: Some(format!("Season {}", number)),
        ..Season::EMPTY
    }
}

pub fn remote_episode(trakt_id: i32, number: i32) -> Episode {
    Episode {
        trakt_id: Some(trakt_id),
        number: Some(number),
        first_aired: Some(aired(2020, 1, number as u32)),
        ..Episode::EMPTY
    }
}

pub fn watch(episode_id: i64, trakt_id: i64, pending_action: PendingAction) -> EpisodeWatchEntry {
    EpisodeWatchEntry {
        id: 0,
        episode_id,
        trakt_id: Some(trakt_id),
        watched_at: aired(2021, 5, 1),
        pending_action,
    }
}

/// A watch as the history endpoint reports it: only the episode's Trakt id is known.
pub fn remote_watch(episode_trakt_id: i32, history_id: i64) -> (Episode, EpisodeWatchEntry) {
    (
        Episode {
            trakt_id: Some(episode_trakt_id),
            ..Episode::EMPTY
        },
        EpisodeWatchEntry {
            id: 0,
            episode_id: 0,
            trakt_id: Some(history_id),
            watched_at: aired(2021, 6, 1),
            pending_action: PendingAction::Nothing,
        },
    )
}

pub struct SeedIds {
    pub show: i64,
    pub s1: i64,
    pub s2: i64,
    pub s1e1: i64,
    pub s1e2: i64,
    pub s2e1: i64,
}

/// Show trakt 1 with season 1 (episodes 1001, 1002) and season 2 (episode 1003), all aired.
pub fn seed_show_with_seasons(conn: &mut SqliteConnection) -> QueryResult<SeedIds> {
    let show = ShowDao::insert(conn, &trakt_show(1, "Dark"))?;

    let s1 = SeasonsDao::insert(
        conn,
        &Season {
            show_id: show,
            ..remote_season(101, 1)
        },
    )?;
    let s2 = SeasonsDao::insert(
        conn,
        &Season {
            show_id: show,
            ..remote_season(102, 2)
        },
    )?;

    let s1e1 = EpisodesDao::insert(
        conn,
        &Episode {
            season_id: s1,
            ..remote_episode(1001, 1)
        },
    )?;
    let s1e2 = EpisodesDao::insert(
        conn,
        &Episode {
            season_id: s1,
            ..remote_episode(1002, 2)
        },
    )?;
    let s2e1 = EpisodesDao::insert(
        conn,
        &Episode {
            season_id: s2,
            ..remote_episode(1003, 1)
        },
    )?;

    Ok(SeedIds {
        show,
        s1,
        s2,
        s1e1,
        s1e2,
        s2e1,
    })
}

/// A second show (trakt 2) with one watched episode. Returns the show id.
pub fn seed_other_show_with_watch(conn: &mut SqliteConnection) -> QueryResult<i64> {
    let show = ShowDao::insert(conn, &trakt_show(2, "Other"))?;
    let season = SeasonsDao::insert(
        conn,
        &Season {
            show_id: show,
            ..remote_season(201, 1)
        },
    )?;
    let episode = EpisodesDao::insert(
        conn,
        &Episode {
            season_id: season,
            ..remote_episode(2001, 1)
        },
    )?;
    EpisodeWatchEntryDao::insert(conn, &watch(episode, 9001, PendingAction::Nothing))?;
    Ok(show)
}

pub fn failure(status: u16) -> SyncError {
    match status {
        401 => SyncError::Unauthorized,
        _ => SyncError::Http {
            status: reqwest::StatusCode::from_u16(status).unwrap(),
            url: "fake://".to_string(),
        },
    }
}

/// A response the fake hands out until told otherwise. `Err(status)` fails with that status.
pub struct Canned<T>(Mutex<std::result::Result<T, u16>>);

impl<T: Clone> Canned<T> {
    pub fn set(&self, response: std::result::Result<T, u16>) {
        *self.0.lock().unwrap() = response;
    }

    pub fn get(&self) -> Result<T> {
        self.0.lock().unwrap().clone().map_err(failure)
    }
}

impl<T: Default> Default for Canned<T> {
    fn default() -> Self {
        Canned(Mutex::new(Ok(T::default())))
    }
}

#[derive(Default)]
pub struct FakeShowSource {
    pub show: Canned<Show>,
}

#[async_trait]
impl ShowDataSource for FakeShowSource {
    async fn get_show(&self, _show: &Show) -> Result<Show> {
        self.show.get()
    }
}

#[derive(Default)]
pub struct FakeSeasonsSource {
    pub seasons: Canned<Vec<(Season, Vec<Episode>)>>,
    pub season: Canned<Season>,
}

#[async_trait]
impl SeasonsEpisodesDataSource for FakeSeasonsSource {
    async fn get_seasons_episodes(&self, _show: &Show) -> Result<Vec<(Season, Vec<Episode>)>> {
        self.seasons.get()
    }

    async fn get_season(&self, _show: &Show, _season_number: i32) -> Result<Season> {
        self.season.get()
    }
}

#[derive(Default)]
pub struct FakeEpisodeSource {
    pub episode: Canned<Episode>,
}

#[async_trait]
impl EpisodeDataSource for FakeEpisodeSource {
    async fn get_episode(&self, _show: &Show, _season: i32, _episode: i32) -> Result<Episode> {
        self.episode.get()
    }
}

#[derive(Default)]
pub struct FakeWatchesSource {
    pub watches: Canned<Vec<(Episode, EpisodeWatchEntry)>>,
    pub push: Canned<()>,
    pub added: Mutex<Vec<(Episode, EpisodeWatchEntry)>>,
    pub removed: Mutex<Vec<EpisodeWatchEntry>>,
    pub fetched_since: Mutex<Vec<Option<DateTime<Utc>>>>,
}

#[async_trait]
impl EpisodeWatchesDataSource for FakeWatchesSource {
    async fn get_show_episode_watches(
        &self,
        _show: &Show,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<(Episode, EpisodeWatchEntry)>> {
        self.fetched_since.lock().unwrap().push(since);
        self.watches.get()
    }

    async fn add_episode_watches(&self, watches: &[(Episode, EpisodeWatchEntry)]) -> Result<()> {
        self.push.get()?;
        self.added.lock().unwrap().extend_from_slice(watches);
        Ok(())
    }

    async fn remove_episode_watches(&self, watches: &[EpisodeWatchEntry]) -> Result<()> {
        self.push.get()?;
        self.removed.lock().unwrap().extend_from_slice(watches);
        Ok(())
    }
}

pub struct FakeFollowedSource {
    pub list_id: Canned<i64>,
    pub list_shows: Canned<Vec<(FollowedShowEntry, Show)>>,
    pub push: Canned<()>,
    pub added: Mutex<Vec<Show>>,
    pub removed: Mutex<Vec<Show>>,
}

impl Default for FakeFollowedSource {
    fn default() -> Self {
        FakeFollowedSource {
            list_id: Canned(Mutex::new(Ok(1))),
            list_shows: Canned::default(),
            push: Canned::default(),
            added: Mutex::new(vec![]),
            removed: Mutex::new(vec![]),
        }
    }
}

#[async_trait]
impl FollowedShowsDataSource for FakeFollowedSource {
    async fn get_followed_list_id(&self) -> Result<i64> {
        self.list_id.get()
    }

    async fn get_list_shows(&self, _list_id: i64) -> Result<Vec<(FollowedShowEntry, Show)>> {
        self.list_shows.get()
    }

    async fn add_show_ids_to_list(&self, _list_id: i64, shows: &[Show]) -> Result<()> {
        self.push.get()?;
        self.added.lock().unwrap().extend_from_slice(shows);
        Ok(())
    }

    async fn remove_show_ids_from_list(&self, _list_id: i64, shows: &[Show]) -> Result<()> {
        self.push.get()?;
        self.removed.lock().unwrap().extend_from_slice(shows);
        Ok(())
    }
}

/// One fake per remote collaborator plus a logged-in session.
pub struct Fakes {
    pub trakt_shows: Arc<FakeShowSource>,
    pub tmdb_shows: Arc<FakeShowSource>,
    pub trakt_seasons: Arc<FakeSeasonsSource>,
    pub tmdb_seasons: Arc<FakeSeasonsSource>,
    pub trakt_episodes: Arc<FakeEpisodeSource>,
    pub tmdb_episodes: Arc<FakeEpisodeSource>,
    pub watches: Arc<FakeWatchesSource>,
    pub followed: Arc<FakeFollowedSource>,
    pub session: Arc<SessionProvider>,
}

impl Fakes {
    pub fn new() -> Fakes {
        Fakes {
            trakt_shows: Arc::default(),
            tmdb_shows: Arc::default(),
            trakt_seasons: Arc::default(),
            tmdb_seasons: Arc::default(),
            trakt_episodes: Arc::default(),
            tmdb_episodes: Arc::default(),
            watches: Arc::default(),
            followed: Arc::default(),
            session: Arc::new(SessionProvider::new(AuthState::LoggedIn)),
        }
    }

    pub fn data_sources(&self) -> DataSources {
        DataSources {
            trakt_shows: self.trakt_shows.clone(),
            tmdb_shows: self.tmdb_shows.clone(),
            trakt_seasons: self.trakt_seasons.clone(),
            tmdb_seasons: self.tmdb_seasons.clone(),
            trakt_episodes: self.trakt_episodes.clone(),
            tmdb_episodes: self.tmdb_episodes.clone(),
            episode_watches: self.watches.clone(),
            followed_shows: self.followed.clone(),
        }
    }
}
