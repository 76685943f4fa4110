use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use diesel::SqliteConnection;
use log::*;

use crate::auth::SessionState;
use crate::db::{Database, EntityDao, EpisodeWatchEntryDao, EpisodesDao, SeasonsDao, ShowDao};
use crate::error::{Result, StorageResultExt, SyncError};
use crate::models::{ActionDate, Episode, EpisodeWatchEntry, PendingAction, Request, Season, Show};
use crate::repos::last_request::LastRequestStore;
use crate::sources::DataSources;
use crate::sync::merge::{merge_episode, merge_season};
use crate::sync::{syncer_for_entity, ItemSyncerResult, KeyedLocks};

pub const SHOW_SEASONS_MAX_AGE_DAYS: i64 = 7;
pub const SEASON_DETAILS_MAX_AGE_DAYS: i64 = 28;
pub const EPISODE_DETAILS_MAX_AGE_DAYS: i64 = 28;
pub const EPISODE_WATCHES_MAX_AGE_HOURS: i64 = 24;

/// Which service's season listing is the truth when diffing. The other one only
/// contributes fields to seasons and episodes it can match by number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SeasonsSource {
    #[default]
    Trakt,
    Tmdb,
}

impl SeasonsSource {
    fn season_key(self, season: &Season) -> Option<i32> {
        match self {
            SeasonsSource::Trakt => season.trakt_id,
            SeasonsSource::Tmdb => season.tmdb_id,
        }
    }

    fn episode_key(self, episode: &Episode) -> Option<i32> {
        match self {
            SeasonsSource::Trakt => episode.trakt_id,
            SeasonsSource::Tmdb => episode.tmdb_id,
        }
    }
}

impl FromStr for SeasonsSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trakt" => Ok(SeasonsSource::Trakt),
            "tmdb" => Ok(SeasonsSource::Tmdb),
            other => Err(format!("unknown seasons source '{}'", other)),
        }
    }
}

/// One item as both services describe it. A service that doesn't know it gives `EMPTY`.
#[derive(Debug)]
struct Remote<T> {
    trakt: T,
    tmdb: T,
}

impl<T> Remote<T> {
    fn new(source: SeasonsSource, primary: T, secondary: T) -> Remote<T> {
        match source {
            SeasonsSource::Trakt => Remote {
                trakt: primary,
                tmdb: secondary,
            },
            SeasonsSource::Tmdb => Remote {
                trakt: secondary,
                tmdb: primary,
            },
        }
    }

    fn primary(&self, source: SeasonsSource) -> &T {
        match source {
            SeasonsSource::Trakt => &self.trakt,
            SeasonsSource::Tmdb => &self.tmdb,
        }
    }
}

type SeasonListing = Vec<(Season, Vec<Episode>)>;

pub struct SeasonsEpisodesRepository {
    db: Database,
    sources: DataSources,
    session: Arc<dyn SessionState>,
    seasons_source: SeasonsSource,
    show_seasons_requests: LastRequestStore,
    season_requests: LastRequestStore,
    episode_requests: LastRequestStore,
    watches_requests: LastRequestStore,
    locks: KeyedLocks<i64>,
}

impl SeasonsEpisodesRepository {
    pub fn new(
        db: Database,
        sources: &DataSources,
        session: Arc<dyn SessionState>,
        seasons_source: SeasonsSource,
    ) -> SeasonsEpisodesRepository {
        SeasonsEpisodesRepository {
            show_seasons_requests: LastRequestStore::new(db.clone(), Request::ShowSeasons),
            season_requests: LastRequestStore::new(db.clone(), Request::SeasonDetails),
            episode_requests: LastRequestStore::new(db.clone(), Request::EpisodeDetails),
            watches_requests: LastRequestStore::new(db.clone(), Request::ShowEpisodeWatches),
            sources: sources.clone(),
            session,
            seasons_source,
            locks: KeyedLocks::default(),
            db,
        }
    }

    pub async fn get_season(&self, season_id: i64) -> Result<Season> {
        self.db.run(move |conn| load_season(conn, season_id)).await
    }

    pub async fn get_episode(&self, episode_id: i64) -> Result<Episode> {
        self.db.run(move |conn| load_episode(conn, episode_id)).await
    }

    /// Seasons in display order (specials last), each with its episodes.
    pub async fn seasons_with_episodes(&self, show_id: i64) -> Result<SeasonListing> {
        self.db
            .run(move |conn| {
                let seasons = SeasonsDao::seasons_for_show_id(conn, show_id)
                    .storage_context(|| format!("reading seasons of show {}", show_id))?;
                seasons
                    .into_iter()
                    .map(|season| {
                        let episodes = EpisodesDao::episodes_with_season_id(conn, season.id)
                            .storage_context(|| format!("reading episodes of season {}", season.id))?;
                        Ok((season, episodes))
                    })
                    .collect()
            })
            .await
    }

    pub async fn episode_watches(&self, episode_id: i64) -> Result<Vec<EpisodeWatchEntry>> {
        self.db
            .run(move |conn| {
                EpisodeWatchEntryDao::watches_for_episode(conn, episode_id)
                    .storage_context(|| format!("reading watches of episode {}", episode_id))
            })
            .await
    }

    pub async fn episode_watches_for_show(&self, show_id: i64) -> Result<Vec<EpisodeWatchEntry>> {
        self.db
            .run(move |conn| {
                EpisodeWatchEntryDao::entries_for_show_id(conn, show_id)
                    .storage_context(|| format!("reading watches of show {}", show_id))
            })
            .await
    }

    /// First aired episode after the last watched one, skipping specials and ignored seasons.
    pub async fn next_episode_to_watch(&self, show_id: i64) -> Result<Option<Episode>> {
        self.db
            .run(move |conn| {
                let seasons = SeasonsDao::seasons_for_show_id(conn, show_id)
                    .storage_context(|| format!("reading seasons of show {}", show_id))?;

                let mut candidates = vec![];
                let mut last_watched = None;
                for season in seasons
                    .iter()
                    .filter(|s| !s.ignored && s.number.map_or(false, |n| n > 0))
                {
                    let episodes = EpisodesDao::episodes_with_season_id(conn, season.id)
                        .storage_context(|| format!("reading episodes of season {}", season.id))?;
                    for episode in episodes {
                        if EpisodeWatchEntryDao::watch_count_for_episode(conn, episode.id)
                            .storage_context(|| format!("counting watches of {}", episode.id))?
                            > 0
                        {
                            last_watched = Some(candidates.len());
                        }
                        candidates.push(episode);
                    }
                }

                let start = last_watched.map_or(0, |i| i + 1);
                Ok(candidates.into_iter().skip(start).find(Episode::has_aired))
            })
            .await
    }

    pub async fn needs_show_seasons_update(
        &self,
        show_id: i64,
        max_age: Option<Duration>,
    ) -> Result<bool> {
        let max_age = max_age.unwrap_or_else(|| Duration::days(SHOW_SEASONS_MAX_AGE_DAYS));
        self.show_seasons_requests
            .is_request_expired(show_id, max_age)
            .await
    }

    pub async fn needs_season_update(&self, season_id: i64, max_age: Option<Duration>) -> Result<bool> {
        let max_age = max_age.unwrap_or_else(|| Duration::days(SEASON_DETAILS_MAX_AGE_DAYS));
        self.season_requests.is_request_expired(season_id, max_age).await
    }

    pub async fn needs_episode_update(
        &self,
        episode_id: i64,
        max_age: Option<Duration>,
    ) -> Result<bool> {
        let max_age = max_age.unwrap_or_else(|| Duration::days(EPISODE_DETAILS_MAX_AGE_DAYS));
        self.episode_requests.is_request_expired(episode_id, max_age).await
    }

    pub async fn needs_show_episode_watches_sync(
        &self,
        show_id: i64,
        max_age: Option<Duration>,
    ) -> Result<bool> {
        let max_age = max_age.unwrap_or_else(|| Duration::hours(EPISODE_WATCHES_MAX_AGE_HOURS));
        self.watches_requests.is_request_expired(show_id, max_age).await
    }

    /// Drop every season, episode and watch of the show. The next check refetches them.
    pub async fn remove_show_season_data(&self, show_id: i64) -> Result<()> {
        let _guard = self.locks.lock(&show_id).await;
        self.db
            .run(move |conn| {
                SeasonsDao::delete_with_show_id(conn, show_id)
                    .storage_context(|| format!("removing seasons of show {}", show_id))
            })
            .await?;
        self.show_seasons_requests
            .invalidate_last_request(show_id)
            .await
    }

    /// Replace the show's seasons and episodes with the primary source's listing, enriched by
    /// the secondary source.
    ///
    /// If the primary source fails nothing is changed. The secondary source failing only
    /// costs its fields.
    pub async fn update_seasons_episodes(&self, show_id: i64) -> Result<ItemSyncerResult<Season>> {
        let _guard = self.locks.lock(&show_id).await;
        let show = self.db.run(move |conn| load_show(conn, show_id)).await?;

        let (trakt, tmdb) = tokio::join!(
            self.sources.trakt_seasons.get_seasons_episodes(&show),
            self.sources.tmdb_seasons.get_seasons_episodes(&show),
        );
        let source = self.seasons_source;
        let (primary, secondary) = match source {
            SeasonsSource::Trakt => (trakt, tmdb),
            SeasonsSource::Tmdb => (tmdb, trakt),
        };

        let primary = primary?;
        let secondary = secondary.unwrap_or_else(|err| {
            warn!("Secondary seasons fetch for show {} failed: {}", show_id, err);
            vec![]
        });
        let listing = pair_listings(source, primary, secondary);

        let result = self
            .db
            .transaction(move |conn| sync_seasons(conn, show_id, source, listing))
            .await?;

        self.show_seasons_requests.update_last_request(show_id).await?;
        info!(
            "Updated seasons of show {}: {} added, {} deleted",
            show_id,
            result.added.len(),
            result.deleted.len()
        );
        Ok(result)
    }

    pub async fn update_season(&self, season_id: i64) -> Result<Season> {
        let season = self.get_season(season_id).await?;
        let _guard = self.locks.lock(&season.show_id).await;
        let show_id = season.show_id;
        let show = self.db.run(move |conn| load_show(conn, show_id)).await?;
        let number = season
            .number
            .ok_or_else(|| SyncError::NoData(format!("number of season {}", season_id)))?;

        let (trakt, tmdb) = tokio::join!(
            self.sources.trakt_seasons.get_season(&show, number),
            self.sources.tmdb_seasons.get_season(&show, number),
        );
        let (trakt, tmdb) = either_or_no_data(trakt, tmdb, || format!("season {}", season_id))?;

        let saved = self
            .db
            .transaction(move |conn| {
                let local = load_season(conn, season_id)?;
                let merged = merge_season(&local, &trakt, &tmdb);
                SeasonsDao::upsert(conn, &merged)
                    .storage_context(|| format!("saving season {}", season_id))?;
                Ok(merged)
            })
            .await?;

        self.season_requests.update_last_request(season_id).await?;
        Ok(saved)
    }

    pub async fn update_episode(&self, episode_id: i64) -> Result<Episode> {
        let (show, season, episode) = self
            .db
            .run(move |conn| {
                let episode = load_episode(conn, episode_id)?;
                let season = load_season(conn, episode.season_id)?;
                let show = load_show(conn, season.show_id)?;
                Ok((show, season, episode))
            })
            .await?;
        let _guard = self.locks.lock(&show.id).await;

        let (Some(season_number), Some(episode_number)) = (season.number, episode.number) else {
            return Err(SyncError::NoData(format!("numbers of episode {}", episode_id)));
        };

        let (trakt, tmdb) = tokio::join!(
            self.sources
                .trakt_episodes
                .get_episode(&show, season_number, episode_number),
            self.sources
                .tmdb_episodes
                .get_episode(&show, season_number, episode_number),
        );
        let (trakt, tmdb) = either_or_no_data(trakt, tmdb, || format!("episode {}", episode_id))?;

        let saved = self
            .db
            .transaction(move |conn| {
                let local = load_episode(conn, episode_id)?;
                let merged = merge_episode(&local, &trakt, &tmdb);
                EpisodesDao::upsert(conn, &merged)
                    .storage_context(|| format!("saving episode {}", episode_id))?;
                Ok(merged)
            })
            .await?;

        self.episode_requests.update_last_request(episode_id).await?;
        Ok(saved)
    }

    pub async fn mark_season_ignored(&self, season_id: i64) -> Result<()> {
        self.set_seasons_ignored(vec![season_id], true).await
    }

    pub async fn mark_season_followed(&self, season_id: i64) -> Result<()> {
        self.set_seasons_ignored(vec![season_id], false).await
    }

    /// Ignore every regular season before this one.
    pub async fn mark_previous_seasons_ignored(&self, season_id: i64) -> Result<()> {
        let previous = self
            .db
            .run(move |conn| {
                SeasonsDao::show_previous_season_ids(conn, season_id)
                    .storage_context(|| format!("reading seasons before {}", season_id))
            })
            .await?;
        self.set_seasons_ignored(previous, true).await
    }

    async fn set_seasons_ignored(&self, season_ids: Vec<i64>, ignored: bool) -> Result<()> {
        self.db
            .transaction(move |conn| {
                for id in season_ids {
                    SeasonsDao::update_season_ignore_flag(conn, id, ignored)
                        .storage_context(|| format!("flagging season {}", id))?;
                }
                Ok(())
            })
            .await
    }

    /// Full two-way sync of the show's watch history.
    pub async fn sync_episode_watches_for_show(
        &self,
        show_id: i64,
    ) -> Result<ItemSyncerResult<EpisodeWatchEntry>> {
        self.sync_show_watches(show_id, None).await
    }

    /// Like [`Self::sync_episode_watches_for_show`] but only pulls watches after `since`, so
    /// nothing local is deleted for being absent.
    pub async fn sync_episode_watches_since(
        &self,
        show_id: i64,
        since: DateTime<Utc>,
    ) -> Result<ItemSyncerResult<EpisodeWatchEntry>> {
        self.sync_show_watches(show_id, Some(since)).await
    }

    pub async fn add_episode_watch(&self, episode_id: i64, watched_at: DateTime<Utc>) -> Result<()> {
        let show_id = self
            .db
            .transaction(move |conn| {
                let show_id = show_id_for_episode(conn, episode_id)?;
                EpisodeWatchEntryDao::insert(
                    conn,
                    &EpisodeWatchEntry {
                        id: 0,
                        episode_id,
                        trakt_id: None,
                        watched_at: watched_at.naive_utc(),
                        pending_action: PendingAction::Upload,
                    },
                )
                .storage_context(|| format!("adding watch of episode {}", episode_id))?;
                Ok(show_id)
            })
            .await?;

        self.sync_after_local_change(show_id).await
    }

    pub async fn remove_episode_watch(&self, watch_id: i64) -> Result<()> {
        let show_id = self
            .db
            .transaction(move |conn| {
                let entry = EpisodeWatchEntryDao::entry_with_id(conn, watch_id)
                    .storage_context(|| format!("reading watch {}", watch_id))?
                    .ok_or_else(|| SyncError::not_found("episode watch", watch_id))?;
                mark_for_deletion(conn, &[entry.clone()])?;
                show_id_for_episode(conn, entry.episode_id)
            })
            .await?;

        self.sync_after_local_change(show_id).await
    }

    pub async fn remove_all_episode_watches(&self, episode_id: i64) -> Result<()> {
        let show_id = self
            .db
            .transaction(move |conn| {
                let show_id = show_id_for_episode(conn, episode_id)?;
                let watches = EpisodeWatchEntryDao::watches_for_episode(conn, episode_id)
                    .storage_context(|| format!("reading watches of episode {}", episode_id))?;
                mark_for_deletion(conn, &watches)?;
                Ok(show_id)
            })
            .await?;

        self.sync_after_local_change(show_id).await
    }

    /// Add a watch to every episode of the season that has none. `only_aired` skips episodes
    /// that haven't aired yet.
    pub async fn mark_season_watched(
        &self,
        season_id: i64,
        only_aired: bool,
        date: ActionDate,
    ) -> Result<()> {
        let show_id = self
            .db
            .transaction(move |conn| {
                let season = load_season(conn, season_id)?;
                let episodes = EpisodesDao::episodes_with_season_id(conn, season_id)
                    .storage_context(|| format!("reading episodes of season {}", season_id))?;
                let now = Utc::now().naive_utc();

                for episode in episodes {
                    if only_aired && !episode.has_aired() {
                        continue;
                    }
                    let watched = EpisodeWatchEntryDao::watch_count_for_episode(conn, episode.id)
                        .storage_context(|| format!("counting watches of {}", episode.id))?;
                    if watched > 0 {
                        continue;
                    }

                    let watched_at = match date {
                        ActionDate::Now => now,
                        ActionDate::AirDate => episode.first_aired.unwrap_or(now),
                    };
                    EpisodeWatchEntryDao::insert(
                        conn,
                        &EpisodeWatchEntry {
                            id: 0,
                            episode_id: episode.id,
                            trakt_id: None,
                            watched_at,
                            pending_action: PendingAction::Upload,
                        },
                    )
                    .storage_context(|| format!("adding watch of episode {}", episode.id))?;
                }
                Ok(season.show_id)
            })
            .await?;

        self.sync_after_local_change(show_id).await
    }

    pub async fn mark_season_unwatched(&self, season_id: i64) -> Result<()> {
        let show_id = self
            .db
            .transaction(move |conn| {
                let season = load_season(conn, season_id)?;
                let episodes = EpisodesDao::episodes_with_season_id(conn, season_id)
                    .storage_context(|| format!("reading episodes of season {}", season_id))?;
                for episode in episodes {
                    let watches = EpisodeWatchEntryDao::watches_for_episode(conn, episode.id)
                        .storage_context(|| format!("reading watches of {}", episode.id))?;
                    mark_for_deletion(conn, &watches)?;
                }
                Ok(season.show_id)
            })
            .await?;

        self.sync_after_local_change(show_id).await
    }

    /// The local change is already saved; a failed push leaves it pending for the next sync.
    async fn sync_after_local_change(&self, show_id: i64) -> Result<()> {
        match self.sync_episode_watches_for_show(show_id).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_unauthorized() => Err(err),
            Err(err) => {
                warn!("Watch sync for show {} failed, will retry: {}", show_id, err);
                Ok(())
            }
        }
    }

    async fn sync_show_watches(
        &self,
        show_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<ItemSyncerResult<EpisodeWatchEntry>> {
        let _guard = self.locks.lock(&show_id).await;

        self.process_pending_watch_deletes(show_id).await?;
        self.process_pending_watch_additions(show_id).await?;

        if !self.session.is_logged_in() {
            debug!("Logged out, not pulling watches of show {}", show_id);
            return Ok(ItemSyncerResult::default());
        }

        let show = self.db.run(move |conn| load_show(conn, show_id)).await?;
        let response = self
            .sources
            .episode_watches
            .get_show_episode_watches(&show, since)
            .await?;

        let result = self
            .db
            .transaction(move |conn| sync_watches(conn, show_id, response, since.is_none()))
            .await?;

        self.watches_requests.update_last_request(show_id).await?;
        Ok(result)
    }

    async fn pending_watches(
        &self,
        show_id: i64,
        action: PendingAction,
    ) -> Result<Vec<EpisodeWatchEntry>> {
        self.db
            .run(move |conn| {
                EpisodeWatchEntryDao::entries_for_show_id_with_pending_action(conn, show_id, action)
                    .storage_context(|| format!("reading {:?} watches of show {}", action, show_id))
            })
            .await
    }

    async fn process_pending_watch_deletes(&self, show_id: i64) -> Result<()> {
        let pending = self.pending_watches(show_id, PendingAction::Delete).await?;
        if pending.is_empty() {
            return Ok(());
        }

        // never uploaded, nothing to tell the remote
        let (remote, local_only): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|w| w.trakt_id.is_some() && self.session.is_logged_in());

        let mut deletable: Vec<i64> = local_only.iter().map(|w| w.id).collect();
        if !remote.is_empty() {
            match self.sources.episode_watches.remove_episode_watches(&remote).await {
                Ok(()) => deletable.extend(remote.iter().map(|w| w.id)),
                Err(err) if err.is_unauthorized() => return Err(err),
                Err(err) => warn!(
                    "Failed to remove {} watches of show {}, will retry: {}",
                    remote.len(),
                    show_id,
                    err
                ),
            }
        }

        self.db
            .run(move |conn| {
                EpisodeWatchEntryDao::delete_with_ids(conn, &deletable)
                    .storage_context(|| "deleting removed watches")
            })
            .await
            .map(|_| ())
    }

    async fn process_pending_watch_additions(&self, show_id: i64) -> Result<()> {
        let pending = self.pending_watches(show_id, PendingAction::Upload).await?;
        if pending.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = pending.iter().map(|w| w.id).collect();

        if self.session.is_logged_in() {
            let pairs = self
                .db
                .run(move |conn| {
                    pending
                        .into_iter()
                        .map(|w| Ok((load_episode(conn, w.episode_id)?, w)))
                        .collect::<Result<Vec<_>>>()
                })
                .await?;

            match self.sources.episode_watches.add_episode_watches(&pairs).await {
                Ok(()) => debug!("Uploaded {} watches of show {}", pairs.len(), show_id),
                Err(err) if err.is_unauthorized() => return Err(err),
                Err(err) => {
                    warn!("Failed to upload watches of show {}, will retry: {}", show_id, err);
                    return Ok(());
                }
            }
        }

        self.db
            .run(move |conn| {
                EpisodeWatchEntryDao::update_entries_to_pending_action(
                    conn,
                    &ids,
                    PendingAction::Nothing,
                )
                .storage_context(|| "clearing uploaded watches")
            })
            .await
            .map(|_| ())
    }
}

fn load_show(conn: &mut SqliteConnection, show_id: i64) -> Result<Show> {
    ShowDao::show_with_id(conn, show_id)
        .storage_context(|| format!("reading show {}", show_id))?
        .ok_or_else(|| SyncError::not_found("show", show_id))
}

fn load_season(conn: &mut SqliteConnection, season_id: i64) -> Result<Season> {
    SeasonsDao::season_with_id(conn, season_id)
        .storage_context(|| format!("reading season {}", season_id))?
        .ok_or_else(|| SyncError::not_found("season", season_id))
}

fn load_episode(conn: &mut SqliteConnection, episode_id: i64) -> Result<Episode> {
    EpisodesDao::episode_with_id(conn, episode_id)
        .storage_context(|| format!("reading episode {}", episode_id))?
        .ok_or_else(|| SyncError::not_found("episode", episode_id))
}

fn show_id_for_episode(conn: &mut SqliteConnection, episode_id: i64) -> Result<i64> {
    EpisodesDao::show_id_for_episode_id(conn, episode_id)
        .storage_context(|| format!("reading show of episode {}", episode_id))?
        .ok_or_else(|| SyncError::not_found("episode", episode_id))
}

fn mark_for_deletion(conn: &mut SqliteConnection, watches: &[EpisodeWatchEntry]) -> Result<()> {
    let ids: Vec<i64> = watches
        .iter()
        .filter(|w| w.pending_action != PendingAction::Delete)
        .map(|w| w.id)
        .collect();
    EpisodeWatchEntryDao::update_entries_to_pending_action(conn, &ids, PendingAction::Delete)
        .storage_context(|| "marking watches for deletion")?;
    Ok(())
}

fn either_or_no_data<T, F>(trakt: Result<T>, tmdb: Result<T>, what: F) -> Result<(T, T)>
where
    T: Default,
    F: Fn() -> String,
{
    if let Err(SyncError::Unauthorized) = trakt {
        return Err(SyncError::Unauthorized);
    }
    match (trakt, tmdb) {
        (Err(trakt), Err(tmdb)) => {
            warn!("No source could fetch {}: {} / {}", what(), trakt, tmdb);
            Err(SyncError::NoData(what()))
        }
        (trakt, tmdb) => Ok((trakt.unwrap_or_default(), tmdb.unwrap_or_default())),
    }
}

/// Match each primary season and episode with the secondary source's one of the same number.
/// Repeated numbers in the primary listing are dropped after the first.
fn pair_listings(
    source: SeasonsSource,
    primary: SeasonListing,
    secondary: SeasonListing,
) -> Vec<(Remote<Season>, Vec<Remote<Episode>>)> {
    let mut secondary: HashMap<i32, (Season, Vec<Episode>)> = secondary
        .into_iter()
        .filter_map(|(season, episodes)| Some((season.number?, (season, episodes))))
        .collect();

    let mut seen_seasons = HashSet::new();
    primary
        .into_iter()
        .filter(|(season, _)| season.number.map_or(true, |n| seen_seasons.insert(n)))
        .map(|(season, episodes)| {
            let (other_season, other_episodes) = season
                .number
                .and_then(|n| secondary.remove(&n))
                .unwrap_or((Season::EMPTY, vec![]));
            let mut other_episodes: HashMap<i32, Episode> = other_episodes
                .into_iter()
                .filter_map(|e| Some((e.number?, e)))
                .collect();

            let mut seen_episodes = HashSet::new();
            let episodes = episodes
                .into_iter()
                .filter(|e| e.number.map_or(true, |n| seen_episodes.insert(n)))
                .map(|episode| {
                    let other = episode
                        .number
                        .and_then(|n| other_episodes.remove(&n))
                        .unwrap_or(Episode::EMPTY);
                    Remote::new(source, episode, other)
                })
                .collect();

            (Remote::new(source, season, other_season), episodes)
        })
        .collect()
}

fn sync_seasons(
    conn: &mut SqliteConnection,
    show_id: i64,
    source: SeasonsSource,
    listing: Vec<(Remote<Season>, Vec<Remote<Episode>>)>,
) -> Result<ItemSyncerResult<Season>> {
    let current = SeasonsDao::seasons_for_show_id(conn, show_id)
        .storage_context(|| format!("reading seasons of show {}", show_id))?;

    let (seasons, episodes): (Vec<_>, Vec<_>) = listing.into_iter().unzip();
    let mut episodes_by_key: HashMap<i32, Vec<Remote<Episode>>> = seasons
        .iter()
        .zip(episodes)
        .filter_map(|(season, episodes)| Some((source.season_key(season.primary(source))?, episodes)))
        .collect();

    let result = syncer_for_entity::<SeasonsDao, _, _, _>(
        move |local: &Season| source.season_key(local),
        move |remote: &Remote<Season>| source.season_key(remote.primary(source)),
        move |remote: Remote<Season>, local: Option<&Season>| {
            let new = Season::for_show(show_id);
            merge_season(local.unwrap_or(&new), &remote.trakt, &remote.tmdb)
        },
    )
    .sync(conn, current, seasons, true)
    .storage_context(|| format!("syncing seasons of show {}", show_id))?;

    for season in result.added.iter().chain(result.updated.iter()) {
        let Some(episodes) = source
            .season_key(season)
            .and_then(|key| episodes_by_key.remove(&key))
        else {
            continue;
        };
        sync_episodes(conn, season.id, source, episodes)?;
    }

    Ok(result)
}

fn sync_episodes(
    conn: &mut SqliteConnection,
    season_id: i64,
    source: SeasonsSource,
    remote: Vec<Remote<Episode>>,
) -> Result<ItemSyncerResult<Episode>> {
    let current = EpisodesDao::episodes_with_season_id(conn, season_id)
        .storage_context(|| format!("reading episodes of season {}", season_id))?;

    syncer_for_entity::<EpisodesDao, _, _, _>(
        move |local: &Episode| source.episode_key(local),
        move |remote: &Remote<Episode>| source.episode_key(remote.primary(source)),
        move |remote: Remote<Episode>, local: Option<&Episode>| {
            let new = Episode::for_season(season_id);
            merge_episode(local.unwrap_or(&new), &remote.trakt, &remote.tmdb)
        },
    )
    .sync(conn, current, remote, true)
    .storage_context(|| format!("syncing episodes of season {}", season_id))
}

/// Only entries with no pending action take part in the diff. Remote copies of entries still
/// pending locally are skipped, so a failed push doesn't bring back what the user removed.
/// Remote watches of episodes we don't have are skipped.
fn sync_watches(
    conn: &mut SqliteConnection,
    show_id: i64,
    response: Vec<(Episode, EpisodeWatchEntry)>,
    remove_not_matched: bool,
) -> Result<ItemSyncerResult<EpisodeWatchEntry>> {
    let (mut current, pending): (Vec<_>, Vec<_>) =
        EpisodeWatchEntryDao::entries_for_show_id(conn, show_id)
            .storage_context(|| format!("reading watches of show {}", show_id))?
            .into_iter()
            .partition(|w| w.pending_action == PendingAction::Nothing);
    let pending: HashSet<i64> = pending.iter().filter_map(|w| w.trakt_id).collect();

    let mut remote = Vec::with_capacity(response.len());
    for (episode, entry) in response {
        if entry.trakt_id.map_or(false, |id| pending.contains(&id)) {
            trace!("Watch {:?} is pending locally, skipping", entry.trakt_id);
            continue;
        }
        let Some(trakt_id) = episode.trakt_id else {
            continue;
        };
        let Some(episode_id) = EpisodesDao::episode_id_with_trakt_id(conn, trakt_id)
            .storage_context(|| format!("resolving episode {}", trakt_id))?
        else {
            trace!("No local episode for Trakt episode {}, skipping watch", trakt_id);
            continue;
        };
        remote.push(EpisodeWatchEntry {
            id: 0,
            episode_id,
            pending_action: PendingAction::Nothing,
            ..entry
        });
    }

    adopt_remote_ids(conn, &mut current, &remote)?;

    syncer_for_entity::<EpisodeWatchEntryDao, _, _, _>(
        |local: &EpisodeWatchEntry| local.trakt_id,
        |remote: &EpisodeWatchEntry| remote.trakt_id,
        |remote: EpisodeWatchEntry, local: Option<&EpisodeWatchEntry>| EpisodeWatchEntry {
            id: local.map_or(0, |l| l.id),
            ..remote
        },
    )
    .sync(conn, current, remote, remove_not_matched)
    .storage_context(|| format!("syncing watches of show {}", show_id))
}

/// An uploaded watch has no history id until the remote lists it. Give each such entry the id
/// of the unclaimed remote watch of the same episode at the same second, so it is matched
/// instead of duplicated.
fn adopt_remote_ids(
    conn: &mut SqliteConnection,
    current: &mut [EpisodeWatchEntry],
    remote: &[EpisodeWatchEntry],
) -> Result<()> {
    let mut claimed: HashSet<i64> = current.iter().filter_map(|w| w.trakt_id).collect();

    for local in current.iter_mut().filter(|w| w.trakt_id.is_none()) {
        let found = remote.iter().find(|r| {
            r.episode_id == local.episode_id
                && r.trakt_id.map_or(false, |id| !claimed.contains(&id))
                && r.watched_at.signed_duration_since(local.watched_at).num_seconds() == 0
        });
        let Some(trakt_id) = found.and_then(|r| r.trakt_id) else {
            continue;
        };

        claimed.insert(trakt_id);
        local.trakt_id = Some(trakt_id);
        EpisodeWatchEntryDao::upsert(conn, local)
            .storage_context(|| format!("linking watch {} to history {}", local.id, trakt_id))?;
        trace!("Watch {} is history item {}", local.id, trakt_id);
    }

    Ok(())
}
