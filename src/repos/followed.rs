use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use log::*;
use tokio::sync::Mutex;

use crate::auth::SessionState;
use crate::db::{Database, EntityDao, FollowedShowsDao, ShowDao};
use crate::error::{Result, StorageResultExt};
use crate::models::{FollowedShowEntry, PendingAction, Request, Show};
use crate::repos::last_request::LastRequestStore;
use crate::sources::{DataSources, FollowedShowsDataSource};
use crate::sync::{syncer_for_entity, ItemSyncerResult};

pub const FOLLOWED_SHOWS_MAX_AGE_HOURS: i64 = 3;

// the list is global, its throttle row uses this entity id
const FOLLOWED_LIST_ENTITY: i64 = 0;

pub struct FollowedShowsRepository {
    db: Database,
    data_source: Arc<dyn FollowedShowsDataSource>,
    session: Arc<dyn SessionState>,
    last_requests: LastRequestStore,
    list_id: Mutex<Option<i64>>,
    sync_lock: Mutex<()>,
}

impl FollowedShowsRepository {
    pub fn new(
        db: Database,
        sources: &DataSources,
        session: Arc<dyn SessionState>,
    ) -> FollowedShowsRepository {
        FollowedShowsRepository {
            last_requests: LastRequestStore::new(db.clone(), Request::FollowedShows),
            data_source: sources.followed_shows.clone(),
            session,
            db,
            list_id: Mutex::new(None),
            sync_lock: Mutex::new(()),
        }
    }

    /// Every local entry, including those waiting to be pushed.
    pub async fn get_followed_shows(&self) -> Result<Vec<FollowedShowEntry>> {
        self.db
            .run(|conn| FollowedShowsDao::entries(conn).storage_context(|| "reading followed shows"))
            .await
    }

    pub async fn is_show_followed(&self, show_id: i64) -> Result<bool> {
        self.db
            .run(move |conn| {
                FollowedShowsDao::entry_count_with_show_id_not_pending_delete(conn, show_id)
                    .storage_context(|| format!("checking follow of show {}", show_id))
            })
            .await
            .map(|count| count > 0)
    }

    pub async fn needs_followed_shows_sync(&self, max_age: Option<Duration>) -> Result<bool> {
        let max_age = max_age.unwrap_or_else(|| Duration::hours(FOLLOWED_SHOWS_MAX_AGE_HOURS));
        self.last_requests
            .is_request_expired(FOLLOWED_LIST_ENTITY, max_age)
            .await
    }

    /// Follow locally and queue the change for upload.
    pub async fn add_followed_show(&self, show_id: i64) -> Result<()> {
        self.db
            .transaction(move |conn| {
                let existing = FollowedShowsDao::entry_with_show_id(conn, show_id)
                    .storage_context(|| format!("reading follow of show {}", show_id))?;

                match existing {
                    Some(entry) if entry.pending_action != PendingAction::Delete => {
                        debug!("Show {} already followed", show_id);
                    }
                    existing => {
                        let entry = FollowedShowEntry {
                            show_id,
                            followed_at: Some(Utc::now().naive_utc()),
                            pending_action: PendingAction::Upload,
                            ..existing.unwrap_or_default()
                        };
                        FollowedShowsDao::upsert(conn, &entry)
                            .storage_context(|| format!("following show {}", show_id))?;
                        info!("Followed show {}", show_id);
                    }
                }
                Ok(())
            })
            .await
    }

    /// Mark the follow for deletion. The row goes once the remote confirms, or at the next
    /// sync if remote sync is unavailable.
    pub async fn remove_followed_show(&self, show_id: i64) -> Result<()> {
        self.db
            .run(move |conn| {
                let Some(entry) = FollowedShowsDao::entry_with_show_id(conn, show_id)
                    .storage_context(|| format!("reading follow of show {}", show_id))?
                else {
                    return Ok(());
                };

                FollowedShowsDao::update_entries_to_pending_action(
                    conn,
                    &[entry.id],
                    PendingAction::Delete,
                )
                .storage_context(|| format!("unfollowing show {}", show_id))?;
                info!("Unfollowed show {}", show_id);
                Ok(())
            })
            .await
    }

    /// Push pending deletes, then pending uploads, then reconcile with the remote list.
    ///
    /// Without a remote list (logged out, or the list can't be found) the pending markers are
    /// settled locally and nothing is pulled.
    pub async fn sync_followed_shows(&self) -> Result<ItemSyncerResult<FollowedShowEntry>> {
        let _guard = self.sync_lock.lock().await;

        let list_id = if self.session.is_logged_in() {
            self.followed_list_id().await?
        } else {
            None
        };

        self.process_pending_deletes(list_id).await?;
        self.process_pending_additions(list_id).await?;

        let result = match list_id {
            Some(list_id) => self.pull_down_list(list_id).await?,
            None => ItemSyncerResult::default(),
        };

        self.last_requests
            .update_last_request(FOLLOWED_LIST_ENTITY)
            .await?;
        Ok(result)
    }

    async fn followed_list_id(&self) -> Result<Option<i64>> {
        let mut cached = self.list_id.lock().await;
        if cached.is_some() {
            return Ok(*cached);
        }

        match self.data_source.get_followed_list_id().await {
            Ok(id) => {
                debug!("Followed shows list is {}", id);
                *cached = Some(id);
                Ok(Some(id))
            }
            Err(err) if err.is_unauthorized() => Err(err),
            Err(err) => {
                warn!("Could not find followed shows list, syncing locally only: {}", err);
                Ok(None)
            }
        }
    }

    async fn process_pending_deletes(&self, list_id: Option<i64>) -> Result<()> {
        let pending = self.entries_with_pending_action(PendingAction::Delete).await?;
        if pending.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = pending.iter().map(|e| e.id).collect();

        if let Some(list_id) = list_id {
            let shows = self.shows_for(&pending).await?;
            match self.data_source.remove_show_ids_from_list(list_id, &shows).await {
                Ok(()) => debug!("Removed {} shows from list {}", shows.len(), list_id),
                Err(err) if err.is_unauthorized() => return Err(err),
                Err(err) => {
                    warn!("Failed to remove followed shows, will retry: {}", err);
                    return Ok(());
                }
            }
        }

        self.db
            .run(move |conn| {
                FollowedShowsDao::delete_with_ids(conn, &ids)
                    .storage_context(|| "deleting unfollowed shows")
            })
            .await
            .map(|_| ())
    }

    async fn process_pending_additions(&self, list_id: Option<i64>) -> Result<()> {
        let pending = self.entries_with_pending_action(PendingAction::Upload).await?;
        if pending.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = pending.iter().map(|e| e.id).collect();

        if let Some(list_id) = list_id {
            let shows = self.shows_for(&pending).await?;
            match self.data_source.add_show_ids_to_list(list_id, &shows).await {
                Ok(()) => debug!("Added {} shows to list {}", shows.len(), list_id),
                Err(err) if err.is_unauthorized() => return Err(err),
                Err(err) => {
                    warn!("Failed to upload followed shows, will retry: {}", err);
                    return Ok(());
                }
            }
        }

        self.db
            .run(move |conn| {
                FollowedShowsDao::update_entries_to_pending_action(
                    conn,
                    &ids,
                    PendingAction::Nothing,
                )
                .storage_context(|| "clearing followed show uploads")
            })
            .await
            .map(|_| ())
    }

    async fn pull_down_list(&self, list_id: i64) -> Result<ItemSyncerResult<FollowedShowEntry>> {
        let response = self.data_source.get_list_shows(list_id).await?;
        debug!("Followed list {} has {} shows", list_id, response.len());

        self.db
            .transaction(move |conn| {
                let pending: HashSet<i64> = FollowedShowsDao::entries(conn)
                    .storage_context(|| "reading followed shows")?
                    .into_iter()
                    .filter(|e| e.pending_action != PendingAction::Nothing)
                    .map(|e| e.show_id)
                    .collect();

                let mut seen = HashSet::new();
                let mut remote = Vec::with_capacity(response.len());
                for (entry, show) in response {
                    let show_id = ShowDao::get_id_or_save_placeholder(conn, &show)
                        .storage_context(|| format!("resolving followed show {:?}", show.trakt_id))?;

                    // local pending changes win over what the list says
                    if pending.contains(&show_id) || !seen.insert(show_id) {
                        continue;
                    }
                    remote.push(FollowedShowEntry {
                        id: 0,
                        show_id,
                        pending_action: PendingAction::Nothing,
                        ..entry
                    });
                }

                let current = FollowedShowsDao::entries_with_pending_action(conn, PendingAction::Nothing)
                    .storage_context(|| "reading synced followed shows")?;

                syncer_for_entity::<FollowedShowsDao, _, _, _>(
                    |local: &FollowedShowEntry| Some(local.show_id),
                    |remote: &FollowedShowEntry| Some(remote.show_id),
                    |remote: FollowedShowEntry, local: Option<&FollowedShowEntry>| FollowedShowEntry {
                        id: local.map_or(0, |l| l.id),
                        ..remote
                    },
                )
                .sync(conn, current, remote, true)
                .storage_context(|| "syncing followed shows")
            })
            .await
    }

    async fn entries_with_pending_action(
        &self,
        action: PendingAction,
    ) -> Result<Vec<FollowedShowEntry>> {
        self.db
            .run(move |conn| {
                FollowedShowsDao::entries_with_pending_action(conn, action)
                    .storage_context(|| format!("reading followed shows pending {:?}", action))
            })
            .await
    }

    async fn shows_for(&self, entries: &[FollowedShowEntry]) -> Result<Vec<Show>> {
        let ids: Vec<i64> = entries.iter().map(|e| e.show_id).collect();
        self.db
            .run(move |conn| {
                ShowDao::shows_with_ids(conn, &ids).storage_context(|| "reading followed shows")
            })
            .await
    }
}
