use std::fmt::Debug;
use std::marker::PhantomData;

use diesel::prelude::*;
use log::*;

use crate::db::EntityDao;
use crate::models::TiviEntity;

/// What a sync pass did to the local table.
#[derive(Debug, PartialEq)]
pub struct ItemSyncerResult<E> {
    pub added: Vec<E>,
    pub deleted: Vec<E>,
    pub updated: Vec<E>,
}

impl<E> Default for ItemSyncerResult<E> {
    fn default() -> Self {
        ItemSyncerResult {
            added: vec![],
            deleted: vec![],
            updated: vec![],
        }
    }
}

impl<E> ItemSyncerResult<E> {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }
}

/// Reconciles the local rows of one table against an authoritative remote listing.
///
/// Remote items are matched to local rows by key. Matches are mapped and upserted when they
/// differ, misses are inserted, and (unless asked not to) local rows no remote item matched
/// are deleted. Internal ids survive: nothing is replaced by delete-then-insert.
pub struct ItemSyncer<D, LK, NK, M> {
    local_key: LK,
    network_key: NK,
    mapper: M,
    _dao: PhantomData<D>,
}

pub fn syncer_for_entity<D, LK, NK, M>(local_key: LK, network_key: NK, mapper: M) -> ItemSyncer<D, LK, NK, M>
where
    D: EntityDao,
{
    ItemSyncer {
        local_key,
        network_key,
        mapper,
        _dao: PhantomData,
    }
}

impl<D, LK, NK, M> ItemSyncer<D, LK, NK, M>
where
    D: EntityDao,
{
    /// Run inside a transaction so a failure leaves the table as it was.
    pub fn sync<N, K>(
        &self,
        conn: &mut SqliteConnection,
        current: Vec<D::Entity>,
        network: Vec<N>,
        remove_not_matched: bool,
    ) -> QueryResult<ItemSyncerResult<D::Entity>>
    where
        N: Debug,
        K: PartialEq + Debug,
        LK: Fn(&D::Entity) -> Option<K>,
        NK: Fn(&N) -> Option<K>,
        M: Fn(N, Option<&D::Entity>) -> D::Entity,
    {
        let mut current = current;
        let mut result = ItemSyncerResult::default();
        let mut to_add = vec![];

        for network_entity in network {
            trace!("Syncing {} from network: {:?}", D::NAME, network_entity);

            let Some(remote_key) = (self.network_key)(&network_entity) else {
                warn!("Skipping {} without a remote key: {:?}", D::NAME, network_entity);
                continue;
            };

            let matched = current
                .iter()
                .position(|local| (self.local_key)(local).as_ref() == Some(&remote_key));

            match matched {
                Some(index) => {
                    // taken out so a second remote item can't match it and it isn't deleted below
                    let db_entity = current.swap_remove(index);
                    let entity = (self.mapper)(network_entity, Some(&db_entity));
                    if entity != db_entity {
                        D::upsert(conn, &entity)?;
                        trace!("Updated {} with remote key {:?}", D::NAME, remote_key);
                    }
                    result.updated.push(entity);
                }
                None => to_add.push((self.mapper)(network_entity, None)),
            }
        }

        if remove_not_matched {
            for stale in current {
                D::delete_entity(conn, &stale)?;
                trace!("Deleted {}: {:?}", D::NAME, stale);
                result.deleted.push(stale);
            }
        }

        for mut entity in to_add {
            let id = D::upsert(conn, &entity)?;
            entity.set_id(id);
            result.added.push(entity);
        }

        debug!(
            "Synced {}: {} added, {} updated, {} deleted",
            D::NAME,
            result.added.len(),
            result.updated.len(),
            result.deleted.len()
        );

        Ok(result)
    }
}
