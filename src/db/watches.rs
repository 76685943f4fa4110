use diesel::prelude::*;

use crate::db::entity::entity_dao;
use crate::models::{EpisodeWatchEntry, PendingAction};
use crate::schema::{episode_watch_entries, episodes, seasons};

pub struct EpisodeWatchEntryDao;

entity_dao!(
    EpisodeWatchEntryDao,
    EpisodeWatchEntry,
    episode_watch_entries,
    "episode watch"
);

impl EpisodeWatchEntryDao {
    pub fn entry_with_id(
        conn: &mut SqliteConnection,
        id: i64,
    ) -> QueryResult<Option<EpisodeWatchEntry>> {
        episode_watch_entries::table
            .find(id)
            .select(EpisodeWatchEntry::as_select())
            .first(conn)
            .optional()
    }

    pub fn watches_for_episode(
        conn: &mut SqliteConnection,
        episode_id: i64,
    ) -> QueryResult<Vec<EpisodeWatchEntry>> {
        episode_watch_entries::table
            .filter(episode_watch_entries::episode_id.eq(episode_id))
            .order(episode_watch_entries::watched_at.asc())
            .select(EpisodeWatchEntry::as_select())
            .load(conn)
    }

    pub fn watch_count_for_episode(
        conn: &mut SqliteConnection,
        episode_id: i64,
    ) -> QueryResult<i64> {
        episode_watch_entries::table
            .filter(episode_watch_entries::episode_id.eq(episode_id))
            .filter(episode_watch_entries::pending_action.ne(PendingAction::Delete))
            .count()
            .get_result(conn)
    }

    pub fn entries_for_show_id(
        conn: &mut SqliteConnection,
        show_id: i64,
    ) -> QueryResult<Vec<EpisodeWatchEntry>> {
        episode_watch_entries::table
            .inner_join(episodes::table.inner_join(seasons::table))
            .filter(seasons::show_id.eq(show_id))
            .order(episode_watch_entries::id.asc())
            .select(EpisodeWatchEntry::as_select())
            .load(conn)
    }

    pub fn entries_for_show_id_with_pending_action(
        conn: &mut SqliteConnection,
        show_id: i64,
        action: PendingAction,
    ) -> QueryResult<Vec<EpisodeWatchEntry>> {
        episode_watch_entries::table
            .inner_join(episodes::table.inner_join(seasons::table))
            .filter(seasons::show_id.eq(show_id))
            .filter(episode_watch_entries::pending_action.eq(action))
            .order(episode_watch_entries::id.asc())
            .select(EpisodeWatchEntry::as_select())
            .load(conn)
    }

    pub fn update_entries_to_pending_action(
        conn: &mut SqliteConnection,
        ids: &[i64],
        action: PendingAction,
    ) -> QueryResult<usize> {
        diesel::update(episode_watch_entries::table.filter(episode_watch_entries::id.eq_any(ids)))
            .set(episode_watch_entries::pending_action.eq(action))
            .execute(conn)
    }

    pub fn delete_with_ids(conn: &mut SqliteConnection, ids: &[i64]) -> QueryResult<usize> {
        diesel::delete(episode_watch_entries::table.filter(episode_watch_entries::id.eq_any(ids)))
            .execute(conn)
    }
}
