use diesel::prelude::*;

use crate::db::entity::entity_dao;
use crate::models::{FollowedShowEntry, PendingAction};
use crate::schema::followed_shows;

pub struct FollowedShowsDao;

entity_dao!(
    FollowedShowsDao,
    FollowedShowEntry,
    followed_shows,
    "followed show"
);

impl FollowedShowsDao {
    pub fn entries(conn: &mut SqliteConnection) -> QueryResult<Vec<FollowedShowEntry>> {
        followed_shows::table
            .order(followed_shows::id.asc())
            .select(FollowedShowEntry::as_select())
            .load(conn)
    }

    pub fn entry_with_show_id(
        conn: &mut SqliteConnection,
        show_id: i64,
    ) -> QueryResult<Option<FollowedShowEntry>> {
        followed_shows::table
            .filter(followed_shows::show_id.eq(show_id))
            .select(FollowedShowEntry::as_select())
            .first(conn)
            .optional()
    }

    pub fn entry_count_with_show_id_not_pending_delete(
        conn: &mut SqliteConnection,
        show_id: i64,
    ) -> QueryResult<i64> {
        followed_shows::table
            .filter(followed_shows::show_id.eq(show_id))
            .filter(followed_shows::pending_action.ne(PendingAction::Delete))
            .count()
            .get_result(conn)
    }

    pub fn entries_with_pending_action(
        conn: &mut SqliteConnection,
        action: PendingAction,
    ) -> QueryResult<Vec<FollowedShowEntry>> {
        followed_shows::table
            .filter(followed_shows::pending_action.eq(action))
            .order(followed_shows::id.asc())
            .select(FollowedShowEntry::as_select())
            .load(conn)
    }

    pub fn update_entries_to_pending_action(
        conn: &mut SqliteConnection,
        ids: &[i64],
        action: PendingAction,
    ) -> QueryResult<usize> {
        diesel::update(followed_shows::table.filter(followed_shows::id.eq_any(ids)))
            .set(followed_shows::pending_action.eq(action))
            .execute(conn)
    }

    pub fn delete_with_ids(conn: &mut SqliteConnection, ids: &[i64]) -> QueryResult<usize> {
        diesel::delete(followed_shows::table.filter(followed_shows::id.eq_any(ids))).execute(conn)
    }

    /// A show can only be followed once, so an entry already on `to` wins over the one on `from`.
    pub fn reassign_show(conn: &mut SqliteConnection, from: i64, to: i64) -> QueryResult<usize> {
        if Self::entry_with_show_id(conn, to)?.is_some() {
            return diesel::delete(followed_shows::table.filter(followed_shows::show_id.eq(from)))
                .execute(conn);
        }

        diesel::update(followed_shows::table.filter(followed_shows::show_id.eq(from)))
            .set(followed_shows::show_id.eq(to))
            .execute(conn)
    }
}
