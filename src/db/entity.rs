use diesel::prelude::*;
use log::*;

use crate::error::is_unique_violation;
use crate::models::TiviEntity;

/// Insert-or-update keyed by internal id presence.
///
/// * id `0`: insert, return the generated id
/// * any other id: update that row, return the same id. If the row is gone it is recreated
///   with its old id.
///
/// Applying the same value twice leaves the table exactly as applying it once.
pub trait EntityDao {
    type Entity: TiviEntity;

    /// Used in log lines and error contexts.
    const NAME: &'static str;

    fn insert(conn: &mut SqliteConnection, entity: &Self::Entity) -> QueryResult<i64>;

    /// Returns the number of rows touched (0 or 1).
    fn update(conn: &mut SqliteConnection, entity: &Self::Entity) -> QueryResult<usize>;

    fn delete_entity(conn: &mut SqliteConnection, entity: &Self::Entity) -> QueryResult<usize>;

    fn entity_with_id(conn: &mut SqliteConnection, id: i64) -> QueryResult<Option<Self::Entity>>;

    fn upsert(conn: &mut SqliteConnection, entity: &Self::Entity) -> QueryResult<i64> {
        if entity.id() == 0 {
            let id = Self::insert(conn, entity)?;
            trace!("Inserted {} {}", Self::NAME, id);
            return Ok(id);
        }

        if Self::update(conn, entity)? == 0 {
            debug!("{} {} missing on update, inserting", Self::NAME, entity.id());
            return Self::insert(conn, entity);
        }

        trace!("Updated {} {}", Self::NAME, entity.id());
        Ok(entity.id())
    }

    fn upsert_all(conn: &mut SqliteConnection, entities: &[Self::Entity]) -> QueryResult<Vec<i64>> {
        entities.iter().map(|e| Self::upsert(conn, e)).collect()
    }

    /// Like [`EntityDao::upsert`], but a UNIQUE violation is handed to `on_conflict` instead of
    /// failing. Any other error propagates untouched.
    fn upsert_or_else<F>(
        conn: &mut SqliteConnection,
        entity: &Self::Entity,
        on_conflict: F,
    ) -> QueryResult<i64>
    where
        F: FnOnce(&mut SqliteConnection, &Self::Entity) -> QueryResult<i64>,
    {
        match Self::upsert(conn, entity) {
            Err(err) if is_unique_violation(&err) => {
                debug!("Conflict saving {} {:?}: {}", Self::NAME, entity.id(), err);
                on_conflict(conn, entity)
            }
            other => other,
        }
    }
}

/// Implements [`EntityDao`] for a DAO over one table whose primary key is `id`.
macro_rules! entity_dao {
    ($dao:ident, $entity:ty, $table:ident, $name:literal) => {
        impl $crate::db::entity::EntityDao for $dao {
            type Entity = $entity;

            const NAME: &'static str = $name;

            fn insert(
                conn: &mut diesel::SqliteConnection,
                entity: &$entity,
            ) -> diesel::QueryResult<i64> {
                use $crate::schema::$table;

                if entity.id == 0 {
                    diesel::insert_into($table::table)
                        .values(entity)
                        .returning($table::id)
                        .get_result(conn)
                } else {
                    diesel::insert_into($table::table)
                        .values(($table::id.eq(entity.id), entity))
                        .returning($table::id)
                        .get_result(conn)
                }
            }

            fn update(
                conn: &mut diesel::SqliteConnection,
                entity: &$entity,
            ) -> diesel::QueryResult<usize> {
                use $crate::schema::$table;

                diesel::update($table::table.find(entity.id))
                    .set(entity)
                    .execute(conn)
            }

            fn delete_entity(
                conn: &mut diesel::SqliteConnection,
                entity: &$entity,
            ) -> diesel::QueryResult<usize> {
                use $crate::schema::$table;

                diesel::delete($table::table.find(entity.id)).execute(conn)
            }

            fn entity_with_id(
                conn: &mut diesel::SqliteConnection,
                id: i64,
            ) -> diesel::QueryResult<Option<$entity>> {
                use $crate::schema::$table;

                $table::table
                    .find(id)
                    .select(<$entity>::as_select())
                    .first(conn)
                    .optional()
            }
        }
    };
}

pub(crate) use entity_dao;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, FollowedShowsDao, ShowDao};
    use crate::models::{FollowedShowEntry, PendingAction, Show};

    fn show(title: &str) -> Show {
        Show {
            title: Some(title.to_string()),
            ..Show::EMPTY
        }
    }

    #[tokio::test]
    async fn upsert_with_same_id_is_idempotent() {
        let db = Database::in_memory().unwrap();
        db.run(|conn| {
            let id = ShowDao::upsert(conn, &show("Dark"))?;
            let saved = Show {
                id,
                summary: Some("Time travel".to_string()),
                ..show("Dark")
            };

            assert_eq!(ShowDao::upsert(conn, &saved)?, id);
            assert_eq!(ShowDao::upsert(conn, &saved)?, id);

            let all = ShowDao::all(conn)?;
            assert_eq!(all, vec![saved]);
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn upsert_with_zero_id_inserts_each_time() {
        let db = Database::in_memory().unwrap();
        db.run(|conn| {
            let first = ShowDao::upsert(conn, &show("Dark"))?;
            let second = ShowDao::upsert(conn, &show("Dark"))?;
            assert_ne!(first, second);
            assert_eq!(ShowDao::all(conn)?.len(), 2);
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn upsert_recreates_missing_row_with_its_id() {
        let db = Database::in_memory().unwrap();
        db.run(|conn| {
            let ghost = Show {
                id: 42,
                ..show("Ghost")
            };
            assert_eq!(ShowDao::upsert(conn, &ghost)?, 42);
            assert_eq!(ShowDao::entity_with_id(conn, 42)?, Some(ghost));
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn conflict_without_handler_propagates() {
        let db = Database::in_memory().unwrap();
        db.run(|conn| {
            let show_id = ShowDao::insert(conn, &show("Dark"))?;
            let entry = FollowedShowEntry {
                show_id,
                pending_action: PendingAction::Upload,
                ..Default::default()
            };
            FollowedShowsDao::upsert(conn, &entry)?;

            let err = FollowedShowsDao::upsert(conn, &entry).unwrap_err();
            assert!(is_unique_violation(&err));

            let resolved = FollowedShowsDao::upsert_or_else(conn, &entry, |conn, e| {
                Ok(FollowedShowsDao::entry_with_show_id(conn, e.show_id)?
                    .map(|existing| existing.id)
                    .unwrap_or_default())
            })?;
            assert_ne!(resolved, 0);
            Ok(())
        })
        .await
        .unwrap();
    }
}
