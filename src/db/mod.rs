/// Local store:
/// - one SQLite connection shared behind an async mutex
/// - schema migrations applied on connect
/// - one DAO per table, all built on the `EntityDao` upsert primitive
pub mod entity;
pub mod episodes;
pub mod followed;
pub mod last_requests;
pub mod seasons;
pub mod shows;
pub mod watches;

pub use entity::EntityDao;
pub use episodes::EpisodesDao;
pub use followed::FollowedShowsDao;
pub use last_requests::LastRequestDao;
pub use seasons::SeasonsDao;
pub use shows::ShowDao;
pub use watches::EpisodeWatchEntryDao;

use std::sync::Arc;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::*;
use tokio::sync::Mutex;

use crate::error::{Result, StorageResultExt, SyncError};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<SqliteConnection>>,
}

impl Database {
    pub fn connect(database_url: &str) -> Result<Database> {
        let mut conn = SqliteConnection::establish(database_url)?;
        prepare(&mut conn)?;
        info!("Opened database at {}", database_url);

        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Fresh, empty, fully migrated database that lives as long as the handle.
    pub fn in_memory() -> Result<Database> {
        Database::connect(":memory:")
    }

    /// Run `f` against the connection. Every statement auto-commits.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T>,
    {
        let mut conn = self.conn.lock().await;
        f(&mut conn)
    }

    /// Run `f` inside one transaction: either all of its writes land or none do.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T>,
    {
        let mut conn = self.conn.lock().await;
        conn.transaction(|conn| f(conn))
    }
}

fn prepare(conn: &mut SqliteConnection) -> Result<()> {
    conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
        .storage_context(|| "configuring connection")?;
    run_migrations(conn)
}

fn run_migrations(conn: &mut SqliteConnection) -> Result<()> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(SyncError::Migration)?;

    for version in applied {
        info!("Applied migration {}", version);
    }
    Ok(())
}
