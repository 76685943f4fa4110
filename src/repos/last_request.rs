use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::db::{Database, LastRequestDao};
use crate::error::{Result, StorageResultExt};
use crate::models::Request;

/// Throttle for one kind of remote fetch, keyed by the id of the entity fetched for.
#[derive(Clone)]
pub struct LastRequestStore {
    db: Database,
    request: Request,
}

impl LastRequestStore {
    pub fn new(db: Database, request: Request) -> LastRequestStore {
        LastRequestStore { db, request }
    }

    pub async fn last_request_instant(&self, entity_id: i64) -> Result<Option<DateTime<Utc>>> {
        let request = self.request;
        self.db
            .run(move |conn| {
                LastRequestDao::last_request(conn, request, entity_id)
                    .storage_context(|| format!("reading last {:?} of {}", request, entity_id))
            })
            .await
            .map(|last| last.map(|l| Utc.from_utc_datetime(&l.timestamp)))
    }

    /// True when never requested, or last requested before `instant`.
    pub async fn is_request_before(&self, entity_id: i64, instant: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .last_request_instant(entity_id)
            .await?
            .map_or(true, |last| last < instant))
    }

    pub async fn is_request_expired(&self, entity_id: i64, max_age: Duration) -> Result<bool> {
        self.is_request_before(entity_id, Utc::now() - max_age).await
    }

    pub async fn has_been_requested(&self, entity_id: i64) -> Result<bool> {
        Ok(self.last_request_instant(entity_id).await?.is_some())
    }

    pub async fn update_last_request(&self, entity_id: i64) -> Result<()> {
        self.update_last_request_at(entity_id, Utc::now()).await
    }

    pub async fn update_last_request_at(&self, entity_id: i64, at: DateTime<Utc>) -> Result<()> {
        let request = self.request;
        self.db
            .run(move |conn| {
                LastRequestDao::record(conn, request, entity_id, at.naive_utc())
                    .storage_context(|| format!("recording {:?} of {}", request, entity_id))
            })
            .await
            .map(|_| ())
    }

    /// Forget the last fetch so the next check refreshes.
    pub async fn invalidate_last_request(&self, entity_id: i64) -> Result<()> {
        let request = self.request;
        self.db
            .run(move |conn| {
                LastRequestDao::delete(conn, request, entity_id)
                    .storage_context(|| format!("clearing {:?} of {}", request, entity_id))
            })
            .await
            .map(|_| ())
    }
}

/// Whether a `kind` fetch for `entity_id` is due: never done, or older than `max_age`.
pub async fn should_refresh(
    db: &Database,
    kind: Request,
    entity_id: i64,
    max_age: Duration,
) -> Result<bool> {
    LastRequestStore::new(db.clone(), kind)
        .is_request_expired(entity_id, max_age)
        .await
}
