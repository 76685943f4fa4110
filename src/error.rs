use diesel::result::{DatabaseErrorKind, Error as DieselError};

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("network request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The remote service rejected our credentials. Callers clear the session on this.
    #[error("remote service returned 401 unauthorized")]
    Unauthorized,

    #[error("{url} returned {status}")]
    Http {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("storage failure while {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: DieselError,
    },

    #[error("database error: {0}")]
    Database(#[from] DieselError),

    #[error("could not migrate database: {0}")]
    Migration(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("could not open database: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("no {entity} with id {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("no remote source returned data for {0}")]
    NoData(String),

    #[error("not logged in")]
    NotLoggedIn,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SyncError::Unauthorized)
    }

    pub fn not_found(entity: &'static str, id: i64) -> SyncError {
        SyncError::NotFound { entity, id }
    }
}

/// Returns true for a UNIQUE constraint failure, the one storage error an upsert may resolve.
pub fn is_unique_violation(err: &DieselError) -> bool {
    matches!(
        err,
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}

/// Attach "which entity, which operation" to a storage failure.
pub trait StorageResultExt<T> {
    fn storage_context<C, F>(self, context: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> StorageResultExt<T> for std::result::Result<T, DieselError> {
    fn storage_context<C, F>(self, context: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|source| SyncError::Storage {
            context: context().into(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_context_names_the_operation() {
        let res: std::result::Result<(), DieselError> = Err(DieselError::NotFound);
        let err = res.storage_context(|| "upserting show 4").unwrap_err();
        assert_eq!(
            err.to_string(),
            "storage failure while upserting show 4: Record not found"
        );
    }

    #[test]
    fn only_unauthorized_is_unauthorized() {
        assert!(SyncError::Unauthorized.is_unauthorized());
        assert!(!SyncError::NotLoggedIn.is_unauthorized());
        assert!(!is_unique_violation(&DieselError::NotFound));
    }
}
