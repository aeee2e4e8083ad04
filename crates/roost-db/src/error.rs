use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A UNIQUE or PRIMARY KEY constraint rejected the write. Callers treat
    /// this as a retryable conflict, not a crash.
    #[error("duplicate row violates a uniqueness constraint")]
    Duplicate,

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(err, _) = &e {
            if err.code == rusqlite::ErrorCode::ConstraintViolation {
                return StoreError::Duplicate;
            }
        }
        StoreError::Sqlite(e)
    }
}
