//! Storage error type with row-local vs batch-fatal classification.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Fatal errors abort the whole import; everything else is recoverable at
    /// the row level (constraint violations, bad values).
    pub fn is_fatal(&self) -> bool {
        match self {
            StoreError::Migrate(_) => true,
            StoreError::Database(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::Protocol(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Configuration(_)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_errors_are_fatal() {
        let err = StoreError::Database(sqlx::Error::PoolClosed);
        assert!(err.is_fatal());

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(StoreError::Database(sqlx::Error::Io(io)).is_fatal());
    }

    #[test]
    fn row_level_errors_are_not_fatal() {
        assert!(!StoreError::Database(sqlx::Error::RowNotFound).is_fatal());
        assert!(!StoreError::Database(sqlx::Error::ColumnNotFound("inserted".into())).is_fatal());
    }
}
