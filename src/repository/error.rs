//! Repository error types.

use thiserror::Error;

/// Result type for repository and refresh operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur while introspecting a database or refreshing the
/// schema cache.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The dialect does not support this operation. Callers treat this as
    /// "feature unavailable" rather than as a failure.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// No repository exists for the configured dialect.
    #[error("unsupported driver: {0}")]
    UnsupportedDriver(String),

    /// Could not open the data source.
    #[error("database connection failed: {0}")]
    ConnectionFailed(String),

    /// SQLite driver error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// An introspection or passthrough query failed.
    #[error("query failed: {0}")]
    Query(String),

    /// The refresh worker has been stopped.
    #[error("refresh worker is stopped")]
    WorkerStopped,

    /// The connection configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SchemaError {
    /// Check if this error means the operation is unsupported by the dialect.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented(_))
    }
}

impl From<crate::config::ConnectionError> for SchemaError {
    fn from(err: crate::config::ConnectionError) -> Self {
        match err {
            crate::config::ConnectionError::UnsupportedDriver(name) => {
                Self::UnsupportedDriver(name)
            }
            other => Self::InvalidConfig(other.to_string()),
        }
    }
}
