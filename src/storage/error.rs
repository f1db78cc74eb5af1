//! Error types for storage operations

use std::fmt;

use crate::UnknownVariant;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug)]
pub enum StorageError {
    ConnectionFailed(String),

    QueryFailed(String),

    MigrationFailed(String),

    /// A stored value does not decode into its domain type (unknown enum text and the like)
    CorruptRow(String),

    /// The row addressed by an update does not exist
    NotFound(String),

    /// The write would break a uniqueness rule, e.g. a second active alert of one kind
    Conflict(String),

    Io(std::io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed(msg) => write!(f, "cannot open store: {msg}"),
            StorageError::QueryFailed(msg) => write!(f, "query failed: {msg}"),
            StorageError::MigrationFailed(msg) => write!(f, "schema migration failed: {msg}"),
            StorageError::CorruptRow(msg) => write!(f, "corrupt row: {msg}"),
            StorageError::NotFound(what) => write!(f, "{what} not found"),
            StorageError::Conflict(msg) => write!(f, "conflict: {msg}"),
            StorageError::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl From<UnknownVariant> for StorageError {
    fn from(err: UnknownVariant) -> Self {
        StorageError::CorruptRow(err.to_string())
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => StorageError::Io(io_err),
            sqlx::Error::RowNotFound => StorageError::NotFound("row".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StorageError::Conflict(db_err.message().to_string())
            }
            other => StorageError::QueryFailed(other.to_string()),
        }
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::MigrationFailed(err.to_string())
    }
}
