//! Error types for the leveling store
//!
//! Runtime data errors are returned as `Err(StoreError)` from every
//! DataStore operation. Only configuration and connection errors abort
//! startup.

/// Generic result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Top-level error for every store and manager operation
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{operation} on '{path}': expected {expected}, found {found}")]
    InvalidTargetType {
        operation: &'static str,
        path: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("Invalid key path: '{0}'")]
    InvalidPath(String),
    #[error("{operation} on '{path}': index {index} out of bounds (len {len})")]
    IndexOutOfBounds {
        operation: &'static str,
        path: String,
        index: usize,
        len: usize,
    },
    #[error("Store is not loaded yet")]
    NotReady,
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised by a storage medium
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Malformed content in {medium}: {reason}")]
    Malformed { medium: String, reason: String },
    #[error("Storage medium not found: {medium}")]
    NotFound { medium: String },
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("LMDB error: {0}")]
    Lmdb(#[from] heed::Error),
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while resolving configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Required config option missing: {0}")]
    RequiredConfigOptionMissing(&'static str),
    #[error("Unknown database: '{0}' (expected json, lmdb or postgres)")]
    UnknownDatabase(String),
    #[error("Invalid value for {option}: '{value}'")]
    InvalidValue { option: &'static str, value: String },
}

impl From<heed::Error> for StoreError {
    fn from(e: heed::Error) -> Self {
        StoreError::Database(DatabaseError::Lmdb(e))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(DatabaseError::Postgres(e))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Database(DatabaseError::Io(e))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Database(DatabaseError::Json(e))
    }
}

impl StoreError {
    /// True for the numeric/array type-guard failures
    pub fn is_invalid_target(&self) -> bool {
        matches!(self, StoreError::InvalidTargetType { .. })
    }

    /// True for errors that come from the backend medium itself
    pub fn is_database(&self) -> bool {
        matches!(self, StoreError::Database(_))
    }
}
