//! Error types for RateWatch

use thiserror::Error;

/// Result type alias using RateWatch's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for RateWatch operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found error
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record looked up
        entity: String,
        /// Identifier that matched nothing
        id: String,
    },

    /// A concurrent writer touched the same key
    #[error("Write conflict on {0}")]
    StoreWriteConflict(String),

    /// Another cycle of the same kind is still running
    #[error("{0} cycle already in progress")]
    CycleInProgress(&'static str),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Map a write-path database error, surfacing serialization failures and
    /// deadlocks as [`Error::StoreWriteConflict`].
    pub fn from_write(err: sqlx::Error, key: impl Into<String>) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if matches!(db.code().as_deref(), Some("40001" | "40P01")) {
                return Self::StoreWriteConflict(key.into());
            }
        }
        Self::Database(err)
    }

    /// Whether retrying the same write may succeed
    pub fn is_write_conflict(&self) -> bool {
        matches!(self, Self::StoreWriteConflict(_))
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
