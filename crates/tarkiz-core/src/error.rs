//! Core error types for tarkiz-core.
//!
//! Domain failures (bad input, unknown ids, quota, unlock outcomes) live on
//! [`CoreError`] directly; storage and credential failures are wrapped from
//! their own enums.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Core error type for tarkiz-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Bad coordinate, date, angle, adjustment or ordering.
    #[error("Invalid value for '{field}': {message}")]
    InputValidation { field: String, message: String },

    /// Unknown calculation method, app, city or prayer mode.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// No emergency unlocks left in the current period.
    #[error("Emergency unlock quota exhausted ({limit} per period), resets at {resets_at}")]
    QuotaExhausted {
        limit: u32,
        resets_at: DateTime<Utc>,
    },

    /// Unlock hardware or sensor is not present.
    #[error("Unlock method unavailable: {0}")]
    Unavailable(String),

    /// Unlock attempt was rejected.
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// Unlock prompt dismissed before it resolved.
    #[error("Unlock attempt cancelled")]
    Cancelled,

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Credential store errors
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::InputValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Expected outcomes the UI shows as a recoverable message.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            CoreError::QuotaExhausted { .. }
                | CoreError::VerificationFailed(_)
                | CoreError::Cancelled
                | CoreError::Unavailable(_)
        )
    }
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Credential store errors.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Credential item not found: {0}")]
    NotFound(String),

    #[error("Failed to write credential '{key}': {message}")]
    WriteFailed { key: String, message: String },

    #[error("Failed to read credential '{key}': {message}")]
    ReadFailed { key: String, message: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_facing_classification() {
        assert!(CoreError::Cancelled.is_user_facing());
        assert!(CoreError::VerificationFailed("wrong tag".into()).is_user_facing());
        assert!(!CoreError::invalid("latitude", "out of range").is_user_facing());
        assert!(!CoreError::not_found("method", "xyz").is_user_facing());
    }

    #[test]
    fn not_found_message_names_kind_and_id() {
        let err = CoreError::not_found("app", "tiktok");
        assert_eq!(err.to_string(), "app not found: tiktok");
    }

    #[test]
    fn busy_sqlite_maps_to_locked() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(DatabaseError::from(err), DatabaseError::Locked));
    }
}
