//! Command-line error types.

use cmdb_auth::{AuthError, StoreError};
use thiserror::Error;

/// Errors reported by the command-line tool.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("database error: {0}")]
    Database(#[from] sled::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The command needs `--secret` / `CMDB_SECRET`.
    #[error("no application secret configured (set --secret or CMDB_SECRET)")]
    MissingSecret,

    #[error("provider not installed: {0}")]
    UnknownProvider(String),

    #[error("user already exists: {0}")]
    UserExists(String),
}

/// Result type for command-line operations.
pub type CliResult<T> = Result<T, CliError>;
