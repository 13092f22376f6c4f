//! Authentication error types.

use thiserror::Error;

/// Authentication errors.
///
/// Credential failures are collapsed into [`AuthError::AuthenticationFailed`];
/// everything else describes a server-side configuration fault.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Credentials invalid, identity unknown, or no provider accepted the login.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A referenced provider name is not in the registry.
    #[error("provider not installed: {0}")]
    ProviderNotInstalled(String),

    /// The provider is disabled, or external providers are disabled globally.
    #[error("provider not activated: {0}")]
    ProviderNotActivated(String),

    /// Directory groups could not be mapped to an internal group.
    #[error("no group mapping for user {user} (directory groups: {groups:?})")]
    GroupMapping {
        /// Directory user that was authenticated.
        user: String,
        /// Group DNs found for the user.
        groups: Vec<String>,
    },

    /// Token could not be issued or verified.
    #[error("token error: {0}")]
    Token(String),

    /// Persistence error outside of a provider's authenticate path.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl AuthError {
    /// Shorthand for a credential failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        AuthError::AuthenticationFailed(reason.into())
    }

    /// True for faults an operator has to fix (surfaced as 503-class errors).
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            AuthError::ProviderNotInstalled(_)
                | AuthError::ProviderNotActivated(_)
                | AuthError::GroupMapping { .. }
        )
    }

    /// True for plain credential failures.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, AuthError::AuthenticationFailed(_))
    }
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors raised by the sled-backed stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database error.
    #[error("database error: {0}")]
    Sled(#[from] sled::Error),

    /// Value could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Stored value could not be decoded.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
