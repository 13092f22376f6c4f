//! CMDB Auth - Pluggable authentication for the CMDB.
//!
//! This crate provides the provider registry, the authentication settings
//! and their reconciliation, the built-in providers (local password and
//! external directory), and the login flow that picks a provider and issues
//! a token.

pub mod config;
pub mod credential;
pub mod directory;
pub mod error;
pub mod identity;
pub mod module;
pub mod provider;
pub mod registry;
pub mod settings;
pub mod token;

pub use config::{
    ConfigWarning, ConnectionConfig, DirectoryConfig, GroupMapping, GroupsConfig, LocalConfig,
    ProviderConfig, SearchConfig, ServerConfig, Validated,
};
pub use credential::{CredentialVerifier, KeyedHashVerifier};
pub use directory::{
    DirectoryConnector, DirectoryEntry, DirectoryError, DirectorySession, StaticDirectory,
    StaticEntry,
};
pub use error::{AuthError, AuthResult, StoreError, StoreResult};
pub use identity::{Identity, IdentityField, IdentityStore, SledIdentityStore};
pub use module::{AuthModule, LoginResult, LOGIN_FAILED, UNKNOWN_USER};
pub use provider::{
    AuthenticationProvider, DirectoryProvider, LocalProvider, ProviderContext, ProviderKind,
};
pub use registry::{ProviderDescriptor, ProviderRegistry, ProviderSummary};
pub use settings::{
    reconcile, AuthSettings, ProviderEntry, Reconciled, SettingsStore, StaleEntry,
    DEFAULT_TOKEN_LIFETIME_SECS,
};

// Token exports
pub use token::{IssuedToken, JwtTokenIssuer, TokenClaims, TokenIssuer, TokenPayload};
