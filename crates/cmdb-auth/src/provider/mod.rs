//! Authentication providers.
//!
//! Every supported provider is a [`ProviderKind`]. The kind's stable name is
//! what the settings document and [`Identity::authenticator`] store; it is
//! matched back to the enum at the boundary, never dispatched by reflection.
//!
//! # Built-in Providers
//!
//! - **LocalProvider**: keyed password digest stored on the identity
//! - **DirectoryProvider**: bind against an external directory (LDAP-like),
//!   provisioning a local identity on first login

mod directory;
mod local;

pub use directory::DirectoryProvider;
pub use local::LocalProvider;

use std::sync::Arc;

use serde_json::Value;

use crate::config::{DirectoryConfig, LocalConfig, ProviderConfig, Validated};
use crate::credential::CredentialVerifier;
use crate::directory::DirectoryConnector;
use crate::error::AuthResult;
use crate::identity::{Identity, IdentityField, IdentityStore};

/// Supported provider kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Local,
    Directory,
}

impl ProviderKind {
    /// Built-in kinds in registration order.
    pub const BUILTIN: [ProviderKind; 2] = [ProviderKind::Local, ProviderKind::Directory];

    /// Stable identifier stored in settings and on identities.
    pub const fn name(self) -> &'static str {
        match self {
            ProviderKind::Local => "LocalProvider",
            ProviderKind::Directory => "DirectoryProvider",
        }
    }

    /// Match a stored identifier.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::BUILTIN.into_iter().find(|kind| kind.name() == name)
    }

    /// True if credentials are verified outside the application.
    pub const fn is_external(self) -> bool {
        matches!(self, ProviderKind::Directory)
    }

    /// True if the provider needs a password to authenticate.
    pub const fn password_required(self) -> bool {
        match self {
            ProviderKind::Local | ProviderKind::Directory => true,
        }
    }

    /// Declared defaults.
    pub fn default_config(self) -> ProviderConfig {
        match self {
            ProviderKind::Local => ProviderConfig::Local(LocalConfig::default()),
            ProviderKind::Directory => ProviderConfig::Directory(DirectoryConfig::default()),
        }
    }

    /// Build this kind's config from stored JSON with per-field fallback.
    pub fn validate_config(self, value: &Value) -> Validated<ProviderConfig> {
        match self {
            ProviderKind::Local => {
                LocalConfig::from_value(self.name(), value).map(ProviderConfig::Local)
            }
            ProviderKind::Directory => {
                DirectoryConfig::from_value(self.name(), value).map(ProviderConfig::Directory)
            }
        }
    }

    /// Create a provider instance. A config of another kind is replaced by
    /// this kind's defaults.
    pub fn build(
        self,
        config: &ProviderConfig,
        context: &ProviderContext,
    ) -> Box<dyn AuthenticationProvider> {
        match (self, config) {
            (ProviderKind::Local, ProviderConfig::Local(config)) => {
                Box::new(LocalProvider::new(config.clone(), context))
            }
            (ProviderKind::Local, _) => {
                Box::new(LocalProvider::new(LocalConfig::default(), context))
            }
            (ProviderKind::Directory, ProviderConfig::Directory(config)) => {
                Box::new(DirectoryProvider::new(config.clone(), context))
            }
            (ProviderKind::Directory, _) => {
                Box::new(DirectoryProvider::new(DirectoryConfig::default(), context))
            }
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Collaborators shared by all providers.
#[derive(Clone)]
pub struct ProviderContext {
    pub identities: Arc<dyn IdentityStore>,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub directory: Arc<dyn DirectoryConnector>,
    /// Multi-tenant mode: users log in with their e-mail address.
    pub cloud_mode: bool,
}

impl ProviderContext {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        verifier: Arc<dyn CredentialVerifier>,
        directory: Arc<dyn DirectoryConnector>,
    ) -> Self {
        Self {
            identities,
            verifier,
            directory,
            cloud_mode: false,
        }
    }

    pub fn with_cloud_mode(mut self, cloud_mode: bool) -> Self {
        self.cloud_mode = cloud_mode;
        self
    }

    /// Field a login name is looked up by.
    pub fn login_field(&self) -> IdentityField {
        if self.cloud_mode {
            IdentityField::Email
        } else {
            IdentityField::UserName
        }
    }
}

/// A configured provider instance.
pub trait AuthenticationProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Stable identifier, see [`ProviderKind::name`].
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    fn is_external(&self) -> bool {
        self.kind().is_external()
    }

    fn is_active(&self) -> bool;

    /// Effective configuration.
    fn config(&self) -> ProviderConfig;

    /// Verify credentials and return the matching identity.
    ///
    /// Invalid credentials and collaborator failures are reported as
    /// [`AuthError::AuthenticationFailed`](crate::AuthError::AuthenticationFailed).
    fn authenticate(&self, user_name: &str, password: &str) -> AuthResult<Identity>;
}
