//! Login entry point.
//!
//! [`AuthModule`] ties the registry, the reconciled settings and the
//! collaborators together and decides which provider handles a login:
//!
//! 1. A known user is handed to the provider recorded on the identity. That
//!    provider must be installed and activated; its answer is final.
//! 2. An unknown user is offered to every installed, activated provider in
//!    registration order until one accepts.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ConfigWarning;
use crate::error::{AuthError, AuthResult};
use crate::identity::Identity;
use crate::provider::{AuthenticationProvider, ProviderContext};
use crate::registry::{ProviderDescriptor, ProviderRegistry};
use crate::settings::{reconcile, AuthSettings};
use crate::token::{TokenIssuer, TokenPayload};

/// Message returned by [`AuthModule::login`] for every credential failure.
pub const LOGIN_FAILED: &str = "login failed";

/// Message returned when no provider accepted an unknown user.
pub const UNKNOWN_USER: &str = "unknown user could not login";

/// A successful login.
#[derive(Debug, Clone)]
pub struct LoginResult {
    pub identity: Identity,
    pub token: String,
    /// Unix seconds.
    pub issued_at: i64,
    /// Unix seconds.
    pub expires_at: i64,
}

/// Authentication module.
pub struct AuthModule {
    registry: Arc<ProviderRegistry>,
    settings: AuthSettings,
    context: ProviderContext,
    tokens: Arc<dyn TokenIssuer>,
}

impl AuthModule {
    /// Create a module from already reconciled settings.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        settings: AuthSettings,
        context: ProviderContext,
        tokens: Arc<dyn TokenIssuer>,
    ) -> Self {
        Self {
            registry,
            settings,
            context,
            tokens,
        }
    }

    /// Create a module from a stored settings document.
    pub fn from_stored(
        stored: &Value,
        registry: Arc<ProviderRegistry>,
        context: ProviderContext,
        tokens: Arc<dyn TokenIssuer>,
    ) -> Self {
        let settings = reconcile(stored, &registry).settings;
        Self::new(registry, settings, context, tokens)
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn context(&self) -> &ProviderContext {
        &self.context
    }

    /// Replace the settings with a freshly reconciled document.
    pub fn update_settings(&mut self, stored: &Value) -> Vec<ConfigWarning> {
        let reconciled = reconcile(stored, &self.registry);
        self.settings = reconciled.settings;
        reconciled.warnings
    }

    /// Instance of an installed provider with its current configuration.
    ///
    /// A provider installed after the settings were reconciled runs with
    /// its declared defaults.
    pub fn get_provider(&self, name: &str) -> Option<Box<dyn AuthenticationProvider>> {
        self.registry
            .get_by_name(name)
            .ok()
            .map(|descriptor| self.instantiate(descriptor))
    }

    /// Verify credentials and return the identity.
    ///
    /// Errors keep their detail; see [`login`](Self::login) for the form
    /// shown to clients.
    pub fn authenticate(&self, user_name: &str, password: &str) -> AuthResult<Identity> {
        let user_name = normalize(user_name);
        let field = self.context.login_field();

        match self.context.identities.find_by(field, &user_name) {
            Ok(Some(identity)) => self.authenticate_declared(&identity, &user_name, password),
            Ok(None) => self.authenticate_unknown(&user_name, password),
            Err(e) => {
                warn!(error = %e, user_name = %user_name, "user lookup failed");
                Err(AuthError::failed(format!("user lookup failed: {}", e)))
            }
        }
    }

    /// Authenticate and issue a token.
    ///
    /// Credential failures all come back as `AuthenticationFailed("login failed")`;
    /// configuration faults are returned as they are.
    pub fn login(&self, user_name: &str, password: &str) -> AuthResult<LoginResult> {
        let identity = match self.authenticate(user_name, password) {
            Ok(identity) => identity,
            Err(e) if e.is_authentication_failure() => {
                debug!(error = %e, "login rejected");
                return Err(AuthError::failed(LOGIN_FAILED));
            }
            Err(e) => {
                warn!(error = %e, "login aborted");
                return Err(e);
            }
        };

        let payload = TokenPayload {
            subject_id: identity.user_id,
            tenant: if self.context.cloud_mode {
                identity.database.clone()
            } else {
                None
            },
        };
        let issued = self
            .tokens
            .issue(&payload, self.settings.token_lifetime_seconds)?;

        info!(
            user_id = identity.user_id,
            provider = %identity.authenticator,
            "user logged in"
        );

        Ok(LoginResult {
            identity,
            token: issued.token,
            issued_at: issued.issued_at,
            expires_at: issued.expires_at,
        })
    }

    fn authenticate_declared(
        &self,
        identity: &Identity,
        user_name: &str,
        password: &str,
    ) -> AuthResult<Identity> {
        let descriptor = self.registry.get_by_name(&identity.authenticator)?;
        let provider = self.instantiate(descriptor);

        if !provider.is_active() {
            return Err(AuthError::ProviderNotActivated(provider.name().to_string()));
        }
        if provider.is_external() && !self.settings.enable_external {
            return Err(AuthError::ProviderNotActivated(format!(
                "{} (external providers are disabled)",
                provider.name()
            )));
        }

        provider.authenticate(user_name, password)
    }

    fn authenticate_unknown(&self, user_name: &str, password: &str) -> AuthResult<Identity> {
        for descriptor in self.registry.list_installed() {
            let provider = self.instantiate(descriptor);

            if !provider.is_active() {
                debug!(provider = descriptor.name, "skipping inactive provider");
                continue;
            }
            if provider.is_external() && !self.settings.enable_external {
                debug!(provider = descriptor.name, "skipping external provider");
                continue;
            }

            match provider.authenticate(user_name, password) {
                Ok(identity) => return Ok(identity),
                Err(e) if e.is_configuration_error() => return Err(e),
                Err(e) => {
                    debug!(provider = descriptor.name, error = %e, "provider rejected login");
                }
            }
        }

        Err(AuthError::failed(UNKNOWN_USER))
    }

    fn instantiate(&self, descriptor: ProviderDescriptor) -> Box<dyn AuthenticationProvider> {
        let default_config;
        let config = match self.settings.config_for(descriptor.name) {
            Some(config) => config,
            None => {
                default_config = descriptor.kind.default_config();
                &default_config
            }
        };
        descriptor.kind.build(config, &self.context)
    }
}

fn normalize(user_name: &str) -> String {
    user_name.trim().to_lowercase()
}
