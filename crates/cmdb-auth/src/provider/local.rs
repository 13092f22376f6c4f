use std::sync::Arc;

use tracing::{debug, warn};

use super::{AuthenticationProvider, ProviderContext, ProviderKind};
use crate::config::{LocalConfig, ProviderConfig};
use crate::credential::CredentialVerifier;
use crate::error::{AuthError, AuthResult};
use crate::identity::{Identity, IdentityField, IdentityStore};

/// Authenticates against the password digest stored on the identity.
pub struct LocalProvider {
    config: LocalConfig,
    identities: Arc<dyn IdentityStore>,
    verifier: Arc<dyn CredentialVerifier>,
    login_field: IdentityField,
}

impl LocalProvider {
    pub fn new(config: LocalConfig, context: &ProviderContext) -> Self {
        Self {
            config,
            identities: Arc::clone(&context.identities),
            verifier: Arc::clone(&context.verifier),
            login_field: context.login_field(),
        }
    }
}

impl AuthenticationProvider for LocalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    /// Always active; the stored flag is ignored.
    fn is_active(&self) -> bool {
        true
    }

    fn config(&self) -> ProviderConfig {
        ProviderConfig::Local(self.config.clone())
    }

    fn authenticate(&self, user_name: &str, password: &str) -> AuthResult<Identity> {
        let identity = match self.identities.find_by(self.login_field, user_name) {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                debug!(user_name, field = %self.login_field, "no local user");
                return Err(AuthError::failed(format!("user {} not found", user_name)));
            }
            Err(e) => {
                warn!(error = %e, user_name, "user lookup failed");
                return Err(AuthError::failed(format!("user lookup failed: {}", e)));
            }
        };

        if identity.password_hash.is_empty()
            || !self.verifier.verify(password, &identity.password_hash)
        {
            debug!(user_name, "password mismatch");
            return Err(AuthError::failed(format!("wrong password for {}", user_name)));
        }

        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::KeyedHashVerifier;
    use crate::directory::StaticDirectory;
    use crate::identity::SledIdentityStore;

    fn context() -> (ProviderContext, Arc<SledIdentityStore>, sled::Db) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let store = Arc::new(SledIdentityStore::open(&db).unwrap());
        let context = ProviderContext::new(
            store.clone(),
            Arc::new(KeyedHashVerifier::from_secret(b"test")),
            Arc::new(StaticDirectory::new()),
        );
        (context, store, db)
    }

    #[test]
    fn test_local_success_and_wrong_password() {
        let (context, store, _db) = context();
        let hash = context.verifier.hash("secret");
        store
            .insert(Identity::new("alice", "LocalProvider").with_password_hash(hash))
            .unwrap();

        let provider = LocalProvider::new(LocalConfig::default(), &context);
        let identity = provider.authenticate("alice", "secret").unwrap();
        assert_eq!(identity.user_name, "alice");

        let err = provider.authenticate("alice", "wrong").unwrap_err();
        assert!(err.is_authentication_failure());
    }

    #[test]
    fn test_unknown_user() {
        let (context, _store, _db) = context();
        let provider = LocalProvider::new(LocalConfig::default(), &context);
        assert!(provider
            .authenticate("nobody", "secret")
            .unwrap_err()
            .is_authentication_failure());
    }

    #[test]
    fn test_empty_hash_never_matches() {
        let (context, store, _db) = context();
        store
            .insert(Identity::new("dave", "DirectoryProvider"))
            .unwrap();

        let provider = LocalProvider::new(LocalConfig::default(), &context);
        assert!(provider.authenticate("dave", "").is_err());
    }

    #[test]
    fn test_cloud_mode_uses_email() {
        let (context, store, _db) = context();
        let context = context.with_cloud_mode(true);
        let hash = context.verifier.hash("pw");
        store
            .insert(
                Identity::new("erin", "LocalProvider")
                    .with_email("erin@acme.io")
                    .with_password_hash(hash)
                    .with_database("acme"),
            )
            .unwrap();

        let provider = LocalProvider::new(LocalConfig::default(), &context);
        assert!(provider.authenticate("erin@acme.io", "pw").is_ok());
        assert!(provider.authenticate("erin", "pw").is_err());
    }

    #[test]
    fn test_always_active() {
        let (context, _store, _db) = context();
        let provider = LocalProvider::new(LocalConfig { active: false }, &context);
        assert!(provider.is_active());
        assert!(!provider.is_external());
        assert_eq!(provider.name(), "LocalProvider");
    }
}
