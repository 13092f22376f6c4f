use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{AuthenticationProvider, ProviderContext, ProviderKind};
use crate::config::{DirectoryConfig, ProviderConfig};
use crate::directory::{
    render_filter, DirectoryConnector, DirectoryEntry, DirectoryError, DirectorySession,
};
use crate::error::{AuthError, AuthResult};
use crate::identity::{Identity, IdentityField, IdentityStore};

/// Attribute carrying group DNs on the user entry (Active Directory style).
const MEMBER_OF_ATTRIBUTE: &str = "memberOf";

/// Authenticates by binding to an external directory.
///
/// A successful login provisions a local identity for the user if none
/// exists yet, and keeps its group in sync while group mapping is active.
pub struct DirectoryProvider {
    config: DirectoryConfig,
    connector: Arc<dyn DirectoryConnector>,
    identities: Arc<dyn IdentityStore>,
    login_field: IdentityField,
}

impl DirectoryProvider {
    pub fn new(config: DirectoryConfig, context: &ProviderContext) -> Self {
        Self {
            config,
            connector: Arc::clone(&context.directory),
            identities: Arc::clone(&context.identities),
            login_field: context.login_field(),
        }
    }

    /// Find the single user entry and verify the password by binding as it.
    fn verify_user(
        &self,
        session: &mut dyn DirectorySession,
        user_name: &str,
        password: &str,
    ) -> AuthResult<DirectoryEntry> {
        let config = &self.config;
        let filter = render_filter(&config.search.search_filter, user_name);
        let mut entries = session
            .search(&config.search.base_dn, &filter)
            .map_err(|e| directory_failure(user_name, e))?;

        let entry = match entries.len() {
            1 => entries.remove(0),
            0 => {
                debug!(user_name, %filter, "user not in directory");
                return Err(AuthError::failed(format!(
                    "user {} not found in directory",
                    user_name
                )));
            }
            n => {
                warn!(user_name, %filter, matches = n, "directory search is ambiguous");
                return Err(AuthError::failed(format!(
                    "{} directory entries match {}",
                    n, user_name
                )));
            }
        };

        session
            .bind(&entry.dn, password)
            .map_err(|e| directory_failure(user_name, e))?;
        Ok(entry)
    }

    /// Internal group for the user. Only consulted after a successful bind.
    fn resolve_group(
        &self,
        session: &mut dyn DirectorySession,
        user_name: &str,
        entry: &DirectoryEntry,
    ) -> AuthResult<i64> {
        let config = &self.config;
        if !config.groups.active {
            return Ok(config.default_group);
        }

        let mut group_dns: Vec<String> = entry
            .attributes
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(MEMBER_OF_ATTRIBUTE))
            .flat_map(|(_, values)| values.iter().cloned())
            .collect();

        let filter = render_filter(&config.groups.search_filter_group, user_name);
        let found = session
            .search(&config.search.base_dn, &filter)
            .map_err(|e| directory_failure(user_name, e))?;
        group_dns.extend(found.into_iter().map(|group| group.dn));

        config
            .groups
            .resolve(&group_dns)
            .ok_or_else(|| AuthError::GroupMapping {
                user: user_name.to_string(),
                groups: group_dns,
            })
    }

    /// Return the local identity for a verified directory user, creating it if needed.
    fn provision(
        &self,
        user_name: &str,
        entry: &DirectoryEntry,
        group_id: i64,
    ) -> AuthResult<Identity> {
        let existing = self
            .identities
            .find_by(self.login_field, user_name)
            .map_err(|e| {
                warn!(error = %e, user_name, "user lookup failed");
                AuthError::failed(format!("user lookup failed: {}", e))
            })?;

        match existing {
            Some(mut identity) => {
                if self.config.groups.active && identity.group_id != Some(group_id) {
                    identity.group_id = Some(group_id);
                    self.identities.update(&identity).map_err(|e| {
                        warn!(error = %e, user_name, "failed to update directory user group");
                        AuthError::failed(format!("user update failed: {}", e))
                    })?;
                    info!(
                        user_id = identity.user_id,
                        group_id,
                        "updated directory user group"
                    );
                }
                Ok(identity)
            }
            None => {
                let mut identity = Identity::new(user_name, ProviderKind::Directory.name())
                    .with_group(group_id);
                // the login name is the address in cloud mode
                identity.email = match self.login_field {
                    IdentityField::Email => Some(user_name.to_string()),
                    IdentityField::UserName => entry.first("mail").map(str::to_ascii_lowercase),
                };
                identity.user_id = self.identities.insert(identity.clone()).map_err(|e| {
                    warn!(error = %e, user_name, "failed to provision directory user");
                    AuthError::failed(format!("user provisioning failed: {}", e))
                })?;
                info!(
                    user_id = identity.user_id,
                    user_name,
                    group_id,
                    "provisioned directory user"
                );
                Ok(identity)
            }
        }
    }
}

impl AuthenticationProvider for DirectoryProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Directory
    }

    fn is_active(&self) -> bool {
        self.config.active
    }

    fn config(&self) -> ProviderConfig {
        ProviderConfig::Directory(self.config.clone())
    }

    fn authenticate(&self, user_name: &str, password: &str) -> AuthResult<Identity> {
        if password.is_empty() {
            return Err(AuthError::failed("empty password"));
        }

        let config = &self.config;
        let mut session = self
            .connector
            .connect(&config.server_config, &config.connection_config)
            .map_err(|e| directory_failure(user_name, e))?;

        let entry = self.verify_user(session.as_mut(), user_name, password)?;
        let group_id = self.resolve_group(session.as_mut(), user_name, &entry)?;
        self.provision(user_name, &entry, group_id)
    }
}

fn directory_failure(user_name: &str, error: DirectoryError) -> AuthError {
    if matches!(error, DirectoryError::InvalidCredentials) {
        debug!(user_name, "directory bind rejected");
    } else {
        warn!(error = %error, user_name, "directory request failed");
    }
    AuthError::failed(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupMapping;
    use crate::credential::KeyedHashVerifier;
    use crate::directory::{StaticDirectory, StaticEntry};
    use crate::identity::SledIdentityStore;

    struct Fixture {
        context: ProviderContext,
        store: Arc<SledIdentityStore>,
        directory: StaticDirectory,
        _db: sled::Db,
    }

    fn fixture() -> Fixture {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let store = Arc::new(SledIdentityStore::open(&db).unwrap());
        let directory = StaticDirectory::new()
            .with_entry(
                StaticEntry::new("uid=bob,ou=people,dc=example,dc=com")
                    .with_password("bob-pw")
                    .with_attribute("uid", "bob")
                    .with_attribute("mail", "Bob@Example.com"),
            )
            .with_entry(
                StaticEntry::new("CN=Admins,OU=Groups,DC=example,DC=com")
                    .with_attribute("memberUid", "bob"),
            );
        let context = ProviderContext::new(
            store.clone(),
            Arc::new(KeyedHashVerifier::from_secret(b"test")),
            Arc::new(directory.clone()),
        );
        Fixture {
            context,
            store,
            directory,
            _db: db,
        }
    }

    fn active_config() -> DirectoryConfig {
        DirectoryConfig {
            active: true,
            ..DirectoryConfig::default()
        }
    }

    #[test]
    fn test_first_login_provisions_user() {
        let f = fixture();
        let provider = DirectoryProvider::new(active_config(), &f.context);

        let identity = provider.authenticate("bob", "bob-pw").unwrap();
        assert!(identity.user_id > 0);
        assert_eq!(identity.authenticator, "DirectoryProvider");
        assert_eq!(identity.group_id, Some(crate::config::DEFAULT_GROUP));
        assert_eq!(identity.email.as_deref(), Some("bob@example.com"));
        assert!(identity.password_hash.is_empty());

        // second login reuses the record
        let again = provider.authenticate("bob", "bob-pw").unwrap();
        assert_eq!(again.user_id, identity.user_id);
        assert_eq!(f.store.len(), 1);
    }

    fn cloud_config() -> DirectoryConfig {
        let mut config = active_config();
        config.search.search_filter = "(mail=%username%)".to_string();
        config
    }

    #[test]
    fn test_cloud_mode_reuses_identity_found_by_email() {
        let f = fixture();
        let existing = Identity::new("bob", "DirectoryProvider")
            .with_email("bob@example.com")
            .with_database("acme");
        let user_id = f.store.insert(existing).unwrap();
        let context = f.context.clone().with_cloud_mode(true);
        let provider = DirectoryProvider::new(cloud_config(), &context);

        let identity = provider.authenticate("bob@example.com", "bob-pw").unwrap();
        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.database.as_deref(), Some("acme"));
        assert_eq!(f.store.len(), 1);
    }

    #[test]
    fn test_cloud_mode_provisions_with_login_address() {
        let f = fixture();
        let context = f.context.clone().with_cloud_mode(true);
        let provider = DirectoryProvider::new(cloud_config(), &context);

        let identity = provider.authenticate("bob@example.com", "bob-pw").unwrap();
        assert_eq!(identity.email.as_deref(), Some("bob@example.com"));

        let again = provider.authenticate("bob@example.com", "bob-pw").unwrap();
        assert_eq!(again.user_id, identity.user_id);
        assert_eq!(f.store.len(), 1);
    }

    #[test]
    fn test_wrong_password() {
        let f = fixture();
        let provider = DirectoryProvider::new(active_config(), &f.context);

        let err = provider.authenticate("bob", "nope").unwrap_err();
        assert!(err.is_authentication_failure());
        assert!(f.store.is_empty());
    }

    #[test]
    fn test_unknown_user() {
        let f = fixture();
        let provider = DirectoryProvider::new(active_config(), &f.context);
        assert!(provider
            .authenticate("mallory", "pw")
            .unwrap_err()
            .is_authentication_failure());
    }

    #[test]
    fn test_connection_errors_are_authentication_failures() {
        let f = fixture();
        f.directory.set_failure(Some(DirectoryError::Timeout));
        let provider = DirectoryProvider::new(active_config(), &f.context);

        let err = provider.authenticate("bob", "bob-pw").unwrap_err();
        assert!(err.is_authentication_failure());
    }

    #[test]
    fn test_group_mapping_case_insensitive() {
        let f = fixture();
        let mut config = active_config();
        config.groups.active = true;
        config.groups.mapping = vec![GroupMapping::new("cn=admins,ou=groups,dc=example,dc=com", 5)];
        let provider = DirectoryProvider::new(config, &f.context);

        let identity = provider.authenticate("bob", "bob-pw").unwrap();
        assert_eq!(identity.group_id, Some(5));
    }

    #[test]
    fn test_unmapped_group_is_configuration_error() {
        let f = fixture();
        let mut config = active_config();
        config.groups.active = true;
        config.groups.mapping = vec![GroupMapping::new("cn=ops,ou=groups,dc=example,dc=com", 7)];
        let provider = DirectoryProvider::new(config, &f.context);

        let err = provider.authenticate("bob", "bob-pw").unwrap_err();
        match err {
            AuthError::GroupMapping { user, groups } => {
                assert_eq!(user, "bob");
                assert_eq!(groups, vec!["CN=Admins,OU=Groups,DC=example,DC=com".to_string()]);
            }
            other => panic!("expected GroupMapping, got {other:?}"),
        }
        assert!(f.store.is_empty());
    }

    #[test]
    fn test_unmapped_group_ignored_when_groups_inactive() {
        let f = fixture();
        let mut config = active_config();
        config.default_group = 9;
        config.groups.mapping = vec![GroupMapping::new("cn=ops,ou=groups,dc=example,dc=com", 7)];
        let provider = DirectoryProvider::new(config, &f.context);

        assert_eq!(provider.authenticate("bob", "bob-pw").unwrap().group_id, Some(9));
    }

    #[test]
    fn test_member_of_attribute() {
        let f = fixture();
        f.directory.add_entry(
            StaticEntry::new("uid=carol,ou=people,dc=example,dc=com")
                .with_password("carol-pw")
                .with_attribute("uid", "carol")
                .with_attribute("memberOf", "cn=Ops,ou=groups,dc=example,dc=com"),
        );
        let mut config = active_config();
        config.groups.active = true;
        config.groups.mapping = vec![GroupMapping::new("cn=ops,ou=groups,dc=example,dc=com", 7)];
        let provider = DirectoryProvider::new(config, &f.context);

        assert_eq!(provider.authenticate("carol", "carol-pw").unwrap().group_id, Some(7));
    }

    #[test]
    fn test_group_change_updates_record() {
        let f = fixture();
        let first = DirectoryProvider::new(active_config(), &f.context)
            .authenticate("bob", "bob-pw")
            .unwrap();

        let mut config = active_config();
        config.groups.active = true;
        config.groups.mapping = vec![GroupMapping::new("cn=admins,ou=groups,dc=example,dc=com", 5)];
        let updated = DirectoryProvider::new(config, &f.context)
            .authenticate("bob", "bob-pw")
            .unwrap();

        assert_eq!(updated.user_id, first.user_id);
        assert_eq!(updated.group_id, Some(5));
        assert_eq!(f.store.get(first.user_id).unwrap().unwrap().group_id, Some(5));
    }

    #[test]
    fn test_active_flag_and_external() {
        let f = fixture();
        let provider = DirectoryProvider::new(DirectoryConfig::default(), &f.context);
        assert!(!provider.is_active());
        assert!(provider.is_external());
    }
}
