//! User identities and the store they are looked up in.
//!
//! The authentication core only reads identities, except for the directory
//! provider which provisions a record on a user's first successful login.

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

const USER_TREE_NAME: &[u8] = b"auth:users";

/// A user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Public user id. Assigned by the store on insert.
    pub user_id: u64,
    /// Login name, stored case-folded.
    pub user_name: String,
    /// E-mail address, used as login name in cloud mode.
    #[serde(default)]
    pub email: Option<String>,
    /// Hex digest produced by the credential verifier. Empty for external users.
    #[serde(default)]
    pub password_hash: String,
    /// Name of the provider that authenticates this user.
    pub authenticator: String,
    /// Internal group id.
    #[serde(default)]
    pub group_id: Option<i64>,
    /// Tenant database (cloud mode only).
    #[serde(default)]
    pub database: Option<String>,
}

impl Identity {
    /// Create a new identity for the given provider. The id is assigned on insert.
    pub fn new(user_name: impl Into<String>, authenticator: impl Into<String>) -> Self {
        Self {
            user_id: 0,
            user_name: user_name.into(),
            email: None,
            password_hash: String::new(),
            authenticator: authenticator.into(),
            group_id: None,
            database: None,
        }
    }

    /// Set the e-mail address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the stored password digest.
    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = hash.into();
        self
    }

    /// Set the internal group.
    pub fn with_group(mut self, group_id: i64) -> Self {
        self.group_id = Some(group_id);
        self
    }

    /// Set the tenant database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}

/// Field an identity can be looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    UserName,
    Email,
}

impl std::fmt::Display for IdentityField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityField::UserName => write!(f, "user_name"),
            IdentityField::Email => write!(f, "email"),
        }
    }
}

/// Lookup and provisioning of user records.
///
/// `find_by` returns `Ok(None)` when no record matches; errors are reserved
/// for connectivity or decoding faults.
pub trait IdentityStore: Send + Sync {
    /// Find the first identity whose `field` equals `value`.
    fn find_by(&self, field: IdentityField, value: &str) -> StoreResult<Option<Identity>>;

    /// Insert a new identity, returning its assigned id.
    fn insert(&self, identity: Identity) -> StoreResult<u64>;

    /// Overwrite an existing identity.
    fn update(&self, identity: &Identity) -> StoreResult<()>;
}

/// Identity store backed by a sled tree of JSON documents keyed by user id.
pub struct SledIdentityStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledIdentityStore {
    /// Open the identity store.
    pub fn open(db: &sled::Db) -> StoreResult<Self> {
        let tree = db.open_tree(USER_TREE_NAME)?;
        Ok(Self {
            db: db.clone(),
            tree,
        })
    }

    /// Get an identity by id.
    pub fn get(&self, user_id: u64) -> StoreResult<Option<Identity>> {
        match self.tree.get(user_id.to_be_bytes())? {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// List all identities in id order.
    pub fn list(&self) -> StoreResult<Vec<Identity>> {
        let mut identities = Vec::new();
        for result in self.tree.iter() {
            let (_, value) = result?;
            identities.push(Self::deserialize(&value)?);
        }
        Ok(identities)
    }

    /// Number of stored identities.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// True if no identity is stored.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    fn serialize(identity: &Identity) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(identity).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn deserialize(bytes: &[u8]) -> StoreResult<Identity> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Deserialization(e.to_string()))
    }
}

impl IdentityStore for SledIdentityStore {
    fn find_by(&self, field: IdentityField, value: &str) -> StoreResult<Option<Identity>> {
        // Users are few compared to CMDB objects; a scan is fine here.
        for result in self.tree.iter() {
            let (_, bytes) = result?;
            let identity = Self::deserialize(&bytes)?;
            let matches = match field {
                IdentityField::UserName => identity.user_name == value,
                IdentityField::Email => identity.email.as_deref() == Some(value),
            };
            if matches {
                return Ok(Some(identity));
            }
        }
        Ok(None)
    }

    fn insert(&self, mut identity: Identity) -> StoreResult<u64> {
        // generate_id starts at 0; public ids start at 1
        let user_id = self.db.generate_id()? + 1;
        identity.user_id = user_id;
        self.tree
            .insert(user_id.to_be_bytes(), Self::serialize(&identity)?)?;
        Ok(user_id)
    }

    fn update(&self, identity: &Identity) -> StoreResult<()> {
        self.tree
            .insert(identity.user_id.to_be_bytes(), Self::serialize(identity)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (SledIdentityStore, sled::Db) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let store = SledIdentityStore::open(&db).unwrap();
        (store, db)
    }

    #[test]
    fn test_insert_and_find() {
        let (store, _db) = test_store();

        let id = store
            .insert(Identity::new("alice", "LocalProvider").with_email("alice@example.com"))
            .unwrap();
        assert!(id >= 1);

        let found = store.find_by(IdentityField::UserName, "alice").unwrap();
        assert_eq!(found.as_ref().map(|i| i.user_id), Some(id));

        let by_mail = store
            .find_by(IdentityField::Email, "alice@example.com")
            .unwrap();
        assert!(by_mail.is_some());

        assert!(store.find_by(IdentityField::UserName, "bob").unwrap().is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let (store, _db) = test_store();

        let a = store.insert(Identity::new("a", "LocalProvider")).unwrap();
        let b = store.insert(Identity::new("b", "LocalProvider")).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_update() {
        let (store, _db) = test_store();

        let id = store.insert(Identity::new("carol", "DirectoryProvider")).unwrap();
        let mut carol = store.get(id).unwrap().unwrap();
        carol.group_id = Some(5);
        store.update(&carol).unwrap();

        assert_eq!(store.get(id).unwrap().unwrap().group_id, Some(5));
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
