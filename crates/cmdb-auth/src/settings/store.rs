//! Persistence of the raw settings document.

use serde_json::Value;

use super::{AuthSettings, SETTINGS_KEY};
use crate::error::{StoreError, StoreResult};

const SETTINGS_TREE_NAME: &[u8] = b"auth:settings";

/// Stores the settings document as JSON in a sled tree.
///
/// The document is returned raw; callers pass it through
/// [`reconcile`](super::reconcile) before use.
pub struct SettingsStore {
    tree: sled::Tree,
}

impl SettingsStore {
    /// Open the settings store.
    pub fn open(db: &sled::Db) -> StoreResult<Self> {
        let tree = db.open_tree(SETTINGS_TREE_NAME)?;
        Ok(Self { tree })
    }

    /// Load the stored document, if any.
    pub fn load(&self) -> StoreResult<Option<Value>> {
        match self.tree.get(SETTINGS_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Save reconciled settings.
    pub fn save(&self, settings: &AuthSettings) -> StoreResult<()> {
        self.save_value(&settings.to_value())
    }

    /// Save a raw document.
    pub fn save_value(&self, document: &Value) -> StoreResult<()> {
        let bytes =
            serde_json::to_vec(document).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.tree.insert(SETTINGS_KEY, bytes)?;
        self.tree.flush()?;
        Ok(())
    }

    /// Remove the stored document.
    pub fn clear(&self) -> StoreResult<bool> {
        Ok(self.tree.remove(SETTINGS_KEY)?.is_some())
    }
}
