//! Authentication settings.
//!
//! One JSON document, stored under the key `"auth"`:
//!
//! ```json
//! {
//!   "enable_external": false,
//!   "token_lifetime_seconds": 84000,
//!   "providers": [
//!     { "provider_name": "LocalProvider", "config": { "active": true } },
//!     { "provider_name": "DirectoryProvider", "config": { "active": false, "...": "..." } }
//!   ]
//! }
//! ```
//!
//! Raw documents are turned into [`AuthSettings`] by [`reconcile`].

mod reconcile;
mod store;

pub use reconcile::{reconcile, Reconciled};
pub use store::SettingsStore;

use serde_json::{json, Value};

use crate::config::ProviderConfig;

/// Key of the settings document.
pub const SETTINGS_KEY: &str = "auth";

/// Default token lifetime (1400 minutes).
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 84_000;

/// Configuration entry of an installed provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEntry {
    pub provider_name: String,
    pub config: ProviderConfig,
}

/// Entry for a provider that is no longer installed. Kept verbatim, never read.
#[derive(Debug, Clone, PartialEq)]
pub struct StaleEntry {
    pub provider_name: String,
    pub config: Value,
}

/// Reconciled authentication settings.
///
/// Holds exactly one entry per installed provider at reconciliation time.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSettings {
    pub enable_external: bool,
    pub token_lifetime_seconds: u64,
    providers: Vec<ProviderEntry>,
    stale: Vec<StaleEntry>,
}

impl AuthSettings {
    pub(crate) fn from_parts(
        enable_external: bool,
        token_lifetime_seconds: u64,
        providers: Vec<ProviderEntry>,
        stale: Vec<StaleEntry>,
    ) -> Self {
        Self {
            enable_external,
            token_lifetime_seconds,
            providers,
            stale,
        }
    }

    /// Provider entries in document order.
    pub fn providers(&self) -> &[ProviderEntry] {
        &self.providers
    }

    /// Entries of providers that are not installed.
    pub fn stale_entries(&self) -> &[StaleEntry] {
        &self.stale
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderEntry> {
        self.providers.iter().find(|e| e.provider_name == name)
    }

    pub fn exists_in_settings(&self, name: &str) -> bool {
        self.provider(name).is_some()
    }

    pub fn config_for(&self, name: &str) -> Option<&ProviderConfig> {
        self.provider(name).map(|e| &e.config)
    }

    /// Stored document form.
    pub fn to_value(&self) -> Value {
        let providers: Vec<Value> = self
            .providers
            .iter()
            .map(|e| json!({"provider_name": e.provider_name, "config": e.config.to_value()}))
            .chain(
                self.stale
                    .iter()
                    .map(|e| json!({"provider_name": e.provider_name, "config": e.config})),
            )
            .collect();

        json!({
            "enable_external": self.enable_external,
            "token_lifetime_seconds": self.token_lifetime_seconds,
            "providers": providers,
        })
    }

    /// Document form with secrets blanked, for display.
    pub fn to_redacted_value(&self) -> Value {
        let mut copy = self.clone();
        for entry in &mut copy.providers {
            entry.config = entry.config.redacted();
        }
        copy.stale.clear();
        copy.to_value()
    }
}

/// Replace (or append) one provider's raw config in a stored document.
///
/// Used to apply edits before re-reconciling; a non-object document is
/// replaced by an empty one first.
pub fn set_provider_value(document: &mut Value, provider_name: &str, config: Value) {
    if !document.is_object() {
        *document = json!({});
    }
    let Some(map) = document.as_object_mut() else {
        return;
    };
    let providers = map
        .entry("providers")
        .or_insert_with(|| Value::Array(Vec::new()));
    if !providers.is_array() {
        *providers = Value::Array(Vec::new());
    }
    let Some(entries) = providers.as_array_mut() else {
        return;
    };

    let existing = entries
        .iter_mut()
        .find(|e| e.get("provider_name").and_then(Value::as_str) == Some(provider_name));
    match existing {
        Some(entry) => entry["config"] = config,
        None => entries.push(json!({"provider_name": provider_name, "config": config})),
    }
}
