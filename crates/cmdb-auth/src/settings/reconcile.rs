//! Settings reconciliation.
//!
//! Merges a stored settings document with the installed providers. Never
//! fails: malformed fields fall back to defaults with a warning, missing
//! providers get their declared defaults, and entries for uninstalled
//! providers are carried along untouched. Reconciling the stored form of a
//! result again yields the same settings and no warnings.

use serde_json::Value;
use tracing::warn;

use super::{AuthSettings, ProviderEntry, StaleEntry, DEFAULT_TOKEN_LIFETIME_SECS};
use crate::config::{ConfigWarning, FieldReader};
use crate::registry::ProviderRegistry;

const ROOT_PATH: &str = "auth";

/// Reconciled settings and the fallbacks applied.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub settings: AuthSettings,
    pub warnings: Vec<ConfigWarning>,
}

/// Reconcile a stored document with the registry.
pub fn reconcile(stored: &Value, registry: &ProviderRegistry) -> Reconciled {
    let installed = registry.list_installed();
    let mut reader = FieldReader::new(ROOT_PATH, stored);

    let enable_external = reader.bool("enable_external", false);
    let default_lifetime = DEFAULT_TOKEN_LIFETIME_SECS as i64;
    let token_lifetime_seconds = match reader.int("token_lifetime_seconds", default_lifetime) {
        secs if secs > 0 => secs as u64,
        _ => {
            reader.warn("token_lifetime_seconds", "must be positive; using default");
            DEFAULT_TOKEN_LIFETIME_SECS
        }
    };
    let raw_entries = reader.array("providers");
    let mut warnings = reader.finish();

    let mut providers: Vec<ProviderEntry> = Vec::with_capacity(installed.len());
    let mut stale = Vec::new();

    for (index, raw) in raw_entries.iter().enumerate() {
        let path = format!("{}.providers[{}]", ROOT_PATH, index);
        let Some(name) = raw.get("provider_name").and_then(Value::as_str) else {
            warnings.push(ConfigWarning {
                path,
                message: "entry without provider_name dropped".to_string(),
            });
            continue;
        };

        let Some(descriptor) = installed.iter().find(|d| d.name == name) else {
            stale.push(StaleEntry {
                provider_name: name.to_string(),
                config: raw.get("config").cloned().unwrap_or(Value::Null),
            });
            continue;
        };

        if providers.iter().any(|e| e.provider_name == name) {
            warnings.push(ConfigWarning {
                path,
                message: format!("duplicate entry for {} dropped", name),
            });
            continue;
        }

        let validated = descriptor
            .kind
            .validate_config(raw.get("config").unwrap_or(&Value::Null));
        warnings.extend(validated.warnings);
        providers.push(ProviderEntry {
            provider_name: name.to_string(),
            config: validated.config,
        });
    }

    for descriptor in &installed {
        if !providers.iter().any(|e| e.provider_name == descriptor.name) {
            providers.push(ProviderEntry {
                provider_name: descriptor.name.to_string(),
                config: descriptor.kind.default_config(),
            });
        }
    }

    for warning in &warnings {
        warn!(field = %warning.path, "{}", warning.message);
    }

    Reconciled {
        settings: AuthSettings::from_parts(
            enable_external,
            token_lifetime_seconds,
            providers,
            stale,
        ),
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DirectoryConfig, ProviderConfig};
    use crate::provider::ProviderKind;
    use serde_json::json;

    fn names(settings: &AuthSettings) -> Vec<&str> {
        settings
            .providers()
            .iter()
            .map(|e| e.provider_name.as_str())
            .collect()
    }

    #[test]
    fn test_empty_document_gets_defaults() {
        let registry = ProviderRegistry::with_builtins();
        let result = reconcile(&Value::Null, &registry);

        assert!(result.warnings.is_empty());
        let settings = result.settings;
        assert!(!settings.enable_external);
        assert_eq!(settings.token_lifetime_seconds, DEFAULT_TOKEN_LIFETIME_SECS);
        assert_eq!(names(&settings), vec!["LocalProvider", "DirectoryProvider"]);
        assert_eq!(
            settings.config_for("DirectoryProvider"),
            Some(&ProviderKind::Directory.default_config())
        );
    }

    #[test]
    fn test_stored_order_kept_and_missing_appended() {
        let registry = ProviderRegistry::with_builtins();
        let stored = json!({
            "enable_external": true,
            "token_lifetime_seconds": 600,
            "providers": [
                {"provider_name": "DirectoryProvider", "config": {"active": true}}
            ]
        });
        let settings = reconcile(&stored, &registry).settings;

        assert!(settings.enable_external);
        assert_eq!(settings.token_lifetime_seconds, 600);
        assert_eq!(names(&settings), vec!["DirectoryProvider", "LocalProvider"]);
        assert!(settings.config_for("DirectoryProvider").unwrap().active());
    }

    #[test]
    fn test_malformed_config_self_heals() {
        let registry = ProviderRegistry::with_builtins();
        let stored = json!({
            "providers": [
                {"provider_name": "DirectoryProvider", "config": {"active": "yes"}},
                {"provider_name": "LocalProvider", "config": 17}
            ]
        });
        let result = reconcile(&stored, &registry);

        assert_eq!(result.warnings.len(), 2);
        assert_eq!(
            result.settings.config_for("DirectoryProvider"),
            Some(&ProviderConfig::Directory(DirectoryConfig::default()))
        );
        assert_eq!(
            result.settings.config_for("LocalProvider"),
            Some(&ProviderKind::Local.default_config())
        );
    }

    #[test]
    fn test_bad_globals_fall_back() {
        let registry = ProviderRegistry::with_builtins();
        let stored = json!({"enable_external": 1, "token_lifetime_seconds": -5, "extra": true});
        let result = reconcile(&stored, &registry);

        assert!(!result.settings.enable_external);
        assert_eq!(
            result.settings.token_lifetime_seconds,
            DEFAULT_TOKEN_LIFETIME_SECS
        );
        let paths: Vec<&str> = result.warnings.iter().map(|w| w.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "auth.enable_external",
                "auth.token_lifetime_seconds",
                "auth.extra"
            ]
        );
    }

    #[test]
    fn test_duplicates_and_nameless_entries_dropped() {
        let registry = ProviderRegistry::with_builtins();
        let stored = json!({
            "providers": [
                {"provider_name": "LocalProvider", "config": {"active": true}},
                {"provider_name": "LocalProvider", "config": {"active": false}},
                {"config": {}}
            ]
        });
        let result = reconcile(&stored, &registry);

        assert_eq!(result.warnings.len(), 2);
        assert_eq!(names(&result.settings), vec!["LocalProvider", "DirectoryProvider"]);
        assert!(result.settings.config_for("LocalProvider").unwrap().active());
    }

    #[test]
    fn test_uninstalled_entries_are_kept_but_not_consulted() {
        let registry = ProviderRegistry::new();
        registry.register(ProviderKind::Local);
        let stored = json!({
            "providers": [
                {"provider_name": "DirectoryProvider", "config": {"active": true}},
                {"provider_name": "LocalProvider", "config": {"active": true}}
            ]
        });
        let settings = reconcile(&stored, &registry).settings;

        assert_eq!(names(&settings), vec!["LocalProvider"]);
        assert!(!settings.exists_in_settings("DirectoryProvider"));
        assert_eq!(settings.stale_entries().len(), 1);
        assert_eq!(settings.stale_entries()[0].config, json!({"active": true}));

        let doc = settings.to_value();
        assert_eq!(doc["providers"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_idempotent() {
        let registry = ProviderRegistry::with_builtins();
        let stored = json!({
            "enable_external": "no",
            "providers": [
                {"provider_name": "RadiusProvider", "config": null},
                {"provider_name": "DirectoryProvider", "config": {
                    "active": true,
                    "server_config": {"port": "x"},
                    "groups": {"mapping": [{"group_dn": "cn=a", "group_id": 1}, {"bad": true}]}
                }},
                {"provider_name": "DirectoryProvider", "config": {}}
            ]
        });

        let first = reconcile(&stored, &registry);
        assert!(!first.warnings.is_empty());

        let second = reconcile(&first.settings.to_value(), &registry);
        assert!(second.warnings.is_empty());
        assert_eq!(second.settings, first.settings);
    }

    #[test]
    fn test_complete_for_every_installed_provider() {
        let registry = ProviderRegistry::with_builtins();
        let settings = reconcile(&json!({"providers": []}), &registry).settings;
        for descriptor in registry.list_installed() {
            assert!(settings.exists_in_settings(descriptor.name));
        }
    }

    #[test]
    fn test_redacted_value_hides_password() {
        let registry = ProviderRegistry::with_builtins();
        let stored = json!({
            "providers": [{"provider_name": "DirectoryProvider", "config": {
                "connection_config": {"user": "cn=svc", "password": "hunter2"}
            }}]
        });
        let settings = reconcile(&stored, &registry).settings;

        let shown = settings.to_redacted_value().to_string();
        assert!(!shown.contains("hunter2"));
        assert!(settings.to_value().to_string().contains("hunter2"));
    }
}
