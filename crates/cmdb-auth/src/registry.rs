//! Installed provider registry.
//!
//! Built once at startup and shared by reference. Registration is
//! idempotent by name, and the list keeps registration order, which is also
//! the order of the login fallback scan.

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::error::{AuthError, AuthResult};
use crate::provider::ProviderKind;

/// An installed provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub kind: ProviderKind,
    pub name: &'static str,
    pub external: bool,
    pub password_required: bool,
}

impl From<ProviderKind> for ProviderDescriptor {
    fn from(kind: ProviderKind) -> Self {
        Self {
            kind,
            name: kind.name(),
            external: kind.is_external(),
            password_required: kind.password_required(),
        }
    }
}

/// Display form of an installed provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSummary {
    pub name: String,
    pub external: bool,
}

/// Ordered set of installed providers.
pub struct ProviderRegistry {
    installed: RwLock<Vec<ProviderDescriptor>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            installed: RwLock::new(Vec::new()),
        }
    }

    /// Create a registry with the built-in providers installed.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for kind in ProviderKind::BUILTIN {
            registry.register(kind);
        }
        registry
    }

    /// Install a provider. Installing an already installed name is a no-op
    /// returning the existing descriptor.
    pub fn register(&self, kind: ProviderKind) -> ProviderDescriptor {
        let mut installed = self.installed.write();
        if let Some(existing) = installed.iter().find(|d| d.name == kind.name()) {
            debug!(provider = kind.name(), "provider already installed");
            return *existing;
        }
        let descriptor = ProviderDescriptor::from(kind);
        installed.push(descriptor);
        debug!(provider = kind.name(), position = installed.len(), "provider installed");
        descriptor
    }

    /// Uninstall a provider by name.
    pub fn unregister(&self, name: &str) -> bool {
        let mut installed = self.installed.write();
        match installed.iter().position(|d| d.name == name) {
            Some(index) => {
                installed.remove(index);
                debug!(provider = name, "provider uninstalled");
                true
            }
            None => false,
        }
    }

    /// Check if a provider is installed.
    pub fn exists(&self, name: &str) -> bool {
        self.installed.read().iter().any(|d| d.name == name)
    }

    /// Look up an installed provider.
    pub fn get_by_name(&self, name: &str) -> AuthResult<ProviderDescriptor> {
        self.installed
            .read()
            .iter()
            .find(|d| d.name == name)
            .copied()
            .ok_or_else(|| AuthError::ProviderNotInstalled(name.to_string()))
    }

    /// Snapshot of installed providers in registration order.
    pub fn list_installed(&self) -> Vec<ProviderDescriptor> {
        self.installed.read().clone()
    }

    /// Installed external providers.
    pub fn list_external(&self) -> Vec<ProviderDescriptor> {
        self.installed
            .read()
            .iter()
            .filter(|d| d.external)
            .copied()
            .collect()
    }

    /// `{name, external}` for every installed provider.
    pub fn summaries(&self) -> Vec<ProviderSummary> {
        self.installed
            .read()
            .iter()
            .map(|d| ProviderSummary {
                name: d.name.to_string(),
                external: d.external,
            })
            .collect()
    }

    /// Number of installed providers.
    pub fn len(&self) -> usize {
        self.installed.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.installed.read().is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_in_order() {
        let registry = ProviderRegistry::with_builtins();
        let names: Vec<&str> = registry.list_installed().iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["LocalProvider", "DirectoryProvider"]);
        assert_eq!(registry.list_external().len(), 1);
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = ProviderRegistry::with_builtins();
        let descriptor = registry.register(ProviderKind::Local);
        assert_eq!(descriptor.kind, ProviderKind::Local);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unregister_and_reregister_moves_to_end() {
        let registry = ProviderRegistry::with_builtins();
        assert!(registry.unregister("LocalProvider"));
        assert!(!registry.unregister("LocalProvider"));
        assert!(!registry.exists("LocalProvider"));

        registry.register(ProviderKind::Local);
        let names: Vec<&str> = registry.list_installed().iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["DirectoryProvider", "LocalProvider"]);
    }

    #[test]
    fn test_get_by_name() {
        let registry = ProviderRegistry::new();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.get_by_name("DirectoryProvider"),
            Err(AuthError::ProviderNotInstalled(_))
        ));

        registry.register(ProviderKind::Directory);
        let descriptor = registry.get_by_name("DirectoryProvider").unwrap();
        assert!(descriptor.external);
        assert!(descriptor.password_required);
    }

    #[test]
    fn test_summaries() {
        let registry = ProviderRegistry::with_builtins();
        let summaries = registry.summaries();
        assert_eq!(
            summaries,
            vec![
                ProviderSummary {
                    name: "LocalProvider".to_string(),
                    external: false
                },
                ProviderSummary {
                    name: "DirectoryProvider".to_string(),
                    external: true
                },
            ]
        );
    }
}
