use serde::Serialize;
use serde_json::Value;

use super::{FieldReader, Validated};

/// Configuration of the local (password hash) provider.
///
/// The local provider is always active; the stored flag is kept only so the
/// settings document has the same shape for every provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalConfig {
    pub active: bool,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self { active: true }
    }
}

impl LocalConfig {
    /// Build from stored JSON, substituting defaults per field.
    pub fn from_value(path: &str, value: &Value) -> Validated<Self> {
        let defaults = Self::default();
        let mut reader = FieldReader::new(path, value);
        let config = Self {
            active: reader.bool("active", defaults.active),
        };
        Validated {
            config,
            warnings: reader.finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_local_defaults() {
        let validated = LocalConfig::from_value("LocalProvider", &json!({}));
        assert!(validated.is_clean());
        assert_eq!(validated.config, LocalConfig::default());
    }

    #[test]
    fn test_local_bad_flag() {
        let validated = LocalConfig::from_value("LocalProvider", &json!({"active": 0}));
        assert_eq!(validated.warnings.len(), 1);
        assert!(validated.config.active);
    }
}
