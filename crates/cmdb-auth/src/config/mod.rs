//! Provider configuration.
//!
//! Stored configuration is free-form JSON. Each provider config type is built
//! from it field by field: missing fields take the declared default, fields
//! of the wrong type take the default and produce a [`ConfigWarning`], and
//! unknown fields are ignored with a warning. Construction never fails.

mod directory;
mod local;

pub use directory::{
    ConnectionConfig, DirectoryConfig, GroupMapping, GroupsConfig, SearchConfig, ServerConfig,
    DEFAULT_GROUP, DEFAULT_PORT, USERNAME_PLACEHOLDER,
};
pub use local::LocalConfig;

use serde::Serialize;
use serde_json::{Map, Value};

/// A field that could not be taken from stored configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    /// Dotted path of the field, e.g. `DirectoryProvider.server_config.port`.
    pub path: String,
    /// What was wrong with it.
    pub message: String,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// A config value together with the fallbacks applied while building it.
#[derive(Debug, Clone)]
pub struct Validated<T> {
    pub config: T,
    pub warnings: Vec<ConfigWarning>,
}

impl<T> Validated<T> {
    /// True if every field was taken from input or was absent.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Map the config, keeping the warnings.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Validated<U> {
        Validated {
            config: f(self.config),
            warnings: self.warnings,
        }
    }
}

/// Configuration of one installed provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    Local(LocalConfig),
    Directory(DirectoryConfig),
}

impl ProviderConfig {
    /// The `active` flag as stored.
    pub fn active(&self) -> bool {
        match self {
            ProviderConfig::Local(config) => config.active,
            ProviderConfig::Directory(config) => config.active,
        }
    }

    /// Set the `active` flag.
    pub fn set_active(&mut self, active: bool) {
        match self {
            ProviderConfig::Local(config) => config.active = active,
            ProviderConfig::Directory(config) => config.active = active,
        }
    }

    /// JSON form as written to the settings document.
    pub fn to_value(&self) -> Value {
        // Plain structs of strings, numbers and bools always serialize.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Copy with secrets blanked, for display.
    pub fn redacted(&self) -> Self {
        match self {
            ProviderConfig::Local(config) => ProviderConfig::Local(config.clone()),
            ProviderConfig::Directory(config) => ProviderConfig::Directory(config.redacted()),
        }
    }

    pub fn as_directory(&self) -> Option<&DirectoryConfig> {
        match self {
            ProviderConfig::Directory(config) => Some(config),
            _ => None,
        }
    }
}

/// Reads typed fields out of a JSON object with per-field defaulting.
pub(crate) struct FieldReader<'a> {
    path: String,
    fields: Option<&'a Map<String, Value>>,
    seen: Vec<&'static str>,
    warnings: Vec<ConfigWarning>,
}

impl<'a> FieldReader<'a> {
    /// Start reading `value`. `null` counts as an empty object; any other
    /// non-object is reported and treated as empty.
    pub(crate) fn new(path: impl Into<String>, value: &'a Value) -> Self {
        let mut reader = Self {
            path: path.into(),
            fields: None,
            seen: Vec::new(),
            warnings: Vec::new(),
        };
        match value {
            Value::Object(map) => reader.fields = Some(map),
            Value::Null => {}
            other => {
                let message = format!("expected an object, found {}", type_name(other));
                reader.warn_self(message);
            }
        }
        reader
    }

    pub(crate) fn bool(&mut self, key: &'static str, default: bool) -> bool {
        match self.take(key) {
            Some(Value::Bool(b)) => *b,
            Some(other) => self.mismatch(key, "a boolean", other, default),
            None => default,
        }
    }

    pub(crate) fn int(&mut self, key: &'static str, default: i64) -> i64 {
        match self.take(key) {
            Some(value) => match value.as_i64() {
                Some(i) => i,
                None => self.mismatch(key, "an integer", value, default),
            },
            None => default,
        }
    }

    pub(crate) fn port(&mut self, key: &'static str, default: u16) -> u16 {
        match self.take(key) {
            Some(value) => match value.as_u64().and_then(|p| u16::try_from(p).ok()) {
                Some(port) => port,
                None => self.mismatch(key, "a port number", value, default),
            },
            None => default,
        }
    }

    pub(crate) fn string(&mut self, key: &'static str, default: &str) -> String {
        match self.take(key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => self.mismatch(key, "a string", other, default.to_string()),
            None => default.to_string(),
        }
    }

    pub(crate) fn opt_string(&mut self, key: &'static str) -> Option<String> {
        match self.take(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => self.mismatch(key, "a string or null", other, None),
            None => None,
        }
    }

    /// Read a nested object with its own reader. Warnings are merged into this one.
    pub(crate) fn nested<T>(
        &mut self,
        key: &'static str,
        build: impl FnOnce(&mut FieldReader<'a>) -> T,
    ) -> T {
        let path = format!("{}.{}", self.path, key);
        let mut child = match self.take(key) {
            Some(value) => FieldReader::new(path, value),
            None => FieldReader {
                path,
                fields: None,
                seen: Vec::new(),
                warnings: Vec::new(),
            },
        };
        let result = build(&mut child);
        self.warnings.extend(child.finish());
        result
    }

    /// Read an array field. Non-arrays are reported and read as empty.
    pub(crate) fn array(&mut self, key: &'static str) -> &'a [Value] {
        match self.take(key) {
            Some(Value::Array(items)) => items.as_slice(),
            Some(other) => self.mismatch(key, "an array", other, Default::default()),
            None => Default::default(),
        }
    }

    /// Record a warning for an element this reader's caller rejected.
    pub(crate) fn warn(&mut self, key: &str, message: impl Into<String>) {
        self.warnings.push(ConfigWarning {
            path: format!("{}.{}", self.path, key),
            message: message.into(),
        });
    }

    /// Report unknown fields and return all warnings.
    pub(crate) fn finish(mut self) -> Vec<ConfigWarning> {
        if let Some(fields) = self.fields {
            let mut unknown: Vec<&String> = fields
                .keys()
                .filter(|key| !self.seen.iter().any(|seen| *seen == key.as_str()))
                .collect();
            unknown.sort();
            for key in unknown {
                self.warnings.push(ConfigWarning {
                    path: format!("{}.{}", self.path, key),
                    message: "unknown field ignored".to_string(),
                });
            }
        }
        self.warnings
    }

    /// Null is treated as absent.
    fn take(&mut self, key: &'static str) -> Option<&'a Value> {
        self.seen.push(key);
        self.fields
            .and_then(|fields| fields.get(key))
            .filter(|value| !value.is_null())
    }

    fn mismatch<T>(&mut self, key: &str, expected: &str, found: &Value, default: T) -> T {
        self.warn(
            key,
            format!(
                "expected {}, found {}; using default",
                expected,
                type_name(found)
            ),
        );
        default
    }

    fn warn_self(&mut self, message: String) {
        self.warnings.push(ConfigWarning {
            path: self.path.clone(),
            message,
        });
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reader_defaults_and_values() {
        let value = json!({"flag": true, "count": 3, "name": "x"});
        let mut reader = FieldReader::new("p", &value);

        assert!(reader.bool("flag", false));
        assert_eq!(reader.int("count", 0), 3);
        assert_eq!(reader.string("name", "d"), "x");
        assert_eq!(reader.string("missing", "d"), "d");
        assert!(reader.finish().is_empty());
    }

    #[test]
    fn test_reader_wrong_type_warns() {
        let value = json!({"flag": "yes", "port": 70000});
        let mut reader = FieldReader::new("p", &value);

        assert!(!reader.bool("flag", false));
        assert_eq!(reader.port("port", 389), 389);

        let warnings = reader.finish();
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].path, "p.flag");
        assert_eq!(warnings[1].path, "p.port");
    }

    #[test]
    fn test_reader_unknown_fields() {
        let value = json!({"known": 1, "zeta": 2, "alpha": 3});
        let mut reader = FieldReader::new("p", &value);
        reader.int("known", 0);

        let paths: Vec<String> = reader.finish().into_iter().map(|w| w.path).collect();
        assert_eq!(paths, vec!["p.alpha", "p.zeta"]);
    }

    #[test]
    fn test_reader_non_object() {
        let value = json!(42);
        let mut reader = FieldReader::new("p", &value);
        assert!(reader.bool("active", true));
        assert_eq!(reader.finish().len(), 1);

        let value = Value::Null;
        let reader = FieldReader::new("p", &value);
        assert!(reader.finish().is_empty());
    }

    #[test]
    fn test_nested_paths() {
        let value = json!({"inner": {"port": "389"}});
        let mut reader = FieldReader::new("p", &value);
        let port = reader.nested("inner", |inner| inner.port("port", 1));
        assert_eq!(port, 1);

        let warnings = reader.finish();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].path, "p.inner.port");
    }
}
