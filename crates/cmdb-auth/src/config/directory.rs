//! Directory (LDAP) provider configuration.
//!
//! # Stored Form
//!
//! ```json
//! {
//!   "active": true,
//!   "default_group": 2,
//!   "server_config": { "host": "ldap.example.com", "port": 636, "use_ssl": true },
//!   "connection_config": {
//!     "user": "cn=cmdb,dc=example,dc=com", "password": "...", "protocol_version": 3
//!   },
//!   "search": { "base_dn": "dc=example,dc=com", "search_filter": "(uid=%username%)" },
//!   "groups": {
//!     "active": true,
//!     "search_filter_group": "(memberUid=%username%)",
//!     "mapping": [ { "group_dn": "cn=admins,ou=groups,dc=example,dc=com", "group_id": 1 } ]
//!   }
//! }
//! ```

use serde::Serialize;
use serde_json::Value;

use super::{FieldReader, Validated};

/// Placeholder replaced by the (escaped) login name in search filters.
pub const USERNAME_PLACEHOLDER: &str = "%username%";

/// Default internal group for directory users when group mapping is off.
pub const DEFAULT_GROUP: i64 = 2;

/// Default LDAP port.
pub const DEFAULT_PORT: u16 = 389;

/// Directory server location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub use_ssl: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            use_ssl: false,
        }
    }
}

impl ServerConfig {
    /// `ldap://host:port` or `ldaps://host:port`.
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Service account used for the initial bind. `None` means anonymous bind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionConfig {
    pub user: Option<String>,
    pub password: Option<String>,
    pub protocol_version: i64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            user: None,
            password: None,
            protocol_version: 3,
        }
    }
}

/// Where and how to find user entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchConfig {
    pub base_dn: String,
    pub search_filter: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_dn: "dc=example,dc=com".to_string(),
            search_filter: "(uid=%username%)".to_string(),
        }
    }
}

/// One directory group to internal group mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMapping {
    pub group_dn: String,
    pub group_id: i64,
}

impl GroupMapping {
    pub fn new(group_dn: impl Into<String>, group_id: i64) -> Self {
        Self {
            group_dn: group_dn.into(),
            group_id,
        }
    }

    /// Case-insensitive DN comparison.
    pub fn matches(&self, dn: &str) -> bool {
        self.group_dn.trim().eq_ignore_ascii_case(dn.trim())
    }
}

/// Group resolution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupsConfig {
    pub active: bool,
    pub search_filter_group: String,
    pub mapping: Vec<GroupMapping>,
}

impl Default for GroupsConfig {
    fn default() -> Self {
        Self {
            active: false,
            search_filter_group: "(memberUid=%username%)".to_string(),
            mapping: Vec::new(),
        }
    }
}

impl GroupsConfig {
    /// Internal group of the first mapping (in mapping order) matching any of `group_dns`.
    pub fn resolve<S: AsRef<str>>(&self, group_dns: &[S]) -> Option<i64> {
        self.mapping
            .iter()
            .find(|m| group_dns.iter().any(|dn| m.matches(dn.as_ref())))
            .map(|m| m.group_id)
    }
}

/// Configuration of the directory provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryConfig {
    pub active: bool,
    pub default_group: i64,
    pub server_config: ServerConfig,
    pub connection_config: ConnectionConfig,
    pub search: SearchConfig,
    pub groups: GroupsConfig,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            active: false,
            default_group: DEFAULT_GROUP,
            server_config: ServerConfig::default(),
            connection_config: ConnectionConfig::default(),
            search: SearchConfig::default(),
            groups: GroupsConfig::default(),
        }
    }
}

impl DirectoryConfig {
    /// Build from stored JSON, substituting defaults per field.
    pub fn from_value(path: &str, value: &Value) -> Validated<Self> {
        let d = Self::default();
        let mut reader = FieldReader::new(path, value);

        let active = reader.bool("active", d.active);
        let default_group = reader.int("default_group", d.default_group);

        let server_config = reader.nested("server_config", |r| ServerConfig {
            host: r.string("host", &d.server_config.host),
            port: r.port("port", d.server_config.port),
            use_ssl: r.bool("use_ssl", d.server_config.use_ssl),
        });

        let connection_config = reader.nested("connection_config", |r| ConnectionConfig {
            user: r.opt_string("user"),
            password: r.opt_string("password"),
            protocol_version: r.int("protocol_version", d.connection_config.protocol_version),
        });

        let search = reader.nested("search", |r| SearchConfig {
            base_dn: r.string("base_dn", &d.search.base_dn),
            search_filter: r.string("search_filter", &d.search.search_filter),
        });

        let groups = reader.nested("groups", |r| {
            let active = r.bool("active", d.groups.active);
            let search_filter_group =
                r.string("search_filter_group", &d.groups.search_filter_group);
            let mut mapping = Vec::new();
            for (index, item) in r.array("mapping").iter().enumerate() {
                let dn = item.get("group_dn").and_then(Value::as_str);
                let id = item.get("group_id").and_then(Value::as_i64);
                match (dn, id) {
                    (Some(dn), Some(id)) if !dn.trim().is_empty() => {
                        mapping.push(GroupMapping::new(dn, id))
                    }
                    _ => r.warn(
                        &format!("mapping[{}]", index),
                        "entry needs a non-empty group_dn and an integer group_id; dropped",
                    ),
                }
            }
            GroupsConfig {
                active,
                search_filter_group,
                mapping,
            }
        });

        Validated {
            config: Self {
                active,
                default_group,
                server_config,
                connection_config,
                search,
                groups,
            },
            warnings: reader.finish(),
        }
    }

    /// Copy with the bind password blanked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.connection_config.password.is_some() {
            copy.connection_config.password = Some("********".to_string());
        }
        copy
    }
}
