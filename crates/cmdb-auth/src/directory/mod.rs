//! Directory service client contract.
//!
//! The directory provider talks to a directory (LDAP-like) service through
//! [`DirectoryConnector`]. Only the bind/search contract is modelled here;
//! wire protocol adapters live outside this crate. [`StaticDirectory`] is an
//! in-memory implementation for tests and offline setups.

mod memory;

pub use memory::{StaticDirectory, StaticEntry};

use std::collections::BTreeMap;

use thiserror::Error;

use crate::config::{ConnectionConfig, ServerConfig, USERNAME_PLACEHOLDER};

/// Errors from a directory service.
#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    /// Server unreachable or connection dropped.
    #[error("directory connection failed: {0}")]
    Connection(String),

    /// The call did not complete in time.
    #[error("directory request timed out")]
    Timeout,

    /// Bind rejected.
    #[error("invalid directory credentials")]
    InvalidCredentials,

    /// Search failed.
    #[error("directory search failed: {0}")]
    Search(String),
}

/// An entry returned from a directory search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Distinguished name.
    pub dn: String,
    /// Attribute name -> values.
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// First value of an attribute.
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.attributes
            .get(attribute)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// Opens bound sessions to a directory server.
pub trait DirectoryConnector: Send + Sync {
    /// Connect to `server` and bind with the service account in `connection`
    /// (anonymous bind when no user is configured).
    fn connect(
        &self,
        server: &ServerConfig,
        connection: &ConnectionConfig,
    ) -> Result<Box<dyn DirectorySession>, DirectoryError>;
}

/// A bound directory session.
pub trait DirectorySession {
    /// Subtree search under `base_dn`.
    fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError>;

    /// Re-bind as `dn`. Used to verify a user's password.
    fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError>;
}

/// Escape a value for use inside a search filter (RFC 4515).
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Substitute the escaped user name into a filter template.
pub fn render_filter(template: &str, user_name: &str) -> String {
    template.replace(USERNAME_PLACEHOLDER, &escape_filter_value(user_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_filter_value() {
        assert_eq!(escape_filter_value("alice"), "alice");
        assert_eq!(escape_filter_value("a*b"), "a\\2ab");
        assert_eq!(escape_filter_value("x)(uid=*"), "x\\29\\28uid=\\2a");
        assert_eq!(escape_filter_value("back\\slash"), "back\\5cslash");
    }

    #[test]
    fn test_render_filter() {
        assert_eq!(render_filter("(uid=%username%)", "bob"), "(uid=bob)");
        assert_eq!(
            render_filter("(&(objectClass=person)(uid=%username%))", "b*"),
            "(&(objectClass=person)(uid=b\\2a))"
        );
    }

    #[test]
    fn test_entry_first_attribute() {
        let mut entry = DirectoryEntry::new("uid=bob,dc=example,dc=com");
        entry
            .attributes
            .insert("mail".to_string(), vec!["bob@example.com".to_string()]);
        assert_eq!(entry.first("mail"), Some("bob@example.com"));
        assert_eq!(entry.first("cn"), None);
    }
}
