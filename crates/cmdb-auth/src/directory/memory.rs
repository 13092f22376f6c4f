//! In-memory directory.
//!
//! Supports equality, presence, `&`, `|` and `!` filters. Attribute names and
//! values compare case-insensitively.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;

use super::{DirectoryConnector, DirectoryEntry, DirectoryError, DirectorySession};
use crate::config::{ConnectionConfig, ServerConfig};

/// A stored entry. Entries with a password can be bound to.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticEntry {
    pub dn: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl StaticEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            password: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Add a value to an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    fn to_entry(&self) -> DirectoryEntry {
        DirectoryEntry {
            dn: self.dn.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Fixture {
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    service_account: Option<ServiceAccount>,
    #[serde(default)]
    entries: Vec<StaticEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct ServiceAccount {
    dn: String,
    password: String,
}

struct State {
    host: Option<String>,
    service_account: Option<ServiceAccount>,
    entries: Vec<StaticEntry>,
    failure: Option<DirectoryError>,
}

/// A directory held in memory. Clones share the same data.
#[derive(Clone)]
pub struct StaticDirectory {
    state: Arc<RwLock<State>>,
    connections: Arc<AtomicUsize>,
}

impl StaticDirectory {
    /// Empty directory accepting anonymous binds on any host.
    pub fn new() -> Self {
        Self::from_fixture(Fixture::default())
    }

    /// Load from a JSON fixture:
    ///
    /// ```json
    /// {
    ///   "host": "ldap.example.com",
    ///   "service_account": { "dn": "cn=svc,dc=example,dc=com", "password": "svc" },
    ///   "entries": [
    ///     { "dn": "uid=bob,ou=people,dc=example,dc=com", "password": "pw",
    ///       "attributes": { "uid": ["bob"] } }
    ///   ]
    /// }
    /// ```
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::from_fixture(serde_json::from_str(json)?))
    }

    fn from_fixture(fixture: Fixture) -> Self {
        Self {
            state: Arc::new(RwLock::new(State {
                host: fixture.host,
                service_account: fixture.service_account,
                entries: fixture.entries,
                failure: None,
            })),
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Only accept connections for `host`.
    pub fn with_host(self, host: impl Into<String>) -> Self {
        self.state.write().host = Some(host.into());
        self
    }

    /// Require this service account on connect.
    pub fn with_service_account(self, dn: impl Into<String>, password: impl Into<String>) -> Self {
        self.state.write().service_account = Some(ServiceAccount {
            dn: dn.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_entry(self, entry: StaticEntry) -> Self {
        self.add_entry(entry);
        self
    }

    pub fn add_entry(&self, entry: StaticEntry) {
        self.state.write().entries.push(entry);
    }

    /// Make every subsequent connect fail with `error`. `None` restores service.
    pub fn set_failure(&self, error: Option<DirectoryError>) {
        self.state.write().failure = error;
    }

    /// Number of connect attempts so far.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }
}

impl Default for StaticDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryConnector for StaticDirectory {
    fn connect(
        &self,
        server: &ServerConfig,
        connection: &ConnectionConfig,
    ) -> Result<Box<dyn DirectorySession>, DirectoryError> {
        self.connections.fetch_add(1, Ordering::Relaxed);
        let state = self.state.read();

        if let Some(error) = &state.failure {
            return Err(error.clone());
        }
        if let Some(host) = &state.host {
            if !host.eq_ignore_ascii_case(&server.host) {
                return Err(DirectoryError::Connection(format!(
                    "cannot reach {}",
                    server.url()
                )));
            }
        }
        if let Some(account) = &state.service_account {
            let user_ok = connection
                .user
                .as_deref()
                .is_some_and(|user| user.eq_ignore_ascii_case(&account.dn));
            let password_ok = connection.password.as_deref() == Some(account.password.as_str());
            if !(user_ok && password_ok) {
                return Err(DirectoryError::InvalidCredentials);
            }
        }

        Ok(Box::new(StaticSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct StaticSession {
    state: Arc<RwLock<State>>,
}

impl DirectorySession for StaticSession {
    fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let filter = Filter::parse(filter)?;
        let base = base_dn.trim().to_ascii_lowercase();
        let state = self.state.read();

        Ok(state
            .entries
            .iter()
            .filter(|entry| entry.dn.to_ascii_lowercase().ends_with(&base))
            .filter(|entry| filter.matches(&entry.attributes))
            .map(StaticEntry::to_entry)
            .collect())
    }

    fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError> {
        // An empty password would be an unauthenticated bind
        if password.is_empty() {
            return Err(DirectoryError::InvalidCredentials);
        }
        let state = self.state.read();
        let entry = state
            .entries
            .iter()
            .find(|entry| entry.dn.eq_ignore_ascii_case(dn))
            .ok_or(DirectoryError::InvalidCredentials)?;
        match &entry.password {
            Some(stored) if stored == password => Ok(()),
            _ => Err(DirectoryError::InvalidCredentials),
        }
    }
}

#[derive(Debug, PartialEq)]
enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equal(String, String),
    Present(String),
}

impl Filter {
    fn parse(input: &str) -> Result<Self, DirectoryError> {
        let mut parser = FilterParser {
            chars: input.trim().chars().collect(),
            pos: 0,
        };
        let filter = parser.filter()?;
        if parser.pos != parser.chars.len() {
            return Err(parser.error("trailing characters"));
        }
        Ok(filter)
    }

    fn matches(&self, attributes: &BTreeMap<String, Vec<String>>) -> bool {
        match self {
            Filter::And(items) => items.iter().all(|f| f.matches(attributes)),
            Filter::Or(items) => items.iter().any(|f| f.matches(attributes)),
            Filter::Not(inner) => !inner.matches(attributes),
            Filter::Present(name) => lookup(attributes, name).is_some_and(|v| !v.is_empty()),
            Filter::Equal(name, value) => lookup(attributes, name)
                .is_some_and(|values| values.iter().any(|v| v.eq_ignore_ascii_case(value))),
        }
    }
}

fn lookup<'a>(
    attributes: &'a BTreeMap<String, Vec<String>>,
    name: &str,
) -> Option<&'a Vec<String>> {
    attributes
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, values)| values)
}

struct FilterParser {
    chars: Vec<char>,
    pos: usize,
}

impl FilterParser {
    fn filter(&mut self) -> Result<Filter, DirectoryError> {
        self.expect('(')?;
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Filter::And(self.list()?)
            }
            Some('|') => {
                self.pos += 1;
                Filter::Or(self.list()?)
            }
            Some('!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            }
            _ => self.item()?,
        };
        self.expect(')')?;
        Ok(filter)
    }

    fn list(&mut self) -> Result<Vec<Filter>, DirectoryError> {
        let mut items = Vec::new();
        while self.peek() == Some('(') {
            items.push(self.filter()?);
        }
        Ok(items)
    }

    fn item(&mut self) -> Result<Filter, DirectoryError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == ')' {
                break;
            }
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        let (name, value) = raw
            .split_once('=')
            .ok_or_else(|| self.error("expected attribute=value"))?;
        if name.is_empty() {
            return Err(self.error("empty attribute name"));
        }
        if value == "*" {
            return Ok(Filter::Present(name.to_string()));
        }
        if value.contains('*') {
            return Err(self.error("substring filters are not supported"));
        }
        Ok(Filter::Equal(name.to_string(), self.unescape(value)?))
    }

    fn unescape(&self, value: &str) -> Result<String, DirectoryError> {
        let mut bytes = Vec::with_capacity(value.len());
        let raw = value.as_bytes();
        let mut i = 0;
        while i < raw.len() {
            if raw[i] == b'\\' {
                let hex = value
                    .get(i + 1..i + 3)
                    .ok_or_else(|| self.error("truncated escape"))?;
                let byte = u8::from_str_radix(hex, 16).map_err(|_| self.error("bad escape"))?;
                bytes.push(byte);
                i += 3;
            } else {
                bytes.push(raw[i]);
                i += 1;
            }
        }
        String::from_utf8(bytes).map_err(|_| self.error("escape is not UTF-8"))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn expect(&mut self, c: char) -> Result<(), DirectoryError> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c)))
        }
    }

    fn error(&self, message: &str) -> DirectoryError {
        DirectoryError::Search(format!("invalid filter at {}: {}", self.pos, message))
    }
}
