//! Deterministic domain id generation.
//!
//! Every canonical entity is keyed by an id derived from the tool entity it
//! came from:
//!
//! ```text
//! {plugin}:{EntityType}:{connection_id}:{local_id}
//! zentao:ZentaoTask:7:42
//! ```
//!
//! The plugin and entity type segments never contain `:` and the connection
//! id is decimal, so everything after the third `:` belongs to the local id.
//! Two ids are therefore equal only when kind, connection, and local id all
//! match.

use std::fmt;

/// A tool entity that owns a family of domain ids.
///
/// Implemented by the raw row types of each data source, so a generator can
/// be built from the type alone with [`DomainIdGenerator::of`].
pub trait ToolEntity {
    /// Data source name, e.g. `"jira"`.
    const PLUGIN: &'static str;
    /// Tool entity type name, e.g. `"JiraBoard"`.
    const ENTITY: &'static str;
}

/// Identity of a row inside its tool, before composition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocalId {
    Int(i64),
    Str(String),
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalId::Int(n) => write!(f, "{}", n),
            LocalId::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for LocalId {
    fn from(v: i64) -> Self {
        LocalId::Int(v)
    }
}

impl From<i32> for LocalId {
    fn from(v: i32) -> Self {
        LocalId::Int(v.into())
    }
}

impl From<u64> for LocalId {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(n) => LocalId::Int(n),
            Err(_) => LocalId::Str(v.to_string()),
        }
    }
}

impl From<&str> for LocalId {
    fn from(v: &str) -> Self {
        LocalId::Str(v.to_string())
    }
}

impl From<String> for LocalId {
    fn from(v: String) -> Self {
        LocalId::Str(v)
    }
}

impl From<&String> for LocalId {
    fn from(v: &String) -> Self {
        LocalId::Str(v.clone())
    }
}

/// Generates domain ids for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainIdGenerator {
    prefix: String,
}

impl DomainIdGenerator {
    pub fn new(plugin: &str, entity: &str) -> Self {
        debug_assert!(
            !plugin.is_empty() && !plugin.contains(':'),
            "invalid plugin name {:?}",
            plugin
        );
        debug_assert!(
            !entity.is_empty() && !entity.contains(':'),
            "invalid entity name {:?}",
            entity
        );
        Self {
            prefix: format!("{}:{}", plugin, entity),
        }
    }

    /// Generator for the tool entity type `T`.
    pub fn of<T: ToolEntity>() -> Self {
        Self::new(T::PLUGIN, T::ENTITY)
    }

    /// The `{plugin}:{EntityType}` part shared by every id of this kind.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn generate(&self, connection_id: u64, local_id: impl Into<LocalId>) -> String {
        format!("{}:{}:{}", self.prefix, connection_id, local_id.into())
    }

    /// Split an id of this kind back into `(connection_id, local_id)`.
    ///
    /// Returns `None` for ids produced by another generator.
    pub fn parse(&self, id: &str) -> Option<(u64, String)> {
        let rest = id.strip_prefix(self.prefix.as_str())?.strip_prefix(':')?;
        let (conn, local) = rest.split_once(':')?;
        if conn.is_empty() || !conn.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some((conn.parse().ok()?, local.to_string()))
    }
}
