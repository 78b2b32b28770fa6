//! Requirement node attribute bag.
//!
//! # Responsibility
//! - Hold one node's identity (`uuid`) and its flat attribute map.
//! - Guard reserved keys against writes through the generic setter.
//!
//! # Invariants
//! - `uuid` is assigned at construction and never changes afterwards.
//! - The children key (`child`) never appears in the attribute map; children
//!   live in [`crate::model::tree::ReqTree`], not in the node.
//!
//! # See also
//! - docs/architecture/document-format.md

use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// User-assigned requirement code, e.g. `WHY00012`.
pub const FIELD_ID: &str = "id";
/// Generated stable identity.
pub const FIELD_UUID: &str = "uuid";
/// Display title.
pub const FIELD_TITLE: &str = "title";
/// Markdown body.
pub const FIELD_CONTENT: &str = "content";
/// Reserved key holding nested children in the persisted form.
pub const FIELD_CHILD: &str = "child";

/// Title given to nodes that were never named.
pub const DEFAULT_TITLE: &str = "N/A";

/// Returns a fresh node identity rendered as 32 lowercase hex digits.
pub fn new_node_uuid() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Rejected attribute writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeError {
    /// Key is reserved for tree structure (`child`).
    ReservedKey(String),
    /// Key holds identity and cannot be rewritten (`uuid`).
    ImmutableKey(String),
}

impl Display for AttributeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReservedKey(key) => write!(f, "attribute key `{key}` is reserved"),
            Self::ImmutableKey(key) => write!(f, "attribute key `{key}` is immutable"),
        }
    }
}

impl Error for AttributeError {}

/// One requirement node without its structural links.
#[derive(Debug, Clone, PartialEq)]
pub struct ReqNode {
    attrs: Map<String, Value>,
}

impl ReqNode {
    /// Creates a blank node with a generated uuid.
    pub fn new() -> Self {
        Self::with_uuid(new_node_uuid())
    }

    /// Creates a blank node with the given title.
    pub fn titled(title: impl Into<String>) -> Self {
        let mut node = Self::new();
        node.set_title(title);
        node
    }

    /// Creates a blank node with a caller-provided identity.
    ///
    /// Used by load paths where the identity already exists on disk.
    pub fn with_uuid(uuid: impl Into<String>) -> Self {
        let mut attrs = Map::new();
        attrs.insert(FIELD_ID.to_string(), Value::String(String::new()));
        attrs.insert(FIELD_UUID.to_string(), Value::String(uuid.into()));
        attrs.insert(
            FIELD_TITLE.to_string(),
            Value::String(DEFAULT_TITLE.to_string()),
        );
        attrs.insert(FIELD_CONTENT.to_string(), Value::String(String::new()));
        Self { attrs }
    }

    /// Builds a node from an already-cleaned attribute map.
    ///
    /// Callers must strip `child` and guarantee a string `uuid` first.
    pub(crate) fn from_attributes(attrs: Map<String, Value>) -> Self {
        debug_assert!(!attrs.contains_key(FIELD_CHILD));
        debug_assert!(attrs.get(FIELD_UUID).is_some_and(Value::is_string));
        Self { attrs }
    }

    /// Returns the attribute for `key`, or `default` when absent.
    pub fn get(&self, key: &str, default: Value) -> Value {
        self.attrs.get(key).cloned().unwrap_or(default)
    }

    /// Borrows the attribute for `key`.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    /// Borrows the attribute for `key` when it is a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }

    /// Writes one attribute.
    ///
    /// # Errors
    /// - `ReservedKey` for `child`; the node is left unchanged.
    /// - `ImmutableKey` for `uuid`; the node is left unchanged.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), AttributeError> {
        let key = key.into();
        if key == FIELD_CHILD {
            return Err(AttributeError::ReservedKey(key));
        }
        if key == FIELD_UUID {
            return Err(AttributeError::ImmutableKey(key));
        }
        self.attrs.insert(key, value.into());
        Ok(())
    }

    /// Removes one free-form attribute. Built-in fields cannot be removed.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        match key {
            FIELD_ID | FIELD_UUID | FIELD_TITLE | FIELD_CONTENT | FIELD_CHILD => None,
            _ => self.attrs.remove(key),
        }
    }

    pub fn uuid(&self) -> &str {
        self.get_str(FIELD_UUID).unwrap_or_default()
    }

    pub fn id(&self) -> &str {
        self.get_str(FIELD_ID).unwrap_or_default()
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.attrs
            .insert(FIELD_ID.to_string(), Value::String(id.into()));
    }

    pub fn title(&self) -> &str {
        self.get_str(FIELD_TITLE).unwrap_or(DEFAULT_TITLE)
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.attrs
            .insert(FIELD_TITLE.to_string(), Value::String(title.into()));
    }

    pub fn content(&self) -> &str {
        self.get_str(FIELD_CONTENT).unwrap_or_default()
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.attrs
            .insert(FIELD_CONTENT.to_string(), Value::String(content.into()));
    }

    /// Borrows the flat attribute map (never contains `child`).
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attrs
    }

    /// Replaces the identity during load when the stored one collides.
    pub(crate) fn regenerate_uuid(&mut self) {
        self.attrs
            .insert(FIELD_UUID.to_string(), Value::String(new_node_uuid()));
    }
}

impl Default for ReqNode {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{AttributeError, ReqNode, DEFAULT_TITLE, FIELD_CHILD, FIELD_UUID};
    use serde_json::{json, Value};

    #[test]
    fn new_node_has_blank_fields_and_hex_uuid() {
        let node = ReqNode::new();
        assert_eq!(node.id(), "");
        assert_eq!(node.title(), DEFAULT_TITLE);
        assert_eq!(node.content(), "");
        assert_eq!(node.uuid().len(), 32);
        assert!(node.uuid().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn uuids_differ_between_nodes() {
        assert_ne!(ReqNode::new().uuid(), ReqNode::new().uuid());
    }

    #[test]
    fn set_rejects_child_key_without_mutation() {
        let mut node = ReqNode::titled("Intro");
        let before = node.clone();
        let err = node
            .set(FIELD_CHILD, json!([{"title": "smuggled"}]))
            .expect_err("child key must be rejected");
        assert_eq!(err, AttributeError::ReservedKey(FIELD_CHILD.to_string()));
        assert_eq!(node, before);
        assert!(node.attribute(FIELD_CHILD).is_none());
    }

    #[test]
    fn set_rejects_uuid_rewrite() {
        let mut node = ReqNode::new();
        let uuid = node.uuid().to_string();
        let err = node.set(FIELD_UUID, "other").expect_err("uuid is immutable");
        assert!(matches!(err, AttributeError::ImmutableKey(_)));
        assert_eq!(node.uuid(), uuid);
    }

    #[test]
    fn get_falls_back_to_default() {
        let mut node = ReqNode::new();
        node.set("priority", 3).expect("free-form key");
        assert_eq!(node.get("priority", Value::Null), json!(3));
        assert_eq!(node.get("owner", json!("nobody")), json!("nobody"));
    }

    #[test]
    fn remove_keeps_builtin_fields() {
        let mut node = ReqNode::titled("Keep");
        node.set("status", "draft").expect("free-form key");
        assert_eq!(node.remove("title"), None);
        assert_eq!(node.remove("status"), Some(json!("draft")));
        assert_eq!(node.title(), "Keep");
    }
}
