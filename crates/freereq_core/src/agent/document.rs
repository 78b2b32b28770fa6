//! Active requirement document.
//!
//! # Responsibility
//! - Hold one named tree with its metadata and storage location.
//! - Maintain the derived uuid -> node index used by lookups.
//! - Project the live tree to the persisted `{req_meta, req_data}` form and back.
//!
//! # Invariants
//! - The in-memory tree is authoritative; the persisted form is rebuilt from it
//!   on every save and never merged into it.
//! - The uuid index is rebuilt before every save and after every load.
//!
//! # See also
//! - docs/architecture/document-format.md

use crate::model::node::ReqNode;
use crate::model::tree::{NodeId, ReqTree, TreeError};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Free-form document settings (id prefixes, custom field definitions, ...).
pub type ReqMeta = Map<String, Value>;

/// Top-level key of the metadata object in a document file.
pub const KEY_REQ_META: &str = "req_meta";
/// Top-level key of the root node in a document file.
pub const KEY_REQ_DATA: &str = "req_data";
/// Meta key listing requirement id prefixes (string or array of strings).
pub const META_ID_PREFIX: &str = "id_prefix";

/// One named requirement tree plus its metadata.
#[derive(Debug, Clone)]
pub struct ReqDocument {
    name: String,
    path: PathBuf,
    meta: ReqMeta,
    tree: ReqTree,
    index: HashMap<String, NodeId>,
    dirty: bool,
}

impl ReqDocument {
    /// Creates a document whose tree is a single root titled `name`.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let name = name.into();
        let tree = ReqTree::new(ReqNode::titled(name.clone()));
        Self::with_parts(name, path.into(), ReqMeta::new(), tree)
    }

    /// Creates a document from already-built parts and indexes it.
    pub fn with_parts(name: impl Into<String>, path: PathBuf, meta: ReqMeta, tree: ReqTree) -> Self {
        let mut document = Self {
            name: name.into(),
            path,
            meta,
            tree,
            index: HashMap::new(),
            dirty: false,
        };
        document.rebuild_index();
        document
    }

    /// Parses the persisted `{req_meta, req_data}` form.
    ///
    /// A missing `req_meta` is treated as empty; a missing `req_data` yields a
    /// single blank root.
    pub fn from_json(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        value: &Value,
    ) -> Result<Self, TreeError> {
        let Value::Object(top) = value else {
            return Err(TreeError::InvalidData(
                "document must be a JSON object".to_string(),
            ));
        };
        let meta = match top.get(KEY_REQ_META) {
            None | Some(Value::Null) => ReqMeta::new(),
            Some(Value::Object(meta)) => meta.clone(),
            Some(_) => {
                return Err(TreeError::InvalidData(format!(
                    "`{KEY_REQ_META}` must be an object"
                )));
            }
        };
        let tree = match top.get(KEY_REQ_DATA) {
            None | Some(Value::Null) => ReqTree::new(ReqNode::new()),
            Some(data) => ReqTree::from_dict(data)?,
        };
        Ok(Self::with_parts(name, path.into(), meta, tree))
    }

    /// Serializes the whole document, rebuilding the index first.
    pub fn to_json(&mut self) -> Value {
        self.rebuild_index();
        let data = self
            .tree
            .to_dict(self.tree.root())
            .unwrap_or_else(|| Value::Object(Map::new()));
        let mut top = Map::new();
        top.insert(KEY_REQ_META.to_string(), Value::Object(self.meta.clone()));
        top.insert(KEY_REQ_DATA.to_string(), data);
        Value::Object(top)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage location of this document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta(&self) -> &ReqMeta {
        &self.meta
    }

    pub(crate) fn replace_meta(&mut self, meta: ReqMeta) {
        self.meta = meta;
    }

    /// Requirement id prefixes declared in meta (`id_prefix`).
    pub fn id_prefixes(&self) -> Vec<String> {
        match self.meta.get(META_ID_PREFIX) {
            Some(Value::String(prefix)) if !prefix.trim().is_empty() => {
                vec![prefix.trim().to_string()]
            }
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|prefix| !prefix.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn tree(&self) -> &ReqTree {
        &self.tree
    }

    /// Mutable tree access for the editing layer.
    ///
    /// Callers report what they changed through the agent's `inform_*` calls.
    pub fn tree_mut(&mut self) -> &mut ReqTree {
        &mut self.tree
    }

    pub fn get_root(&self) -> NodeId {
        self.tree.root()
    }

    /// Resolves a uuid through the index.
    ///
    /// Entries whose node was removed or re-identified since the last rebuild
    /// resolve to `None`.
    pub fn get_node(&self, uuid: &str) -> Option<NodeId> {
        let id = *self.index.get(uuid)?;
        (self.tree.uuid(id) == Some(uuid)).then_some(id)
    }

    /// Pre-order traversal of the whole tree. Returns the accumulated `context`.
    pub fn map<C, F>(&self, operation: F, context: C) -> C
    where
        F: FnMut(NodeId, &ReqNode, &mut C),
    {
        self.tree.map(self.tree.root(), operation, context)
    }

    /// Rebuilds the uuid index from the live tree.
    pub fn rebuild_index(&mut self) {
        self.index = self.map(
            |id, node, index: &mut HashMap<String, NodeId>| {
                index.insert(node.uuid().to_string(), id);
            },
            HashMap::new(),
        );
    }

    /// Number of entries in the uuid index.
    pub fn indexed_len(&self) -> usize {
        self.index.len()
    }

    /// Whether edits are waiting for a deferred save.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }
}
