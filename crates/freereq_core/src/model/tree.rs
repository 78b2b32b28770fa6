//! Arena-backed requirement tree.
//!
//! # Responsibility
//! - Own every node of one document and the parent/children links between them.
//! - Provide navigation and structural edits over stable [`NodeId`] handles.
//! - Convert subtrees to and from the nested `child` JSON representation.
//!
//! # Invariants
//! - A node id appears in at most one children list, and that list belongs to
//!   the node recorded as its parent.
//! - The root never has a parent and cannot be reparented.
//! - Removing a node frees its whole subtree; stale ids resolve to `None`.
//! - Reparenting validates first and mutates second, so a rejected edit leaves
//!   the tree unchanged.
//!
//! # See also
//! - docs/architecture/document-format.md

use crate::model::node::{AttributeError, ReqNode, FIELD_CHILD, FIELD_UUID};
use log::warn;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Generational handle of one node inside a [`ReqTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Result type used by tree operations.
pub type TreeResult<T> = Result<T, TreeError>;

/// Errors from structural tree edits and conversions.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeError {
    /// Handle is stale or was never issued by this tree.
    NodeNotFound(NodeId),
    /// Sibling insertion next to a node that has no parent.
    NoParent(NodeId),
    /// The document root cannot be moved under another node.
    RootImmovable(NodeId),
    /// Attaching `node` under `parent` would make a node its own ancestor.
    CycleDetected { node: NodeId, parent: NodeId },
    /// Rejected attribute write.
    Attribute(AttributeError),
    /// Nested representation is malformed.
    InvalidData(String),
}

impl Display for TreeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NodeNotFound(id) => write!(f, "tree node not found: {id}"),
            Self::NoParent(id) => write!(f, "tree node has no parent: {id}"),
            Self::RootImmovable(id) => write!(f, "tree root cannot be reparented: {id}"),
            Self::CycleDetected { node, parent } => write!(
                f,
                "attach would create cycle: node {node} under parent {parent}"
            ),
            Self::Attribute(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid tree data: {message}"),
        }
    }
}

impl Error for TreeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Attribute(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AttributeError> for TreeError {
    fn from(value: AttributeError) -> Self {
        Self::Attribute(value)
    }
}

#[derive(Debug, Clone)]
struct NodeEntry {
    data: ReqNode,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    entry: Option<NodeEntry>,
}

/// Ordered requirement tree owning all of its nodes.
#[derive(Debug, Clone)]
pub struct ReqTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    live: usize,
}

impl ReqTree {
    /// Creates a tree holding a single root node.
    pub fn new(root: ReqNode) -> Self {
        let mut tree = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            live: 0,
        };
        tree.root = tree.alloc(root);
        tree
    }

    /// Creates a tree whose root carries `title`.
    pub fn with_root_title(title: impl Into<String>) -> Self {
        Self::new(ReqNode::titled(title))
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, detached ones included.
    pub fn node_count(&self) -> usize {
        self.live
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.entry(id).is_some()
    }

    pub fn node(&self, id: NodeId) -> Option<&ReqNode> {
        self.entry(id).map(|entry| &entry.data)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut ReqNode> {
        self.entry_mut(id).map(|entry| &mut entry.data)
    }

    /// Writes one attribute on `id`.
    pub fn set(&mut self, id: NodeId, key: &str, value: impl Into<Value>) -> TreeResult<()> {
        let node = self.node_mut(id).ok_or(TreeError::NodeNotFound(id))?;
        node.set(key, value)?;
        Ok(())
    }

    pub fn uuid(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(ReqNode::uuid)
    }

    pub fn title(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(ReqNode::title)
    }

    // -------------------------------- Navigation --------------------------------

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.entry(id).and_then(|entry| entry.parent)
    }

    /// Children of `id` in document order; empty for stale ids.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.entry(id)
            .map(|entry| entry.children.as_slice())
            .unwrap_or_default()
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.children(id).len()
    }

    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.children(id).get(index).copied()
    }

    /// The sibling sequence of `id`, `id` included.
    ///
    /// The root's sibling sequence is the root itself; a detached node has none.
    pub fn sibling(&self, id: NodeId) -> &[NodeId] {
        match self.parent(id) {
            Some(parent) => self.children(parent),
            None if id == self.root => std::slice::from_ref(&self.root),
            None => &[],
        }
    }

    /// Index of `id` within its sibling sequence.
    ///
    /// Returns `None` and logs a warning when the node is missing from the
    /// sequence it should belong to. That only happens for detached nodes or a
    /// broken parent link, both of which are caller bugs.
    pub fn order(&self, id: NodeId) -> Option<usize> {
        if !self.contains(id) {
            warn!("event=node_order module=tree status=error error_code=node_not_found node={id}");
            return None;
        }
        let position = self.sibling(id).iter().position(|sibling| *sibling == id);
        if position.is_none() {
            warn!(
                "event=node_order module=tree status=error error_code=missing_from_siblings node={} parent={}",
                id,
                self.parent(id)
                    .map(|parent| parent.to_string())
                    .unwrap_or_else(|| "none".to_string())
            );
        }
        position
    }

    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        let order = self.order(id)?;
        let previous = order.checked_sub(1)?;
        self.sibling(id).get(previous).copied()
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        let order = self.order(id)?;
        self.sibling(id).get(order + 1).copied()
    }

    /// Number of edges between `id` and the top of its subtree.
    pub fn depth(&self, id: NodeId) -> Option<usize> {
        self.entry(id)?;
        let mut depth = 0;
        let mut cursor = self.parent(id);
        while let Some(current) = cursor {
            depth += 1;
            cursor = self.parent(current);
        }
        Some(depth)
    }

    /// Returns whether `ancestor` lies on the parent chain of `id` (or is `id`).
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            if !visited.insert(current) {
                return false;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Node ids of the subtree at `start` in pre-order.
    pub fn preorder(&self, start: NodeId) -> Vec<NodeId> {
        self.map(start, |id, _, ids: &mut Vec<NodeId>| ids.push(id), Vec::new())
    }

    /// Pre-order traversal invoking `operation` at every node of the subtree.
    ///
    /// Returns the accumulated `context`.
    pub fn map<C, F>(&self, start: NodeId, mut operation: F, mut context: C) -> C
    where
        F: FnMut(NodeId, &ReqNode, &mut C),
    {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Some(entry) = self.entry(id) else {
                continue;
            };
            operation(id, &entry.data, &mut context);
            stack.extend(entry.children.iter().rev().copied());
        }
        context
    }

    // ------------------------------- Construction -------------------------------

    /// Places a standalone node in the arena. It has no parent until attached.
    pub fn create_node(&mut self, data: ReqNode) -> NodeId {
        self.alloc(data)
    }

    /// Attaches `child` as the last child of `parent`.
    ///
    /// Returns the new index of `child`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> TreeResult<usize> {
        let end = self.child_count(parent);
        self.insert_children(parent, &[child], end)
    }

    /// Attaches `nodes` under `parent` starting at `pos` (clamped).
    ///
    /// Attached nodes are detached from their old parent first. Returns the
    /// index of the first inserted node.
    pub fn insert_children(
        &mut self,
        parent: NodeId,
        nodes: &[NodeId],
        pos: usize,
    ) -> TreeResult<usize> {
        let mut unique = Vec::with_capacity(nodes.len());
        for node in nodes {
            self.ensure_attachable(parent, *node)?;
            if !unique.contains(node) {
                unique.push(*node);
            }
        }

        let mut pos = pos.min(self.child_count(parent));
        for node in &unique {
            if self.parent(*node) == Some(parent) {
                if let Some(index) = self.position_in(parent, *node) {
                    if index < pos {
                        pos -= 1;
                    }
                }
            }
            self.unlink(*node);
        }

        let pos = pos.min(self.child_count(parent));
        for (offset, node) in unique.iter().enumerate() {
            self.link(parent, *node, pos + offset);
        }
        Ok(pos)
    }

    /// Inserts `node` immediately before `anchor` in the anchor's sibling sequence.
    pub fn insert_sibling_left(&mut self, anchor: NodeId, node: NodeId) -> TreeResult<usize> {
        self.insert_sibling(anchor, node, false)
    }

    /// Inserts `node` immediately after `anchor` in the anchor's sibling sequence.
    pub fn insert_sibling_right(&mut self, anchor: NodeId, node: NodeId) -> TreeResult<usize> {
        self.insert_sibling(anchor, node, true)
    }

    /// Removes `child` and its subtree from `parent`.
    ///
    /// Returns `false` without side effects when `child` is not a child of `parent`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if self.parent(child) != Some(parent) {
            return false;
        }
        if !self.unlink(child) {
            return false;
        }
        self.free_subtree(child);
        true
    }

    /// Removes every child of `parent`. Returns how many direct children were removed.
    pub fn remove_children(&mut self, parent: NodeId) -> usize {
        let Some(entry) = self.entry_mut(parent) else {
            return 0;
        };
        let children = std::mem::take(&mut entry.children);
        for child in &children {
            self.free_subtree(*child);
        }
        children.len()
    }

    /// Removes `id` and its subtree from wherever it is attached.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        match self.parent(id) {
            Some(parent) => self.remove_child(parent, id),
            None => false,
        }
    }

    /// Unlinks `id` from its parent but keeps the subtree alive.
    pub fn detach(&mut self, id: NodeId) -> TreeResult<()> {
        if !self.contains(id) {
            return Err(TreeError::NodeNotFound(id));
        }
        if id == self.root {
            return Err(TreeError::RootImmovable(id));
        }
        self.unlink(id);
        Ok(())
    }

    /// Frees a detached subtree. Attached nodes and the root are left alone.
    pub fn discard(&mut self, id: NodeId) -> bool {
        if id == self.root || !self.contains(id) || self.parent(id).is_some() {
            return false;
        }
        self.free_subtree(id);
        true
    }

    /// Swaps `id` with its previous sibling. Returns `false` at the boundary.
    pub fn move_up(&mut self, id: NodeId) -> bool {
        self.swap_with_neighbour(id, false)
    }

    /// Swaps `id` with its next sibling. Returns `false` at the boundary.
    pub fn move_down(&mut self, id: NodeId) -> bool {
        self.swap_with_neighbour(id, true)
    }

    // -------------------------------- Persistence -------------------------------

    /// Nested representation of the subtree at `id`: flat attributes plus a
    /// `child` array of the same shape.
    pub fn to_dict(&self, id: NodeId) -> Option<Value> {
        let entry = self.entry(id)?;
        let mut dict = entry.data.attributes().clone();
        let children = entry
            .children
            .iter()
            .filter_map(|child| self.to_dict(*child))
            .collect();
        dict.insert(FIELD_CHILD.to_string(), Value::Array(children));
        Some(Value::Object(dict))
    }

    /// Rebuilds a whole tree from its nested representation.
    ///
    /// # Errors
    /// - `InvalidData` when a node is not an object or `child` is not an array.
    pub fn from_dict(value: &Value) -> TreeResult<Self> {
        let mut seen = HashSet::new();
        let root = parse_node(value, &mut seen)?;
        let mut tree = Self::new(root);
        let root_id = tree.root;
        tree.build_children(root_id, value, &mut seen)?;
        Ok(tree)
    }

    /// Rebuilds a subtree from its nested representation as a detached node.
    ///
    /// Identities already present in this tree are regenerated.
    pub fn import_dict(&mut self, value: &Value) -> TreeResult<NodeId> {
        let mut seen: HashSet<String> = self
            .slots
            .iter()
            .filter_map(|slot| slot.entry.as_ref())
            .map(|entry| entry.data.uuid().to_string())
            .collect();
        let data = parse_node(value, &mut seen)?;
        let id = self.alloc(data);
        if let Err(err) = self.build_children(id, value, &mut seen) {
            self.free_subtree(id);
            return Err(err);
        }
        Ok(id)
    }

    fn build_children(
        &mut self,
        parent: NodeId,
        value: &Value,
        seen: &mut HashSet<String>,
    ) -> TreeResult<()> {
        let Some(children) = child_array(value)? else {
            return Ok(());
        };
        for child_value in children {
            let data = parse_node(child_value, seen)?;
            let child = self.alloc(data);
            let index = self.child_count(parent);
            self.link(parent, child, index);
            self.build_children(child, child_value, seen)?;
        }
        Ok(())
    }

    // --------------------------------- Internals --------------------------------

    fn entry(&self, id: NodeId) -> Option<&NodeEntry> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, id: NodeId) -> Option<&mut NodeEntry> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    fn alloc(&mut self, data: ReqNode) -> NodeId {
        let entry = NodeEntry {
            data,
            parent: None,
            children: Vec::new(),
        };
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(slot) = self.slots.get_mut(current.index as usize) else {
                continue;
            };
            if slot.generation != current.generation {
                continue;
            }
            if let Some(entry) = slot.entry.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(current.index);
                self.live -= 1;
                stack.extend(entry.children);
            }
        }
    }

    fn position_in(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.children(parent).iter().position(|id| *id == child)
    }

    fn ensure_attachable(&self, parent: NodeId, node: NodeId) -> TreeResult<()> {
        if !self.contains(parent) {
            return Err(TreeError::NodeNotFound(parent));
        }
        if !self.contains(node) {
            return Err(TreeError::NodeNotFound(node));
        }
        if node == self.root {
            return Err(TreeError::RootImmovable(node));
        }
        if self.is_ancestor_or_self(node, parent) {
            return Err(TreeError::CycleDetected { node, parent });
        }
        Ok(())
    }

    /// Drops the parent link of `id`. Returns whether it was listed under its parent.
    fn unlink(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.parent(id) else {
            return false;
        };
        let listed = match self.entry_mut(parent) {
            Some(entry) => {
                let before = entry.children.len();
                entry.children.retain(|child| *child != id);
                entry.children.len() != before
            }
            None => false,
        };
        if !listed {
            warn!(
                "event=node_unlink module=tree status=error error_code=missing_from_siblings node={id} parent={parent}"
            );
        }
        if let Some(entry) = self.entry_mut(id) {
            entry.parent = None;
        }
        listed
    }

    fn link(&mut self, parent: NodeId, child: NodeId, pos: usize) {
        if let Some(entry) = self.entry_mut(parent) {
            let pos = pos.min(entry.children.len());
            entry.children.insert(pos, child);
        }
        if let Some(entry) = self.entry_mut(child) {
            entry.parent = Some(parent);
        }
    }

    fn insert_sibling(&mut self, anchor: NodeId, node: NodeId, right: bool) -> TreeResult<usize> {
        if !self.contains(anchor) {
            return Err(TreeError::NodeNotFound(anchor));
        }
        let parent = self.parent(anchor).ok_or(TreeError::NoParent(anchor))?;
        if node == anchor {
            return self.position_in(parent, anchor).ok_or_else(|| {
                TreeError::InvalidData(format!("node {anchor} missing from its parent"))
            });
        }
        self.ensure_attachable(parent, node)?;

        self.unlink(node);
        let anchor_pos = self.position_in(parent, anchor).ok_or_else(|| {
            TreeError::InvalidData(format!("node {anchor} missing from its parent"))
        })?;
        let pos = if right { anchor_pos + 1 } else { anchor_pos };
        self.link(parent, node, pos);
        Ok(pos)
    }

    fn swap_with_neighbour(&mut self, id: NodeId, downwards: bool) -> bool {
        let Some(parent) = self.parent(id) else {
            return false;
        };
        let Some(index) = self.position_in(parent, id) else {
            return false;
        };
        let Some(entry) = self.entry_mut(parent) else {
            return false;
        };
        let target = if downwards {
            index + 1
        } else {
            match index.checked_sub(1) {
                Some(value) => value,
                None => return false,
            }
        };
        if target >= entry.children.len() {
            return false;
        }
        entry.children.swap(index, target);
        true
    }
}

fn child_array(value: &Value) -> TreeResult<Option<&Vec<Value>>> {
    match value.get(FIELD_CHILD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(children)) => Ok(Some(children)),
        Some(other) => Err(TreeError::InvalidData(format!(
            "`{FIELD_CHILD}` must be an array, got {}",
            json_kind(other)
        ))),
    }
}

fn parse_node(value: &Value, seen: &mut HashSet<String>) -> TreeResult<ReqNode> {
    let Value::Object(dict) = value else {
        return Err(TreeError::InvalidData(format!(
            "node must be an object, got {}",
            json_kind(value)
        )));
    };
    child_array(value)?;

    let mut attrs: Map<String, Value> = dict
        .iter()
        .filter(|(key, _)| key.as_str() != FIELD_CHILD)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let stored_uuid = attrs
        .get(FIELD_UUID)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string);
    if stored_uuid.is_none() {
        attrs.insert(FIELD_UUID.to_string(), Value::String(String::new()));
    }
    let mut node = ReqNode::from_attributes(attrs);

    match stored_uuid {
        Some(uuid) if seen.insert(uuid.clone()) => {}
        Some(uuid) => {
            node.regenerate_uuid();
            warn!(
                "event=node_load module=tree status=warn error_code=duplicate_uuid uuid={} replacement={}",
                uuid,
                node.uuid()
            );
            seen.insert(node.uuid().to_string());
        }
        None => {
            node.regenerate_uuid();
            seen.insert(node.uuid().to_string());
        }
    }
    Ok(node)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
