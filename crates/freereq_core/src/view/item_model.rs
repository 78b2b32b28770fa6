//! Row/column adapter over a live requirement tree.
//!
//! # Responsibility
//! - Address tree nodes as `(row, column, parent)` positions for a tree view.
//! - Bracket every structural edit with begin/end notifications.
//!
//! # Invariants
//! - The model owns no nodes; every query resolves against the tree passed in.
//! - The document root is hidden and addressed by `None`.
//! - Insert/remove notifications carry the exact affected row range.

use crate::model::node::ReqNode;
use crate::model::tree::{NodeId, ReqTree, TreeError, TreeResult};
use log::{debug, warn};

/// Position of one visible node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelIndex {
    pub row: usize,
    pub column: usize,
    pub node: NodeId,
}

/// Data roles understood by [`ReqModel::data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemRole {
    /// Title shown in the tree.
    Display,
    /// Title offered for in-place editing.
    Edit,
    /// User-assigned requirement id.
    Id,
    Uuid,
}

/// Receiver of model change notifications.
///
/// `parent == None` means the hidden root. Row ranges are inclusive.
pub trait ModelObserver {
    fn layout_about_to_be_changed(&mut self) {}
    fn layout_changed(&mut self) {}
    fn rows_about_to_be_inserted(&mut self, _parent: Option<ModelIndex>, _first: usize, _last: usize) {}
    fn rows_inserted(&mut self, _parent: Option<ModelIndex>, _first: usize, _last: usize) {}
    fn rows_about_to_be_removed(&mut self, _parent: Option<ModelIndex>, _first: usize, _last: usize) {}
    fn rows_removed(&mut self, _parent: Option<ModelIndex>, _first: usize, _last: usize) {}
    fn data_changed(&mut self, _index: ModelIndex) {}
    fn model_about_to_be_reset(&mut self) {}
    fn model_reset(&mut self) {}
}

/// Tree-view adapter. Stateless apart from its observers.
#[derive(Default)]
pub struct ReqModel {
    observers: Vec<Box<dyn ModelObserver>>,
}

impl std::fmt::Debug for ReqModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqModel")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ReqModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&mut self, observer: Box<dyn ModelObserver>) {
        self.observers.push(observer);
    }

    /// Node addressed by `parent`, the root for `None`.
    pub fn node_at(&self, tree: &ReqTree, parent: Option<&ModelIndex>) -> NodeId {
        parent.map_or_else(|| tree.root(), |index| index.node)
    }

    pub fn node(&self, index: &ModelIndex) -> NodeId {
        index.node
    }

    pub fn has_index(
        &self,
        tree: &ReqTree,
        row: usize,
        column: usize,
        parent: Option<&ModelIndex>,
    ) -> bool {
        column < self.column_count(parent) && row < self.row_count(tree, parent)
    }

    pub fn index(
        &self,
        tree: &ReqTree,
        row: usize,
        column: usize,
        parent: Option<&ModelIndex>,
    ) -> Option<ModelIndex> {
        if !self.has_index(tree, row, column, parent) {
            return None;
        }
        let node = tree.child(self.node_at(tree, parent), row)?;
        Some(ModelIndex { row, column, node })
    }

    /// Index of `node`'s parent; `None` for top-level items.
    pub fn parent(&self, tree: &ReqTree, index: &ModelIndex) -> Option<ModelIndex> {
        let parent = tree.parent(index.node)?;
        self.index_of(tree, parent)
    }

    pub fn row_count(&self, tree: &ReqTree, parent: Option<&ModelIndex>) -> usize {
        tree.child_count(self.node_at(tree, parent))
    }

    pub fn column_count(&self, _parent: Option<&ModelIndex>) -> usize {
        1
    }

    /// Index of a live node, derived from its sibling order.
    ///
    /// The root and detached nodes have no index.
    pub fn index_of(&self, tree: &ReqTree, node: NodeId) -> Option<ModelIndex> {
        if node == tree.root() || tree.parent(node).is_none() {
            return None;
        }
        let row = tree.order(node)?;
        Some(ModelIndex {
            row,
            column: 0,
            node,
        })
    }

    pub fn data(&self, tree: &ReqTree, index: &ModelIndex, role: ItemRole) -> Option<String> {
        let node = tree.node(index.node)?;
        let value = match role {
            ItemRole::Display | ItemRole::Edit => node.title(),
            ItemRole::Id => node.id(),
            ItemRole::Uuid => node.uuid(),
        };
        Some(value.to_string())
    }

    /// Writes `value` for an editable role (`Edit` or `Id`).
    ///
    /// Returns `false` for read-only roles and stale indexes.
    pub fn set_data(
        &mut self,
        tree: &mut ReqTree,
        index: &ModelIndex,
        value: &str,
        role: ItemRole,
    ) -> bool {
        let Some(node) = tree.node_mut(index.node) else {
            return false;
        };
        match role {
            ItemRole::Edit => node.set_title(value),
            ItemRole::Id => node.set_id(value),
            ItemRole::Display | ItemRole::Uuid => return false,
        }
        for observer in &mut self.observers {
            observer.data_changed(*index);
        }
        true
    }

    /// Inserts `count` blank nodes under `parent` at `row`.
    ///
    /// A negative or past-the-end `row` appends. Returns the new nodes in
    /// order.
    pub fn insert_rows(
        &mut self,
        tree: &mut ReqTree,
        row: isize,
        count: usize,
        parent: Option<&ModelIndex>,
    ) -> TreeResult<Vec<NodeId>> {
        let parent_node = self.node_at(tree, parent);
        if !tree.contains(parent_node) {
            return Err(TreeError::NodeNotFound(parent_node));
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        let child_count = tree.child_count(parent_node);
        let first = usize::try_from(row)
            .ok()
            .filter(|row| *row <= child_count)
            .unwrap_or(child_count);
        let parent_index = parent.copied();

        let nodes: Vec<NodeId> = (0..count)
            .map(|_| tree.create_node(ReqNode::new()))
            .collect();
        if let Err(err) = self.insert_nodes(tree, parent_index, parent_node, first, &nodes) {
            for node in &nodes {
                tree.discard(*node);
            }
            return Err(err);
        }
        debug!(
            "event=insert_rows module=view status=ok parent={} first={} count={}",
            parent_node, first, count
        );
        Ok(nodes)
    }

    /// Removes `count` rows starting at `row` under `parent`.
    ///
    /// Returns `false` without notifying when the range is out of bounds.
    pub fn remove_rows(
        &mut self,
        tree: &mut ReqTree,
        row: usize,
        count: usize,
        parent: Option<&ModelIndex>,
    ) -> bool {
        let parent_node = self.node_at(tree, parent);
        let child_count = tree.child_count(parent_node);
        if count == 0 || row.checked_add(count).map_or(true, |end| end > child_count) {
            return false;
        }

        let last = row + count - 1;
        let parent_index = parent.copied();
        let doomed: Vec<NodeId> = tree.children(parent_node)[row..=last].to_vec();

        self.each(|observer| observer.rows_about_to_be_removed(parent_index, row, last));
        for node in doomed {
            tree.remove_child(parent_node, node);
        }
        self.each(|observer| observer.rows_removed(parent_index, row, last));
        true
    }

    /// Swaps `index` with its previous sibling. Returns the moved index.
    pub fn move_row_up(&mut self, tree: &mut ReqTree, index: &ModelIndex) -> Option<ModelIndex> {
        if self.change_layout(tree, |tree| tree.move_up(index.node)) {
            self.index_of(tree, index.node)
        } else {
            None
        }
    }

    /// Swaps `index` with its next sibling. Returns the moved index.
    pub fn move_row_down(&mut self, tree: &mut ReqTree, index: &ModelIndex) -> Option<ModelIndex> {
        if self.change_layout(tree, |tree| tree.move_down(index.node)) {
            self.index_of(tree, index.node)
        } else {
            None
        }
    }

    /// Runs an arbitrary structural edit inside a layout bracket.
    pub fn change_layout<T>(&mut self, tree: &mut ReqTree, edit: impl FnOnce(&mut ReqTree) -> T) -> T {
        self.each(|observer| observer.layout_about_to_be_changed());
        let result = edit(tree);
        self.each(|observer| observer.layout_changed());
        result
    }

    /// Runs a document switch inside a reset bracket.
    pub fn reset<T>(&mut self, switch: impl FnOnce() -> T) -> T {
        self.each(|observer| observer.model_about_to_be_reset());
        let result = switch();
        self.each(|observer| observer.model_reset());
        result
    }

    /// Links `nodes` under `parent_node` at `first` inside an insert bracket.
    ///
    /// A rejected insert leaves the tree untouched and closes the bracket
    /// with a reset instead of `rows_inserted`.
    fn insert_nodes(
        &mut self,
        tree: &mut ReqTree,
        parent_index: Option<ModelIndex>,
        parent_node: NodeId,
        first: usize,
        nodes: &[NodeId],
    ) -> TreeResult<()> {
        let last = first + nodes.len().saturating_sub(1);
        self.each(|observer| observer.rows_about_to_be_inserted(parent_index, first, last));
        match tree.insert_children(parent_node, nodes, first) {
            Ok(_) => {
                self.each(|observer| observer.rows_inserted(parent_index, first, last));
                Ok(())
            }
            Err(err) => {
                warn!(
                    "event=insert_rows module=view status=error parent={} first={} error={}",
                    parent_node, first, err
                );
                self.reset(|| ());
                Err(err)
            }
        }
    }

    fn each(&mut self, mut notify: impl FnMut(&mut dyn ModelObserver)) {
        for observer in &mut self.observers {
            notify(observer.as_mut());
        }
    }
}
