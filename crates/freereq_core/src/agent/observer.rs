//! Observer contract for document mutations.
//!
//! # Responsibility
//! - Define the closed set of notifications an agent emits after a mutation.
//! - Fan notifications out to every registered observer in registration order.
//!
//! # Invariants
//! - Every hook has a no-op default; observers override only what they need.
//! - Notification never depends on whether the change was persisted.

use crate::model::tree::{NodeId, ReqTree};
use std::path::Path;

/// Receiver of document change notifications.
pub trait ReqObserver {
    /// Document metadata was replaced.
    fn on_meta_data_changed(&mut self, _req_name: &str) {}

    /// Attributes of `node` changed.
    fn on_node_data_changed(&mut self, _req_name: &str, _tree: &ReqTree, _node: NodeId) {}

    /// Children of `node` were inserted, removed or reordered.
    fn on_node_child_changed(&mut self, _req_name: &str, _tree: &ReqTree, _node: NodeId) {}

    /// The document file at `path` was written successfully.
    fn on_req_saved(&mut self, _path: &Path) {}
}

/// Ordered list of observers owned by one agent.
#[derive(Default)]
pub struct ObserverSet {
    observers: Vec<Box<dyn ReqObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, observer: Box<dyn ReqObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn notify_meta_data_changed(&mut self, req_name: &str) {
        for observer in &mut self.observers {
            observer.on_meta_data_changed(req_name);
        }
    }

    pub fn notify_node_data_changed(&mut self, req_name: &str, tree: &ReqTree, node: NodeId) {
        for observer in &mut self.observers {
            observer.on_node_data_changed(req_name, tree, node);
        }
    }

    pub fn notify_node_child_changed(&mut self, req_name: &str, tree: &ReqTree, node: NodeId) {
        for observer in &mut self.observers {
            observer.on_node_child_changed(req_name, tree, node);
        }
    }

    pub fn notify_req_saved(&mut self, path: &Path) {
        for observer in &mut self.observers {
            observer.on_req_saved(path);
        }
    }
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("len", &self.observers.len())
            .finish()
    }
}
