//! Keyword search over node titles and content.
//!
//! The index is rebuilt lazily: change notifications only mark it stale, and
//! the next query against the document rebuilds it with one `map` pass.

use crate::agent::document::ReqDocument;
use crate::agent::observer::ReqObserver;
use crate::extension::manifest::{
    PluginManifest, CAPABILITY_INDEXER, CAPABILITY_REQ_OBSERVER, CAPABILITY_SESSION_HOOK,
};
use crate::extension::registry::{PluginContext, PluginError, ReqPlugin};
use crate::model::tree::{NodeId, ReqTree};
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone)]
struct IndexedNode {
    uuid: String,
    text: String,
}

/// Case-insensitive keyword index in document order.
#[derive(Debug, Clone)]
pub struct KeywordIndex {
    document: Option<String>,
    nodes: Vec<IndexedNode>,
    stale: bool,
}

impl Default for KeywordIndex {
    fn default() -> Self {
        Self {
            document: None,
            nodes: Vec::new(),
            stale: true,
        }
    }
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds from the whole document.
    pub fn rebuild(&mut self, document: &ReqDocument) {
        self.nodes = document.map(
            |_, node, nodes: &mut Vec<IndexedNode>| {
                nodes.push(IndexedNode {
                    uuid: node.uuid().to_string(),
                    text: format!("{}\n{}", node.title(), node.content()).to_lowercase(),
                });
            },
            Vec::new(),
        );
        self.document = Some(document.name().to_string());
        self.stale = false;
        debug!(
            "event=keyword_index module=plugin status=ok document={} nodes={}",
            document.name(),
            self.nodes.len()
        );
    }

    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Uuids of nodes containing every whitespace-separated term.
    ///
    /// A blank query matches nothing.
    pub fn search(&self, query: &str) -> Vec<String> {
        let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        if terms.is_empty() {
            return Vec::new();
        }
        self.nodes
            .iter()
            .filter(|node| terms.iter().all(|term| node.text.contains(term.as_str())))
            .map(|node| node.uuid.clone())
            .collect()
    }

    /// Searches `document`, rebuilding first when stale or built for another document.
    pub fn search_in(&mut self, document: &ReqDocument, query: &str) -> Vec<String> {
        if self.stale || self.document.as_deref() != Some(document.name()) {
            self.rebuild(document);
        }
        self.search(query)
    }
}

/// Shared handle used by the plugin, its observer and callers.
#[derive(Debug, Clone, Default)]
pub struct SharedKeywordIndex(Rc<RefCell<KeywordIndex>>);

impl SharedKeywordIndex {
    pub fn search_in(&self, document: &ReqDocument, query: &str) -> Vec<String> {
        self.0.borrow_mut().search_in(document, query)
    }

    pub fn is_stale(&self) -> bool {
        self.0.borrow().is_stale()
    }

    fn rebuild(&self, document: &ReqDocument) {
        self.0.borrow_mut().rebuild(document);
    }

    fn mark_stale(&self) {
        self.0.borrow_mut().mark_stale();
    }
}

impl ReqObserver for SharedKeywordIndex {
    fn on_meta_data_changed(&mut self, _req_name: &str) {
        self.mark_stale();
    }

    fn on_node_data_changed(&mut self, _req_name: &str, _tree: &ReqTree, _node: NodeId) {
        self.mark_stale();
    }

    fn on_node_child_changed(&mut self, _req_name: &str, _tree: &ReqTree, _node: NodeId) {
        self.mark_stale();
    }
}

/// Keeps a [`KeywordIndex`] in step with the active document.
#[derive(Debug)]
pub struct KeywordIndexPlugin {
    manifest: PluginManifest,
    index: SharedKeywordIndex,
}

impl Default for KeywordIndexPlugin {
    fn default() -> Self {
        Self {
            manifest: PluginManifest::new("builtin.keyword_index", "1.0.0")
                .with_tags("search, index")
                .with_capabilities(&[
                    CAPABILITY_REQ_OBSERVER,
                    CAPABILITY_SESSION_HOOK,
                    CAPABILITY_INDEXER,
                ]),
            index: SharedKeywordIndex::default(),
        }
    }
}

impl KeywordIndexPlugin {
    pub fn index(&self) -> SharedKeywordIndex {
        self.index.clone()
    }
}

impl ReqPlugin for KeywordIndexPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn prepare(&mut self, context: &mut PluginContext<'_>) -> Result<(), PluginError> {
        context.add_observer(Box::new(self.index.clone()));
        let on_loaded = self.index.clone();
        context
            .hooks()
            .document_loaded
            .add_post_hook(move |document: &ReqDocument, _| on_loaded.rebuild(document));
        Ok(())
    }
}
