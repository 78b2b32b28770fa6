//! Edit session over one agent and one item model.
//!
//! # Responsibility
//! - Own the active agent and the view adapter; no global document state.
//! - Implement tree commands as tree edits bracketed by the model and
//!   followed by the matching agent `inform_*` call.
//! - Fire `document_loaded` and `selection_changed` hooks.
//!
//! # Invariants
//! - Every structural edit is reported with `inform_node_child_updated` on the
//!   edited parent; every attribute edit with `inform_node_data_updated`.
//! - Save failures after an edit are logged; the in-memory edit stands.
//! - The selection never points at a removed node.

use crate::agent::document::{ReqDocument, ReqMeta};
use crate::agent::{AgentError, ReqAgent};
use crate::config::CoreConfig;
use crate::extension::hook::Hookable;
use crate::extension::registry::{PluginContext, PluginError, PluginRegistry};
use crate::model::node::ReqNode;
use crate::model::tree::{NodeId, ReqTree, TreeError};
use crate::view::item_model::{ItemRole, ModelIndex, ReqModel};
use log::warn;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from session commands.
#[derive(Debug)]
pub enum SessionError {
    /// Command needs an active document.
    NoDocument,
    /// Index does not address a visible node of the active document.
    InvalidIndex,
    Tree(TreeError),
    Agent(AgentError),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoDocument => write!(f, "no active document"),
            Self::InvalidIndex => write!(f, "index does not address a node"),
            Self::Tree(err) => write!(f, "{err}"),
            Self::Agent(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Tree(err) => Some(err),
            Self::Agent(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TreeError> for SessionError {
    fn from(value: TreeError) -> Self {
        Self::Tree(value)
    }
}

impl From<AgentError> for SessionError {
    fn from(value: AgentError) -> Self {
        Self::Agent(value)
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Hook points plugins attach to.
#[derive(Debug, Default)]
pub struct SessionHooks {
    /// Fired after a document becomes active.
    pub document_loaded: Hookable<ReqDocument>,
    /// Fired with the newly selected node.
    pub selection_changed: Hookable<ReqNode>,
}

/// Editing session: agent, model, hooks and selection.
#[derive(Debug)]
pub struct ReqSession<A: ReqAgent> {
    agent: A,
    model: ReqModel,
    hooks: SessionHooks,
    selected: Option<NodeId>,
}

impl<A: ReqAgent> ReqSession<A> {
    pub fn new(agent: A) -> Self {
        Self {
            agent,
            model: ReqModel::new(),
            hooks: SessionHooks::default(),
            selected: None,
        }
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut A {
        &mut self.agent
    }

    pub fn model(&self) -> &ReqModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut ReqModel {
        &mut self.model
    }

    pub fn hooks_mut(&mut self) -> &mut SessionHooks {
        &mut self.hooks
    }

    pub fn document(&self) -> Option<&ReqDocument> {
        self.agent.document()
    }

    /// Active tree, for model queries.
    pub fn tree(&self) -> Option<&ReqTree> {
        self.agent.document().map(ReqDocument::tree)
    }

    pub fn selected(&self) -> Option<NodeId> {
        self.selected
    }

    /// Prepares all registered plugins against this session.
    pub fn install_plugins(
        &mut self,
        registry: &mut PluginRegistry,
        config: &CoreConfig,
    ) -> Vec<PluginError> {
        let mut context = PluginContext::new(config, self.agent.observers_mut(), &mut self.hooks);
        registry.prepare_all(&mut context)
    }

    pub fn new_document(&mut self, name: &str, overwrite: bool) -> SessionResult<()> {
        let agent = &mut self.agent;
        self.model
            .reset(|| agent.try_new_document(name, overwrite))?;
        self.after_document_switch();
        Ok(())
    }

    pub fn open_document(&mut self, name: &str) -> SessionResult<()> {
        let agent = &mut self.agent;
        self.model.reset(|| agent.try_open_document(name))?;
        self.after_document_switch();
        Ok(())
    }

    /// Appends a blank child under `parent` (`None` = top level).
    pub fn append_child(&mut self, parent: Option<&ModelIndex>) -> SessionResult<ModelIndex> {
        let tree = document_tree(&mut self.agent)?;
        let parent_node = match parent {
            Some(index) => live_node(tree, index)?,
            None => tree.root(),
        };
        let nodes = self.model.insert_rows(tree, -1, 1, parent)?;
        self.report_child_change(parent_node);
        self.index_for(nodes.first().copied())
    }

    /// Inserts a blank sibling directly above `index`.
    pub fn insert_sibling_up(&mut self, index: &ModelIndex) -> SessionResult<ModelIndex> {
        self.insert_sibling(index, 0)
    }

    /// Inserts a blank sibling directly below `index`.
    pub fn insert_sibling_down(&mut self, index: &ModelIndex) -> SessionResult<ModelIndex> {
        self.insert_sibling(index, 1)
    }

    /// Moves `index` one row up. Returns the new index, or `None` at the top.
    pub fn shift_up(&mut self, index: &ModelIndex) -> SessionResult<Option<ModelIndex>> {
        self.shift(index, true)
    }

    /// Moves `index` one row down. Returns the new index, or `None` at the bottom.
    pub fn shift_down(&mut self, index: &ModelIndex) -> SessionResult<Option<ModelIndex>> {
        self.shift(index, false)
    }

    /// Removes `index` and its whole subtree.
    pub fn delete(&mut self, index: &ModelIndex) -> SessionResult<()> {
        let tree = document_tree(&mut self.agent)?;
        let node = live_node(tree, index)?;
        let parent_node = tree.parent(node).ok_or(SessionError::InvalidIndex)?;
        let row = tree.order(node).ok_or(SessionError::InvalidIndex)?;
        let parent_index = self.model.index_of(tree, parent_node);

        if !self.model.remove_rows(tree, row, 1, parent_index.as_ref()) {
            return Err(SessionError::InvalidIndex);
        }
        if self.selected.is_some_and(|selected| !tree.contains(selected)) {
            self.selected = None;
        }
        self.report_child_change(parent_node);
        Ok(())
    }

    pub fn rename(&mut self, index: &ModelIndex, title: &str) -> SessionResult<()> {
        let tree = document_tree(&mut self.agent)?;
        let node = live_node(tree, index)?;
        let current = self.model.index_of(tree, node).ok_or(SessionError::InvalidIndex)?;
        if !self.model.set_data(tree, &current, title, ItemRole::Edit) {
            return Err(SessionError::InvalidIndex);
        }
        self.report_data_change(node);
        Ok(())
    }

    /// Sets the requirement id shown in the `Id` role.
    pub fn set_id(&mut self, index: &ModelIndex, id: &str) -> SessionResult<()> {
        let tree = document_tree(&mut self.agent)?;
        let node = live_node(tree, index)?;
        let current = self.model.index_of(tree, node).ok_or(SessionError::InvalidIndex)?;
        if !self.model.set_data(tree, &current, id, ItemRole::Id) {
            return Err(SessionError::InvalidIndex);
        }
        self.report_data_change(node);
        Ok(())
    }

    pub fn set_content(&mut self, index: &ModelIndex, content: &str) -> SessionResult<()> {
        let tree = document_tree(&mut self.agent)?;
        let node = live_node(tree, index)?;
        tree.node_mut(node)
            .ok_or(SessionError::InvalidIndex)?
            .set_content(content);
        self.report_data_change(node);
        Ok(())
    }

    /// Replaces document metadata; persisted immediately.
    pub fn set_meta(&mut self, meta: ReqMeta) -> SessionResult<()> {
        if self.agent.document().is_none() {
            return Err(SessionError::NoDocument);
        }
        self.agent.try_set_meta(meta)?;
        Ok(())
    }

    /// Changes the selection and fires `selection_changed` for a node.
    pub fn select(&mut self, index: Option<&ModelIndex>) -> SessionResult<()> {
        let Some(index) = index else {
            self.selected = None;
            return Ok(());
        };
        let tree = self
            .agent
            .document()
            .map(ReqDocument::tree)
            .ok_or(SessionError::NoDocument)?;
        let node = live_node(tree, index)?;
        self.selected = Some(node);
        if let Some(data) = tree.node(node) {
            self.hooks.selection_changed.invoke(data, |_| ());
        }
        Ok(())
    }

    /// Writes pending edits under a deferred save policy.
    pub fn flush(&mut self) -> bool {
        self.agent.flush()
    }

    fn insert_sibling(&mut self, index: &ModelIndex, offset: usize) -> SessionResult<ModelIndex> {
        let tree = document_tree(&mut self.agent)?;
        let node = live_node(tree, index)?;
        let parent_node = tree.parent(node).ok_or(SessionError::InvalidIndex)?;
        let row = tree.order(node).ok_or(SessionError::InvalidIndex)? + offset;
        let parent_index = self.model.index_of(tree, parent_node);
        let row = isize::try_from(row).map_err(|_| SessionError::InvalidIndex)?;

        let nodes = self
            .model
            .insert_rows(tree, row, 1, parent_index.as_ref())?;
        self.report_child_change(parent_node);
        self.index_for(nodes.first().copied())
    }

    fn shift(&mut self, index: &ModelIndex, upwards: bool) -> SessionResult<Option<ModelIndex>> {
        let tree = document_tree(&mut self.agent)?;
        let node = live_node(tree, index)?;
        let parent_node = tree.parent(node).ok_or(SessionError::InvalidIndex)?;
        let current = self.model.index_of(tree, node).ok_or(SessionError::InvalidIndex)?;

        let moved = if upwards {
            self.model.move_row_up(tree, &current)
        } else {
            self.model.move_row_down(tree, &current)
        };
        if moved.is_some() {
            self.report_child_change(parent_node);
        }
        Ok(moved)
    }

    fn index_for(&self, node: Option<NodeId>) -> SessionResult<ModelIndex> {
        let tree = self.tree().ok_or(SessionError::NoDocument)?;
        node.and_then(|node| self.model.index_of(tree, node))
            .ok_or(SessionError::InvalidIndex)
    }

    fn after_document_switch(&mut self) {
        self.selected = None;
        if let Some(document) = self.agent.document() {
            self.hooks.document_loaded.invoke(document, |_| ());
        }
    }

    fn report_child_change(&mut self, parent: NodeId) {
        if !self.agent.inform_node_child_updated(parent) {
            warn!(
                "event=session_edit module=service status=degraded kind=child node={} reason=not_persisted",
                parent
            );
        }
    }

    fn report_data_change(&mut self, node: NodeId) {
        if !self.agent.inform_node_data_updated(node) {
            warn!(
                "event=session_edit module=service status=degraded kind=data node={} reason=not_persisted",
                node
            );
        }
    }
}

fn document_tree<A: ReqAgent>(agent: &mut A) -> SessionResult<&mut ReqTree> {
    agent
        .document_mut()
        .map(ReqDocument::tree_mut)
        .ok_or(SessionError::NoDocument)
}

/// Resolves an index to a live, attached, non-root node.
fn live_node(tree: &ReqTree, index: &ModelIndex) -> SessionResult<NodeId> {
    let node = index.node;
    if !tree.contains(node) || node == tree.root() || tree.parent(node).is_none() {
        return Err(SessionError::InvalidIndex);
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::{ReqSession, SessionError};
    use crate::agent::json_file::JsonFileAgent;

    #[test]
    fn commands_without_document_fail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut session = ReqSession::new(JsonFileAgent::new(dir.path()));
        assert!(matches!(
            session.append_child(None),
            Err(SessionError::NoDocument)
        ));
        assert!(matches!(
            session.set_meta(Default::default()),
            Err(SessionError::NoDocument)
        ));
        assert!(matches!(session.select(None), Ok(())));
    }

    #[test]
    fn sibling_commands_place_rows_around_anchor() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut session = ReqSession::new(JsonFileAgent::new(dir.path()));
        session.new_document("Spec", false).expect("new document");

        let anchor = session.append_child(None).expect("append");
        let above = session.insert_sibling_up(&anchor).expect("above");
        let below = session.insert_sibling_down(&above).expect("below");

        assert_eq!(above.row, 0);
        assert_eq!(below.row, 1);
        let tree = session.tree().expect("tree");
        let root = tree.root();
        assert_eq!(tree.children(root), &[above.node, below.node, anchor.node]);
    }

    #[test]
    fn delete_clears_selection_inside_removed_subtree() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut session = ReqSession::new(JsonFileAgent::new(dir.path()));
        session.new_document("Spec", false).expect("new document");

        let top = session.append_child(None).expect("top");
        let nested = session.append_child(Some(&top)).expect("nested");
        session.select(Some(&nested)).expect("select");
        assert_eq!(session.selected(), Some(nested.node));

        session.delete(&top).expect("delete");
        assert_eq!(session.selected(), None);
        assert!(matches!(
            session.rename(&nested, "gone"),
            Err(SessionError::InvalidIndex)
        ));
    }
}
