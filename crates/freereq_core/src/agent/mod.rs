//! Requirement document agents.
//!
//! # Responsibility
//! - Define the storage-facing contract for listing, creating, opening and
//!   saving named requirement documents.
//! - Turn "node changed" signals from the editing layer into observer
//!   notifications and, depending on [`SavePolicy`], a full re-save.
//!
//! # Invariants
//! - Exactly one document is active at a time.
//! - A failed open/new leaves the previously active document untouched.
//! - A failed save never touches the in-memory tree.
//! - Observers are notified of every mutation regardless of save policy.
//!
//! # See also
//! - docs/architecture/document-format.md

pub mod document;
pub mod json_file;
pub mod observer;

use crate::model::tree::{NodeId, TreeError};
use document::{ReqDocument, ReqMeta};
use log::{error, warn};
use observer::ObserverSet;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Result type used by agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// When mutations reported through `inform_*` reach storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SavePolicy {
    /// Every reported mutation triggers a full re-save.
    #[default]
    Immediate,
    /// Reported mutations mark the document dirty; `flush` persists it.
    Deferred,
}

/// Errors from document agent operations.
#[derive(Debug)]
pub enum AgentError {
    /// Document name is empty or contains path separators.
    InvalidName(String),
    /// Document exists and overwrite was not requested.
    DocumentExists(String),
    /// No stored document has this name.
    DocumentNotFound(String),
    /// Operation requires an active document.
    NoActiveDocument,
    /// File-system failure.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// File is not valid JSON.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// JSON is valid but does not describe a requirement document.
    Malformed { path: PathBuf, source: TreeError },
}

impl Display for AgentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "invalid document name: `{name}`"),
            Self::DocumentExists(name) => write!(f, "document already exists: {name}"),
            Self::DocumentNotFound(name) => write!(f, "document not found: {name}"),
            Self::NoActiveDocument => write!(f, "no active document"),
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Json { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Malformed { path, source } => write!(f, "{}: {source}", path.display()),
        }
    }
}

impl Error for AgentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::Malformed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl AgentError {
    /// Stable short code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidName(_) => "invalid_name",
            Self::DocumentExists(_) => "document_exists",
            Self::DocumentNotFound(_) => "document_not_found",
            Self::NoActiveDocument => "no_active_document",
            Self::Io { .. } => "io_failed",
            Self::Json { .. } => "json_invalid",
            Self::Malformed { .. } => "document_malformed",
        }
    }
}

/// Storage-facing contract for requirement documents.
///
/// The `try_*` methods carry error detail. The plain-named methods are the
/// boundary used by the editing layer: they log failures and return `bool`.
pub trait ReqAgent {
    /// Names of stored documents, sorted.
    fn list_documents(&self) -> Vec<String>;

    /// Creates and activates a fresh document whose root is titled `name`.
    fn try_new_document(&mut self, name: &str, overwrite: bool) -> AgentResult<()>;

    /// Loads and activates a stored document.
    fn try_open_document(&mut self, name: &str) -> AgentResult<()>;

    /// Writes the active document to storage.
    fn try_save(&mut self) -> AgentResult<PathBuf>;

    fn save_policy(&self) -> SavePolicy;

    fn document(&self) -> Option<&ReqDocument>;

    fn document_mut(&mut self) -> Option<&mut ReqDocument>;

    fn observers_mut(&mut self) -> &mut ObserverSet;

    /// Borrows the active document and the observers at the same time.
    fn document_and_observers(&mut self) -> (Option<&mut ReqDocument>, &mut ObserverSet);

    fn new_document(&mut self, name: &str, overwrite: bool) -> bool {
        report("new_document", self.try_new_document(name, overwrite))
    }

    fn open_document(&mut self, name: &str) -> bool {
        report("open_document", self.try_open_document(name))
    }

    fn get_meta(&self) -> Option<&ReqMeta> {
        self.document().map(ReqDocument::meta)
    }

    /// Replaces metadata and persists immediately, whatever the save policy.
    fn try_set_meta(&mut self, meta: ReqMeta) -> AgentResult<()> {
        let (document, observers) = self.document_and_observers();
        let document = document.ok_or(AgentError::NoActiveDocument)?;
        document.replace_meta(meta);
        observers.notify_meta_data_changed(document.name());
        self.try_save().map(|_| ())
    }

    fn set_meta(&mut self, meta: ReqMeta) -> bool {
        report("set_meta", self.try_set_meta(meta))
    }

    fn get_root(&self) -> Option<NodeId> {
        self.document().map(ReqDocument::get_root)
    }

    fn get_node(&self, uuid: &str) -> Option<NodeId> {
        self.document()?.get_node(uuid)
    }

    /// Reports that attributes of `node` changed.
    ///
    /// Returns `false` only when the change should have been persisted and
    /// the save failed.
    fn inform_node_data_updated(&mut self, node: NodeId) -> bool {
        let (document, observers) = self.document_and_observers();
        let Some(document) = document else {
            warn!("event=node_data_updated module=agent status=error error_code=no_active_document");
            return false;
        };
        observers.notify_node_data_changed(document.name(), document.tree(), node);
        document.set_dirty(true);
        self.persist_per_policy("node_data_updated")
    }

    /// Reports that children of `node` changed.
    fn inform_node_child_updated(&mut self, node: NodeId) -> bool {
        let (document, observers) = self.document_and_observers();
        let Some(document) = document else {
            warn!("event=node_child_updated module=agent status=error error_code=no_active_document");
            return false;
        };
        observers.notify_node_child_changed(document.name(), document.tree(), node);
        document.set_dirty(true);
        self.persist_per_policy("node_child_updated")
    }

    /// Persists pending edits, if any.
    fn flush(&mut self) -> bool {
        match self.document() {
            Some(document) if document.is_dirty() => report("flush", self.try_save().map(|_| ())),
            Some(_) => true,
            None => false,
        }
    }

    #[doc(hidden)]
    fn persist_per_policy(&mut self, operation: &'static str) -> bool {
        match self.save_policy() {
            SavePolicy::Immediate => report(operation, self.try_save().map(|_| ())),
            SavePolicy::Deferred => true,
        }
    }
}

fn report(operation: &'static str, result: AgentResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            error!(
                "event={} module=agent status=error error_code={} error={}",
                operation,
                err.code(),
                err
            );
            false
        }
    }
}
