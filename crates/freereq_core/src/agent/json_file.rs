//! JSON-file document agent.
//!
//! # Responsibility
//! - Store each document as `<depot>/<name><suffix>` holding
//!   `{"req_meta": {...}, "req_data": {...}}`.
//! - Enumerate, create, open and save documents in one depot directory.
//!
//! # Invariants
//! - Writes are all-or-nothing: the document is serialized to a temporary file
//!   in the depot and renamed over the target.
//! - Document names never contain path separators.
//! - A dirty active document is saved before another one replaces it; if
//!   that save fails the switch is refused and the active document stays.

use super::document::ReqDocument;
use super::observer::ObserverSet;
use super::{AgentError, AgentResult, ReqAgent, SavePolicy};
use crate::config::CoreConfig;
use log::{error, info, warn};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;

/// File suffix identifying requirement documents in a depot.
pub const DEFAULT_DOCUMENT_SUFFIX: &str = ".req";

/// Document agent backed by one JSON file per document.
#[derive(Debug)]
pub struct JsonFileAgent {
    depot_dir: PathBuf,
    suffix: String,
    policy: SavePolicy,
    document: Option<ReqDocument>,
    observers: ObserverSet,
}

impl JsonFileAgent {
    /// Creates an agent over `depot_dir` with default suffix and policy.
    pub fn new(depot_dir: impl Into<PathBuf>) -> Self {
        Self {
            depot_dir: depot_dir.into(),
            suffix: DEFAULT_DOCUMENT_SUFFIX.to_string(),
            policy: SavePolicy::default(),
            document: None,
            observers: ObserverSet::new(),
        }
    }

    /// Creates an agent from loaded configuration.
    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(&config.depot_dir)
            .with_suffix(&config.file_suffix)
            .with_save_policy(config.save_policy)
    }

    pub fn with_suffix(mut self, suffix: &str) -> Self {
        let trimmed = suffix.trim();
        self.suffix = if trimmed.is_empty() {
            DEFAULT_DOCUMENT_SUFFIX.to_string()
        } else if trimmed.starts_with('.') {
            trimmed.to_string()
        } else {
            format!(".{trimmed}")
        };
        self
    }

    pub fn with_save_policy(mut self, policy: SavePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn depot_dir(&self) -> &Path {
        &self.depot_dir
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Storage path for document `name` (not validated).
    pub fn document_path(&self, name: &str) -> PathBuf {
        self.depot_dir.join(format!("{name}{}", self.suffix))
    }

    fn validated_path(&self, name: &str) -> AgentResult<PathBuf> {
        let trimmed = name.trim();
        let invalid = trimmed.is_empty()
            || trimmed != name
            || trimmed == "."
            || trimmed == ".."
            || trimmed.contains(['/', '\\'])
            || trimmed.contains(std::path::MAIN_SEPARATOR);
        if invalid {
            return Err(AgentError::InvalidName(name.to_string()));
        }
        Ok(self.document_path(trimmed))
    }

    /// Saves deferred edits of the active document before it is replaced.
    fn save_pending_edits(&mut self, next: &str) -> AgentResult<()> {
        let Some(current) = self.document.as_ref().filter(|document| document.is_dirty()) else {
            return Ok(());
        };
        let current = current.name().to_string();
        if let Err(err) = self.try_save() {
            warn!(
                "event=switch_document module=agent status=error error_code={} from={} to={} error={}",
                err.code(),
                current,
                next,
                err
            );
            return Err(err);
        }
        info!(
            "event=switch_document module=agent status=ok from={} to={} pending_saved=true",
            current, next
        );
        Ok(())
    }
}

impl ReqAgent for JsonFileAgent {
    fn list_documents(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.depot_dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    "event=list_documents module=agent status=error error_code=io_failed depot={} error={}",
                    self.depot_dir.display(),
                    err
                );
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter_map(|file_name| {
                file_name
                    .strip_suffix(self.suffix.as_str())
                    .filter(|stem| !stem.is_empty())
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        names
    }

    fn try_new_document(&mut self, name: &str, overwrite: bool) -> AgentResult<()> {
        let path = self.validated_path(name)?;
        if path.exists() && !overwrite {
            return Err(AgentError::DocumentExists(name.to_string()));
        }
        self.save_pending_edits(name)?;

        let mut document = ReqDocument::new(name, path);
        let saved_path = write_document(&mut document)?;
        info!(
            "event=new_document module=agent status=ok name={} overwrite={}",
            name, overwrite
        );
        self.document = Some(document);
        self.observers.notify_req_saved(&saved_path);
        Ok(())
    }

    fn try_open_document(&mut self, name: &str) -> AgentResult<()> {
        let started_at = Instant::now();
        let path = self.validated_path(name)?;
        if !path.is_file() {
            return Err(AgentError::DocumentNotFound(name.to_string()));
        }

        self.save_pending_edits(name)?;
        let document = read_document(name, &path)?;
        info!(
            "event=open_document module=agent status=ok name={} nodes={} duration_ms={}",
            name,
            document.indexed_len(),
            started_at.elapsed().as_millis()
        );
        self.document = Some(document);
        Ok(())
    }

    fn try_save(&mut self) -> AgentResult<PathBuf> {
        let document = self.document.as_mut().ok_or(AgentError::NoActiveDocument)?;
        let path = write_document(document)?;
        document.set_dirty(false);
        self.observers.notify_req_saved(&path);
        Ok(path)
    }

    fn save_policy(&self) -> SavePolicy {
        self.policy
    }

    fn document(&self) -> Option<&ReqDocument> {
        self.document.as_ref()
    }

    fn document_mut(&mut self) -> Option<&mut ReqDocument> {
        self.document.as_mut()
    }

    fn observers_mut(&mut self) -> &mut ObserverSet {
        &mut self.observers
    }

    fn document_and_observers(&mut self) -> (Option<&mut ReqDocument>, &mut ObserverSet) {
        (self.document.as_mut(), &mut self.observers)
    }
}

fn read_document(name: &str, path: &Path) -> AgentResult<ReqDocument> {
    let text = fs::read_to_string(path).map_err(|source| AgentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|source| AgentError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    ReqDocument::from_json(name, path, &value).map_err(|source| AgentError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

fn write_document(document: &mut ReqDocument) -> AgentResult<PathBuf> {
    let started_at = Instant::now();
    let path = document.path().to_path_buf();
    let value = document.to_json();

    let result = write_atomically(&path, &value);
    match &result {
        Ok(()) => info!(
            "event=save_document module=agent status=ok name={} nodes={} duration_ms={}",
            document.name(),
            document.indexed_len(),
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=save_document module=agent status=error name={} duration_ms={} error_code={} error={}",
            document.name(),
            started_at.elapsed().as_millis(),
            err.code(),
            err
        ),
    }
    result.map(|()| path)
}

fn write_atomically(path: &Path, value: &serde_json::Value) -> AgentResult<()> {
    let io_error = |source: std::io::Error| AgentError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(io_error)?;

    let mut file = NamedTempFile::new_in(&dir).map_err(io_error)?;
    serde_json::to_writer_pretty(&mut file, value).map_err(|source| AgentError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    file.write_all(b"\n").map_err(io_error)?;
    file.as_file().sync_all().map_err(io_error)?;
    file.persist(path).map_err(|err| io_error(err.error))?;
    Ok(())
}
