//! Attachment audit for markdown content.
//!
//! # Responsibility
//! - Extract markdown link targets `[text](target)` from node content.
//! - Compare them with the files in the attachment folder.
//! - Delete unreferenced attachments on explicit request only.
//!
//! # Invariants
//! - Paths are compared as `/`-separated strings relative to the depot.
//! - Auditing never touches the file system beyond listing the folder.

use crate::agent::document::ReqDocument;
use crate::config::CoreConfig;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

static MARKDOWN_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[.*?\]\((.*?)\)").expect("valid link regex"));

/// Link targets in `markdown`, in order of appearance.
pub fn find_resources_in_markdown(markdown: &str) -> Vec<String> {
    MARKDOWN_LINK_RE
        .captures_iter(markdown)
        .filter_map(|caps| caps.get(1))
        .map(|target| target.as_str().to_string())
        .collect()
}

/// Audit outcome for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    /// Referenced and present.
    Ok,
    /// Referenced but missing from the attachment folder.
    Invalid,
    /// Present but referenced by no node.
    NoReference,
}

/// One audit row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    /// Referencing node; `None` for unreferenced attachments.
    pub req_uuid: Option<String>,
    pub resource: String,
    pub status: ResourceStatus,
}

/// Audits one depot's attachment folder against a document.
#[derive(Debug, Clone)]
pub struct ResourceManager {
    base_dir: PathBuf,
    attachment_dir: PathBuf,
}

impl ResourceManager {
    pub fn new(base_dir: impl Into<PathBuf>, attachment_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            attachment_dir: attachment_dir.into(),
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(&config.depot_dir, config.attachment_dir())
    }

    pub fn attachment_dir(&self) -> &Path {
        &self.attachment_dir
    }

    /// `(uuid, targets)` for every node whose content links something, in
    /// document order.
    pub fn references(&self, document: &ReqDocument) -> Vec<(String, Vec<String>)> {
        document.map(
            |_, node, found: &mut Vec<(String, Vec<String>)>| {
                let targets = find_resources_in_markdown(node.content());
                if !targets.is_empty() {
                    found.push((node.uuid().to_string(), targets));
                }
            },
            Vec::new(),
        )
    }

    /// Files directly inside the attachment folder, normalized and sorted.
    ///
    /// A missing folder holds no files.
    pub fn attachment_files(&self) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(&self.attachment_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() {
                files.push(self.normalize_path(&path));
            }
        }
        files.sort();
        Ok(files)
    }

    /// Full audit: referenced resources first, then unreferenced files.
    pub fn audit(&self, document: &ReqDocument) -> io::Result<Vec<ResourceEntry>> {
        let present: BTreeSet<String> = self.attachment_files()?.into_iter().collect();
        let mut referenced = BTreeSet::new();
        let mut entries = Vec::new();

        for (uuid, targets) in self.references(document) {
            for target in targets {
                let normalized = normalize_reference(&target);
                let status = if present.contains(&normalized) {
                    ResourceStatus::Ok
                } else {
                    ResourceStatus::Invalid
                };
                referenced.insert(normalized);
                entries.push(ResourceEntry {
                    req_uuid: Some(uuid.clone()),
                    resource: target,
                    status,
                });
            }
        }
        entries.extend(
            present
                .iter()
                .filter(|file| !referenced.contains(*file))
                .map(|file| ResourceEntry {
                    req_uuid: None,
                    resource: file.clone(),
                    status: ResourceStatus::NoReference,
                }),
        );
        Ok(entries)
    }

    /// Attachment files no node references.
    pub fn unreferenced(&self, document: &ReqDocument) -> io::Result<Vec<PathBuf>> {
        Ok(self
            .audit(document)?
            .into_iter()
            .filter(|entry| entry.status == ResourceStatus::NoReference)
            .map(|entry| self.base_dir.join(entry.resource))
            .collect())
    }

    /// Deletes every unreferenced attachment. Returns the deleted paths.
    pub fn remove_unreferenced(&self, document: &ReqDocument) -> io::Result<Vec<PathBuf>> {
        let doomed = self.unreferenced(document)?;
        for path in &doomed {
            if let Err(err) = fs::remove_file(path) {
                warn!(
                    "event=resource_clear module=plugin status=error path={} error={}",
                    path.display(),
                    err
                );
                return Err(err);
            }
        }
        info!(
            "event=resource_clear module=plugin status=ok removed={}",
            doomed.len()
        );
        Ok(doomed)
    }

    fn normalize_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.base_dir).unwrap_or(path);
        normalize_reference(&relative.to_string_lossy())
    }
}

fn normalize_reference(target: &str) -> String {
    let unified = target.trim().replace('\\', "/");
    unified
        .strip_prefix("./")
        .map(str::to_string)
        .unwrap_or(unified)
}
