//! Links requirement ids to test case files by file name.
//!
//! # Responsibility
//! - Build `<prefix>\d{5}` patterns from the document's `id_prefix` meta.
//! - Scan `<depot>/Testcase` recursively and map ids found in file names to
//!   file paths.
//! - Track the id of the selected node as the active filter.
//!
//! # Invariants
//! - A rescan replaces the whole mapping.
//! - Paths under one id are unique and in walk order.

use crate::agent::document::ReqDocument;
use crate::extension::manifest::{PluginManifest, CAPABILITY_INDEXER, CAPABILITY_SESSION_HOOK};
use crate::extension::registry::{PluginContext, PluginError, ReqPlugin};
use crate::model::node::ReqNode;
use log::{error, info};
use regex::Regex;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use walkdir::WalkDir;

/// Folder next to the documents holding test case files.
pub const TESTCASE_DIR_NAME: &str = "Testcase";
/// Number of digits following an id prefix.
pub const ID_DIGITS: usize = 5;

/// File-name scanner mapping requirement ids to files.
#[derive(Debug, Default)]
pub struct TestcaseScanner {
    patterns: Vec<Regex>,
    mapping: BTreeMap<String, Vec<PathBuf>>,
    file_count: usize,
}

impl TestcaseScanner {
    /// Compiles one pattern per non-blank prefix.
    pub fn new(prefixes: &[String]) -> Result<Self, regex::Error> {
        let patterns = prefixes
            .iter()
            .map(|prefix| prefix.trim())
            .filter(|prefix| !prefix.is_empty())
            .map(|prefix| Regex::new(&format!(r"{}\d{{{ID_DIGITS}}}", regex::escape(prefix))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            ..Self::default()
        })
    }

    /// Walks `root` and rebuilds the mapping. Returns the number of files seen.
    pub fn scan(&mut self, root: &Path) -> usize {
        let mut mapping: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        let mut file_count = 0;

        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            file_count += 1;
            let Some(file_name) = entry.file_name().to_str() else {
                continue;
            };
            for pattern in &self.patterns {
                for found in pattern.find_iter(file_name) {
                    let files = mapping.entry(found.as_str().to_string()).or_default();
                    if !files.iter().any(|path| path == entry.path()) {
                        files.push(entry.path().to_path_buf());
                    }
                }
            }
        }

        self.mapping = mapping;
        self.file_count = file_count;
        file_count
    }

    pub fn files_for(&self, req_id: &str) -> &[PathBuf] {
        self.mapping.get(req_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn mapping(&self) -> &BTreeMap<String, Vec<PathBuf>> {
        &self.mapping
    }

    /// Files seen by the last scan, linked or not.
    pub fn testcase_count(&self) -> usize {
        self.file_count
    }
}

#[derive(Debug, Default)]
struct LinkState {
    scanner: TestcaseScanner,
    filter: String,
}

/// Read handle on the plugin's current scan and filter.
#[derive(Debug, Clone, Default)]
pub struct TestcaseLinks {
    state: Rc<RefCell<LinkState>>,
}

impl TestcaseLinks {
    /// Rescans for `document` with patterns from its meta.
    pub fn rescan(&self, document: &ReqDocument) {
        let prefixes = document.id_prefixes();
        let scanner = match TestcaseScanner::new(&prefixes) {
            Ok(scanner) => scanner,
            Err(err) => {
                error!(
                    "event=testcase_scan module=plugin status=error error_code=invalid_pattern error={}",
                    err
                );
                return;
            }
        };

        let mut state = self.state.borrow_mut();
        state.scanner = scanner;
        let root = document
            .path()
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(TESTCASE_DIR_NAME);
        if root.is_dir() {
            let files = state.scanner.scan(&root);
            info!(
                "event=testcase_scan module=plugin status=ok files={} linked_ids={}",
                files,
                state.scanner.mapping().len()
            );
        }
    }

    pub fn set_filter(&self, req_id: &str) {
        self.state.borrow_mut().filter = req_id.to_string();
    }

    pub fn filter(&self) -> String {
        self.state.borrow().filter.clone()
    }

    /// Files linked to the current filter id.
    pub fn linked_files(&self) -> Vec<PathBuf> {
        let state = self.state.borrow();
        state.scanner.files_for(&state.filter).to_vec()
    }

    pub fn files_for(&self, req_id: &str) -> Vec<PathBuf> {
        self.state.borrow().scanner.files_for(req_id).to_vec()
    }

    pub fn testcase_count(&self) -> usize {
        self.state.borrow().scanner.testcase_count()
    }
}

/// Rescans on `document_loaded`; follows `selection_changed`.
#[derive(Debug)]
pub struct TestcaseLinkPlugin {
    manifest: PluginManifest,
    links: TestcaseLinks,
}

impl Default for TestcaseLinkPlugin {
    fn default() -> Self {
        Self {
            manifest: PluginManifest::new("builtin.testcase_link", "1.0.0.0")
                .with_tags("testcase, test")
                .with_capabilities(&[CAPABILITY_SESSION_HOOK, CAPABILITY_INDEXER]),
            links: TestcaseLinks::default(),
        }
    }
}

impl TestcaseLinkPlugin {
    pub fn links(&self) -> TestcaseLinks {
        self.links.clone()
    }
}

impl ReqPlugin for TestcaseLinkPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn prepare(&mut self, context: &mut PluginContext<'_>) -> Result<(), PluginError> {
        let hooks = context.hooks();

        let on_loaded = self.links.clone();
        hooks
            .document_loaded
            .add_post_hook(move |document: &ReqDocument, _| on_loaded.rescan(document));

        let on_selected = self.links.clone();
        hooks
            .selection_changed
            .add_post_hook(move |node: &ReqNode, _| on_selected.set_filter(node.id()));
        Ok(())
    }
}
