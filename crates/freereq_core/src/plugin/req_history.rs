//! Save history: timestamped copies of every saved document.
//!
//! # Invariants
//! - Copies live in `<document dir>/backup/` as `<stem>_<YYYYmmddHHMMSS_mmm><ext>`.
//! - At most `limit` copies per document are kept; the oldest go first.
//! - A failed backup is logged and never fails the save that triggered it.

use crate::agent::observer::ReqObserver;
use crate::extension::manifest::{PluginManifest, CAPABILITY_REQ_OBSERVER};
use crate::extension::registry::{PluginContext, PluginError, ReqPlugin};
use chrono::{DateTime, Local};
use log::{error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

pub const BACKUP_DIR_NAME: &str = "backup";
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S_%3f";

static TIMESTAMP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{14}_\d{3}$").expect("valid backup timestamp regex"));

#[derive(Debug)]
pub enum BackupError {
    /// Source is missing or not a regular file.
    NotAFile(PathBuf),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Display for BackupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAFile(path) => write!(f, "not a local file: {}", path.display()),
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
        }
    }
}

impl Error for BackupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::NotAFile(_) => None,
        }
    }
}

/// Copies `file` into its `backup/` folder and prunes old copies.
///
/// Returns the path of the new copy.
pub fn backup_file(file: &Path, limit: usize) -> Result<PathBuf, BackupError> {
    backup_file_at(file, limit, Local::now())
}

/// [`backup_file`] with an explicit timestamp.
pub fn backup_file_at(
    file: &Path,
    limit: usize,
    now: DateTime<Local>,
) -> Result<PathBuf, BackupError> {
    if !file.is_file() {
        return Err(BackupError::NotAFile(file.to_path_buf()));
    }
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| BackupError::Io { path, source }
    };

    let dir = file.parent().unwrap_or_else(|| Path::new(""));
    let backup_dir = dir.join(BACKUP_DIR_NAME);
    fs::create_dir_all(&backup_dir).map_err(io_error(&backup_dir))?;

    let (stem, ext) = split_name(file);
    let target = backup_dir.join(format!("{stem}_{}{ext}", now.format(TIMESTAMP_FORMAT)));
    fs::copy(file, &target).map_err(io_error(&target))?;

    let mut copies = list_backups(&backup_dir, &stem, &ext).map_err(io_error(&backup_dir))?;
    if copies.len() > limit {
        let excess = copies.len() - limit;
        for stale in copies.drain(..excess) {
            fs::remove_file(&stale).map_err(io_error(&stale))?;
        }
    }
    Ok(target)
}

/// Backup copies of a document, oldest first.
pub fn list_backups(backup_dir: &Path, stem: &str, ext: &str) -> std::io::Result<Vec<PathBuf>> {
    let prefix = format!("{stem}_");
    let mut copies: Vec<PathBuf> = fs::read_dir(backup_dir)?
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter(|entry| {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                return false;
            };
            name.strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_suffix(ext))
                .is_some_and(|stamp| TIMESTAMP_RE.is_match(stamp))
        })
        .map(|entry| entry.path())
        .collect();
    copies.sort();
    Ok(copies)
}

fn split_name(file: &Path) -> (String, String) {
    let stem = file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = file
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    (stem, ext)
}

/// Observer that backs up every saved document.
#[derive(Debug, Clone)]
pub struct BackupObserver {
    limit: usize,
}

impl BackupObserver {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }
}

impl ReqObserver for BackupObserver {
    fn on_req_saved(&mut self, path: &Path) {
        if !path.is_file() {
            warn!(
                "event=backup module=plugin status=skipped reason=not_a_file path={}",
                path.display()
            );
            return;
        }
        match backup_file(path, self.limit) {
            Ok(copy) => info!(
                "event=backup module=plugin status=ok copy={}",
                copy.display()
            ),
            Err(err) => error!(
                "event=backup module=plugin status=error path={} error={}",
                path.display(),
                err
            ),
        }
    }
}

/// Registers a [`BackupObserver`] sized from `backup_limit`.
#[derive(Debug)]
pub struct ReqHistoryPlugin {
    manifest: PluginManifest,
}

impl Default for ReqHistoryPlugin {
    fn default() -> Self {
        Self {
            manifest: PluginManifest::new("builtin.req_history", "1.0.0.0")
                .with_tags("history")
                .with_capabilities(&[CAPABILITY_REQ_OBSERVER]),
        }
    }
}

impl ReqPlugin for ReqHistoryPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn prepare(&mut self, context: &mut PluginContext<'_>) -> Result<(), PluginError> {
        let limit = context.config().backup_limit;
        context.add_observer(Box::new(BackupObserver::new(limit)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{backup_file_at, list_backups, BackupError, BACKUP_DIR_NAME};
    use chrono::{Local, TimeZone};
    use std::fs;

    #[test]
    fn copies_are_named_by_timestamp_and_pruned_oldest_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("Spec.req");
        fs::write(&file, "{}").expect("write document");

        for second in 0..4 {
            let at = Local
                .with_ymd_and_hms(2024, 5, 6, 7, 8, second)
                .single()
                .expect("unambiguous local time");
            backup_file_at(&file, 3, at).expect("backup");
        }

        let backup_dir = dir.path().join(BACKUP_DIR_NAME);
        let copies = list_backups(&backup_dir, "Spec", ".req").expect("list");
        let names: Vec<String> = copies
            .iter()
            .map(|path| path.file_name().expect("name").to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "Spec_20240506070801_000.req",
                "Spec_20240506070802_000.req",
                "Spec_20240506070803_000.req",
            ]
        );
    }

    #[test]
    fn pruning_ignores_other_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backup_dir = dir.path().join(BACKUP_DIR_NAME);
        fs::create_dir_all(&backup_dir).expect("backup dir");
        fs::write(backup_dir.join("Spec_v2_20200101000000_000.req"), "{}").expect("other doc");
        fs::write(backup_dir.join("Spec_notes.txt"), "x").expect("unrelated");

        let file = dir.path().join("Spec.req");
        fs::write(&file, "{}").expect("write document");
        backup_file_at(&file, 1, Local::now()).expect("backup");

        assert!(backup_dir.join("Spec_v2_20200101000000_000.req").exists());
        assert!(backup_dir.join("Spec_notes.txt").exists());
        assert_eq!(list_backups(&backup_dir, "Spec", ".req").expect("list").len(), 1);
    }

    #[test]
    fn missing_source_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = backup_file_at(&dir.path().join("absent.req"), 3, Local::now())
            .expect_err("missing file");
        assert!(matches!(err, BackupError::NotAFile(_)));
    }
}
