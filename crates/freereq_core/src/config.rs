//! Core configuration.
//!
//! # Responsibility
//! - Describe depot location, document suffix, save policy, backup retention
//!   and logging settings in one serde model.
//! - Load settings from a JSON file, falling back to defaults per field.
//!
//! # Invariants
//! - A missing config file yields `CoreConfig::default()`.
//! - Relative paths are resolved against the config file's directory.
//! - `backup_limit` is at least 1.

use crate::agent::json_file::DEFAULT_DOCUMENT_SUFFIX;
use crate::agent::SavePolicy;
use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Default number of backup copies kept per document.
pub const DEFAULT_BACKUP_LIMIT: usize = 30;

/// Errors from configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Parse { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Invalid(message) => write!(f, "invalid configuration: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}

/// Settings shared by the agent, plugins and logging bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Directory holding requirement documents.
    pub depot_dir: PathBuf,
    /// File suffix identifying documents in the depot.
    pub file_suffix: String,
    /// When reported edits reach disk.
    pub save_policy: SavePolicy,
    /// Backup copies kept per document by the history plugin.
    pub backup_limit: usize,
    /// `trace|debug|info|warn|error`.
    pub log_level: String,
    /// Log directory; logging stays off when unset.
    pub log_dir: Option<PathBuf>,
    /// Folder holding markdown attachments; defaults to `<depot>/attachment`.
    pub attachment_dir: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            depot_dir: PathBuf::from("."),
            file_suffix: DEFAULT_DOCUMENT_SUFFIX.to_string(),
            save_policy: SavePolicy::default(),
            backup_limit: DEFAULT_BACKUP_LIMIT,
            log_level: default_log_level().to_string(),
            log_dir: None,
            attachment_dir: None,
        }
    }
}

impl CoreConfig {
    /// Loads configuration from `path`.
    ///
    /// # Errors
    /// - `Io` when the file exists but cannot be read.
    /// - `Parse` when the file is not a valid config object.
    /// - `Invalid` when a value is out of range.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(config.resolved_against(base))
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backup_limit == 0 {
            return Err(ConfigError::Invalid(
                "backup_limit must be at least 1".to_string(),
            ));
        }
        if self.file_suffix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "file_suffix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Attachment folder, defaulting to `<depot>/attachment`.
    pub fn attachment_dir(&self) -> PathBuf {
        self.attachment_dir
            .clone()
            .unwrap_or_else(|| self.depot_dir.join("attachment"))
    }

    fn resolved_against(mut self, base: &Path) -> Self {
        let resolve = |value: PathBuf| {
            if value.is_relative() {
                base.join(value)
            } else {
                value
            }
        };
        self.depot_dir = resolve(self.depot_dir);
        self.attachment_dir = self.attachment_dir.map(resolve);
        self.log_dir = self.log_dir.map(resolve);
        self
    }
}
