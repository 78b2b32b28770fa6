//! Plugin manifest declaration and validation.

use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Plugin registers document observers on the agent.
pub const CAPABILITY_REQ_OBSERVER: &str = "req_observer";
/// Plugin registers session hooks (`document_loaded`, `selection_changed`).
pub const CAPABILITY_SESSION_HOOK: &str = "session_hook";
/// Plugin builds a derived index over the active document.
pub const CAPABILITY_INDEXER: &str = "indexer";

const SUPPORTED_CAPABILITIES: &[&str] = &[
    CAPABILITY_REQ_OBSERVER,
    CAPABILITY_SESSION_HOOK,
    CAPABILITY_INDEXER,
];

pub fn supported_capabilities() -> &'static [&'static str] {
    SUPPORTED_CAPABILITIES
}

/// Declarative plugin manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginManifest {
    /// Stable plugin identifier, e.g. `builtin.req_history`.
    pub id: String,
    /// Dotted numeric version with 3 or 4 parts (`1.0.0` or `1.0.0.0`).
    pub version: String,
    /// Free-form search tags.
    pub tags: Vec<String>,
    /// Declared capabilities. May be empty.
    pub capabilities: Vec<String>,
}

impl PluginManifest {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            tags: Vec::new(),
            capabilities: Vec::new(),
        }
    }

    /// Sets tags from a comma-separated list such as `"testcase, test"`.
    pub fn with_tags(mut self, tags: &str) -> Self {
        self.tags = tags
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect();
        self
    }

    pub fn with_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.capabilities = capabilities.iter().map(|value| value.to_string()).collect();
        self
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|value| value.trim() == capability)
    }

    /// Validates declaration-level manifest invariants.
    pub fn validate(&self) -> Result<(), ManifestValidationError> {
        let id = self.id.trim();
        if id.is_empty() {
            return Err(ManifestValidationError::EmptyId);
        }
        if !is_valid_plugin_id(id) {
            return Err(ManifestValidationError::InvalidId(self.id.clone()));
        }

        let version = self.version.trim();
        if version.is_empty() {
            return Err(ManifestValidationError::EmptyVersion);
        }
        if !is_dotted_version(version) {
            return Err(ManifestValidationError::InvalidVersion(self.version.clone()));
        }

        let mut seen = BTreeSet::<&str>::new();
        for capability in &self.capabilities {
            let normalized = capability.trim();
            if normalized.is_empty() {
                return Err(ManifestValidationError::EmptyCapability);
            }
            if !supported_capabilities().contains(&normalized) {
                return Err(ManifestValidationError::UnsupportedCapability(
                    normalized.to_string(),
                ));
            }
            if !seen.insert(normalized) {
                return Err(ManifestValidationError::DuplicateCapability(
                    normalized.to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn is_valid_plugin_id(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
        return false;
    }

    let mut prev_separator = false;
    for c in chars {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            prev_separator = false;
        } else if matches!(c, '.' | '_' | '-') && !prev_separator {
            prev_separator = true;
        } else {
            return false;
        }
    }
    !prev_separator
}

fn is_dotted_version(value: &str) -> bool {
    let parts: Vec<&str> = value.split('.').collect();
    (3..=4).contains(&parts.len())
        && parts
            .iter()
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

/// Manifest validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestValidationError {
    EmptyId,
    InvalidId(String),
    EmptyVersion,
    InvalidVersion(String),
    EmptyCapability,
    UnsupportedCapability(String),
    DuplicateCapability(String),
}

impl Display for ManifestValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "manifest id must not be empty"),
            Self::InvalidId(value) => write!(f, "manifest id is invalid: {value}"),
            Self::EmptyVersion => write!(f, "manifest version must not be empty"),
            Self::InvalidVersion(value) => write!(
                f,
                "manifest version is invalid: {value} (expected 3 or 4 numeric parts)"
            ),
            Self::EmptyCapability => write!(f, "manifest contains empty capability value"),
            Self::UnsupportedCapability(value) => {
                write!(f, "manifest capability is unsupported: {value}")
            }
            Self::DuplicateCapability(value) => {
                write!(f, "manifest capability is duplicated: {value}")
            }
        }
    }
}

impl Error for ManifestValidationError {}

#[cfg(test)]
mod tests {
    use super::{
        ManifestValidationError, PluginManifest, CAPABILITY_REQ_OBSERVER, CAPABILITY_SESSION_HOOK,
    };

    fn valid_manifest() -> PluginManifest {
        PluginManifest::new("builtin.testcase_link", "1.0.0.0")
            .with_tags("testcase, test")
            .with_capabilities(&[CAPABILITY_SESSION_HOOK])
    }

    #[test]
    fn validates_baseline_manifest() {
        let manifest = valid_manifest();
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.tags, vec!["testcase", "test"]);
        assert!(manifest.has_capability(CAPABILITY_SESSION_HOOK));
    }

    #[test]
    fn accepts_empty_capabilities_and_three_part_versions() {
        let manifest = PluginManifest::new("builtin.quiet", "0.1.0");
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn rejects_duplicate_capabilities() {
        let mut manifest = valid_manifest();
        manifest.capabilities.push(format!(" {CAPABILITY_SESSION_HOOK}"));
        let err = manifest.validate().unwrap_err();
        assert_eq!(
            err,
            ManifestValidationError::DuplicateCapability(CAPABILITY_SESSION_HOOK.to_string())
        );
    }

    #[test]
    fn rejects_unsupported_capabilities() {
        let mut manifest = valid_manifest();
        manifest.capabilities.push("dynamic_import".to_string());
        let err = manifest.validate().unwrap_err();
        assert_eq!(
            err,
            ManifestValidationError::UnsupportedCapability("dynamic_import".to_string())
        );
    }

    #[test]
    fn rejects_invalid_id_format() {
        for id in ["ReqHistory", "builtin..history", "builtin.", "-lead"] {
            let manifest = PluginManifest::new(id, "1.0.0")
                .with_capabilities(&[CAPABILITY_REQ_OBSERVER]);
            assert!(
                matches!(manifest.validate(), Err(ManifestValidationError::InvalidId(_))),
                "{id}"
            );
        }
    }

    #[test]
    fn rejects_invalid_version_format() {
        for version in ["v1", "1.0", "1.0.0.0.0", "1..0"] {
            let mut manifest = valid_manifest();
            manifest.version = version.to_string();
            assert!(
                matches!(
                    manifest.validate(),
                    Err(ManifestValidationError::InvalidVersion(_))
                ),
                "{version}"
            );
        }
    }
}
