//! In-process plugin registry.
//!
//! # Responsibility
//! - Validate and register statically linked plugins.
//! - Index plugins by declared capability.
//! - Run each plugin's `prepare` once against the agent and session.
//!
//! # Invariants
//! - Plugin ids are unique within one registry.
//! - `prepare` runs in registration order and at most once per plugin.
//! - One failing plugin never blocks the others.

use crate::agent::observer::{ObserverSet, ReqObserver};
use crate::config::CoreConfig;
use crate::extension::manifest::{ManifestValidationError, PluginManifest};
use crate::service::session::SessionHooks;
use log::{error, info};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Statically linked plugin.
pub trait ReqPlugin {
    fn manifest(&self) -> &PluginManifest;

    /// Wires the plugin into the agent and session.
    ///
    /// Called at most once. Attachments made before an error stay in place.
    fn prepare(&mut self, context: &mut PluginContext<'_>) -> Result<(), PluginError>;
}

/// Attachment points handed to [`ReqPlugin::prepare`].
pub struct PluginContext<'a> {
    config: &'a CoreConfig,
    observers: &'a mut ObserverSet,
    hooks: &'a mut SessionHooks,
}

impl<'a> PluginContext<'a> {
    pub fn new(
        config: &'a CoreConfig,
        observers: &'a mut ObserverSet,
        hooks: &'a mut SessionHooks,
    ) -> Self {
        Self {
            config,
            observers,
            hooks,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        self.config
    }

    pub fn add_observer(&mut self, observer: Box<dyn ReqObserver>) {
        self.observers.add(observer);
    }

    pub fn hooks(&mut self) -> &mut SessionHooks {
        &mut *self.hooks
    }
}

/// Plugin registration and preparation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    InvalidManifest(ManifestValidationError),
    DuplicatePluginId(String),
    /// Plugin could not wire itself up.
    PrepareFailed { id: String, message: String },
}

impl Display for PluginError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidManifest(err) => write!(f, "invalid plugin manifest: {err}"),
            Self::DuplicatePluginId(id) => write!(f, "plugin id already registered: {id}"),
            Self::PrepareFailed { id, message } => {
                write!(f, "plugin `{id}` failed to prepare: {message}")
            }
        }
    }
}

impl Error for PluginError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidManifest(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ManifestValidationError> for PluginError {
    fn from(value: ManifestValidationError) -> Self {
        Self::InvalidManifest(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrepareState {
    Pending,
    Prepared,
    Failed,
}

struct RegisteredPlugin {
    plugin: Box<dyn ReqPlugin>,
    state: PrepareState,
}

/// Registry of plugins in registration order.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<RegisteredPlugin>,
    positions: BTreeMap<String, usize>,
    capability_index: BTreeMap<String, BTreeSet<String>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.positions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one plugin after manifest validation.
    pub fn register(&mut self, plugin: Box<dyn ReqPlugin>) -> Result<(), PluginError> {
        let manifest = plugin.manifest();
        manifest.validate()?;
        let id = manifest.id.trim().to_string();
        if self.positions.contains_key(&id) {
            return Err(PluginError::DuplicatePluginId(id));
        }

        for capability in &manifest.capabilities {
            self.capability_index
                .entry(capability.trim().to_string())
                .or_default()
                .insert(id.clone());
        }
        info!(
            "event=plugin_register module=extension status=ok plugin_id={} version={}",
            id, manifest.version
        );
        self.positions.insert(id, self.plugins.len());
        self.plugins.push(RegisteredPlugin {
            plugin,
            state: PrepareState::Pending,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn get(&self, plugin_id: &str) -> Option<&PluginManifest> {
        let position = *self.positions.get(plugin_id)?;
        self.plugins
            .get(position)
            .map(|entry| entry.plugin.manifest())
    }

    /// Manifests declaring `capability`, ordered by id.
    pub fn list_by_capability(&self, capability: &str) -> Vec<&PluginManifest> {
        let Some(ids) = self.capability_index.get(capability) else {
            return vec![];
        };
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    /// Prepares every plugin registered since the last call.
    ///
    /// Returns the failures. A failed plugin is not retried, since it may have
    /// attached observers or hooks before failing.
    pub fn prepare_all(&mut self, context: &mut PluginContext<'_>) -> Vec<PluginError> {
        let mut failures = Vec::new();
        for entry in self
            .plugins
            .iter_mut()
            .filter(|entry| entry.state == PrepareState::Pending)
        {
            let id = entry.plugin.manifest().id.clone();
            match entry.plugin.prepare(context) {
                Ok(()) => {
                    entry.state = PrepareState::Prepared;
                    info!(
                        "event=plugin_prepare module=extension status=ok plugin_id={}",
                        id
                    );
                }
                Err(err) => {
                    entry.state = PrepareState::Failed;
                    error!(
                        "event=plugin_prepare module=extension status=error plugin_id={} error={}",
                        id, err
                    );
                    failures.push(err);
                }
            }
        }
        failures
    }
}
