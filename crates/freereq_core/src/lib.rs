//! Core domain logic for FreeReq.
//! This crate is the single source of truth for requirement tree invariants.

pub mod agent;
pub mod config;
pub mod extension;
pub mod logging;
pub mod model;
pub mod plugin;
pub mod service;
pub mod view;

pub use agent::document::{ReqDocument, ReqMeta};
pub use agent::json_file::JsonFileAgent;
pub use agent::observer::{ObserverSet, ReqObserver};
pub use agent::{AgentError, AgentResult, ReqAgent, SavePolicy};
pub use config::{ConfigError, CoreConfig};
pub use extension::hook::{HookId, Hookable};
pub use extension::manifest::{ManifestValidationError, PluginManifest};
pub use extension::registry::{PluginContext, PluginError, PluginRegistry, ReqPlugin};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status, LoggingError};
pub use model::node::{AttributeError, ReqNode};
pub use model::tree::{NodeId, ReqTree, TreeError, TreeResult};
pub use plugin::register_builtin_plugins;
pub use service::session::{ReqSession, SessionError, SessionHooks, SessionResult};
pub use view::item_model::{ItemRole, ModelIndex, ModelObserver, ReqModel};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
