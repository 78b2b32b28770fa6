//! First-party plugins.
//!
//! # Responsibility
//! - Provide the bundled plugins and a one-call registration helper.
//!
//! # See also
//! - `extension::registry` for the plugin contract.

pub mod keyword_index;
pub mod req_history;
pub mod resource_manager;
pub mod testcase_link;

use crate::extension::registry::{PluginError, PluginRegistry};
use keyword_index::{KeywordIndexPlugin, SharedKeywordIndex};
use req_history::ReqHistoryPlugin;
use testcase_link::{TestcaseLinkPlugin, TestcaseLinks};

/// Query handles of the bundled plugins that expose state.
#[derive(Debug, Clone)]
pub struct BuiltinHandles {
    pub testcase_links: TestcaseLinks,
    pub keyword_index: SharedKeywordIndex,
}

/// Registers every bundled plugin in a fixed order.
pub fn register_builtin_plugins(
    registry: &mut PluginRegistry,
) -> Result<BuiltinHandles, PluginError> {
    let testcase_link = TestcaseLinkPlugin::default();
    let keyword_index = KeywordIndexPlugin::default();
    let handles = BuiltinHandles {
        testcase_links: testcase_link.links(),
        keyword_index: keyword_index.index(),
    };

    registry.register(Box::new(ReqHistoryPlugin::default()))?;
    registry.register(Box::new(testcase_link))?;
    registry.register(Box::new(keyword_index))?;
    Ok(handles)
}
