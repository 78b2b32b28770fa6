//! Plugin kernel contracts.
//!
//! Plugins are linked statically and registered in-process; there is no
//! runtime discovery or dynamic loading.

pub mod hook;
pub mod manifest;
pub mod registry;
