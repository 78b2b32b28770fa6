//! View-model adapters.
//!
//! The desktop tree widget itself is not part of this crate; `item_model`
//! carries the addressing and change-notification contract such a widget
//! consumes.

pub mod item_model;
