//! Editing use-case services.
//!
//! # Responsibility
//! - Turn user commands into tree edits, model notifications and agent
//!   reports.
//! - Keep front ends decoupled from storage details.

pub mod session;
