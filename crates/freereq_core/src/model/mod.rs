//! Requirement document model.
//!
//! # Responsibility
//! - Define the node attribute bag and the arena tree that owns nodes.
//! - Keep structural invariants (ordering, parent/child consistency) in one place.
//!
//! # Invariants
//! - Every node is identified by a uuid that never changes.
//! - Children order is document order.
//!
//! # See also
//! - docs/architecture/document-format.md

pub mod node;
pub mod tree;
