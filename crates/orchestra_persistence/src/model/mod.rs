//! Domain model for orchestration contexts and their nodes.
//!
//! # Responsibility
//! - Define the in-memory shapes of persisted records.
//! - Own the serialization boundary between records and caller mappings.
//!
//! # Invariants
//! - One context owns zero or more nodes, linked by `node.context == context.name`.
//! - Ownership is by reference only; nothing cascades.

pub mod context;
pub mod field;
pub mod node;
