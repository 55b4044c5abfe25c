//! Repository layer: the shared CRUD contract and per-entity persistence.
//!
//! # Responsibility
//! - Define the generic data-access contract once.
//! - Keep SQL details out of the domain model.
//!
//! # Invariants
//! - Every operation is scoped to one session bound from the caller's engine.
//! - Lookups report absence as `None` / empty vec, never as an error.

pub mod context_repo;
pub mod crud;
pub mod node_repo;
