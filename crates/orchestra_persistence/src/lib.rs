//! Persistence layer for orchestration contexts and their nodes.
//! Callers own the storage engine; every operation binds its own session.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;

pub use db::{
    open_engine, open_engine_in_memory, DbError, DbResult, Engine, EngineConfig, ErrorPolicy,
    StorageLocation,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::context::{AssembledContext, Context, ContextSpec};
pub use model::field::{FieldMap, FieldTypeError, FieldValue};
pub use model::node::{Node, NodeSpec};
pub use repo::crud::{with_session, Crud, Record, RepoError, RepoResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
