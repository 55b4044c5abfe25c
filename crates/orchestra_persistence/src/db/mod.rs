//! SQLite storage engine handle and schema lifecycle entry points.
//!
//! # Responsibility
//! - Describe where the backing database lives and how sessions are configured.
//! - Hand out one fresh session per data-access call.
//! - Apply and revert the persistence schema in deterministic order.
//!
//! # Invariants
//! - Schema revision is tracked via `PRAGMA user_version`.
//! - Sessions are only handed out once the schema is at the latest revision.
//! - The engine is never mutated by data-access calls.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod engine;
pub mod migrations;

pub use engine::{
    open_engine, open_engine_in_memory, Engine, EngineConfig, ErrorPolicy, Session,
    StorageLocation,
};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// Database is reachable but its schema is not at the revision this
    /// binary expects.
    SchemaNotApplied {
        expected_version: u32,
        actual_version: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::SchemaNotApplied {
                expected_version,
                actual_version,
            } => write!(
                f,
                "engine requires schema version {expected_version}, got {actual_version}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
            Self::SchemaNotApplied { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
