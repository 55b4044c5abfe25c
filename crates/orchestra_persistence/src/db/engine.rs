//! Storage engine handle and per-call session acquisition.
//!
//! # Responsibility
//! - Hold caller-owned storage configuration (location, busy timeout, error policy).
//! - Open one configured SQLite connection per data-access call.
//! - Refuse to hand out sessions against an unmigrated or too-new schema.
//!
//! # Invariants
//! - Sessions are never cached or reused across calls.
//! - Sessions run with `foreign_keys=OFF`; node references are checked by
//!   schema triggers on the write side only.
//! - In-memory engines keep one anchor connection alive for the engine lifetime
//!   and hand out at most one session at a time. Shared-cache connections
//!   report `SQLITE_LOCKED` instead of waiting, so `busy_timeout` cannot
//!   serialize them.

use super::migrations::{latest_version, upgrade};
use super::{DbError, DbResult};
use log::{error, info, warn};
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the backing SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    /// Database file on disk, created on first open.
    File(PathBuf),
    /// Private shared-cache memory database, dropped with the engine.
    Memory,
}

/// Failure propagation policy for `save`, `insert` and `delete`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Write failures are returned to the caller.
    #[default]
    Strict,
    /// Write failures are logged and swallowed; callers must re-query to
    /// learn whether a write landed. Misconfiguration still propagates.
    Lenient,
}

/// Caller-supplied engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub location: StorageLocation,
    pub busy_timeout: Duration,
    pub error_policy: ErrorPolicy,
}

impl EngineConfig {
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            location: StorageLocation::File(path.as_ref().to_path_buf()),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            error_policy: ErrorPolicy::Strict,
        }
    }

    pub fn memory() -> Self {
        Self {
            location: StorageLocation::Memory,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            error_policy: ErrorPolicy::Strict,
        }
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Self {
        self.error_policy = error_policy;
        self
    }
}

#[derive(Debug)]
enum Target {
    File(PathBuf),
    Memory {
        uri: String,
        anchor: Mutex<Connection>,
    },
}

/// Opaque storage engine handle shared by every data-access call.
///
/// The handle is read-only configuration: each operation binds a fresh
/// [`Session`] from it and drops that session before returning.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    target: Target,
}

/// One per-call unit of work bound to an [`Engine`].
///
/// Dropping the session closes its connection; an uncommitted transaction is
/// rolled back by SQLite at that point. Sessions of in-memory engines also
/// hold the engine's anchor lock until dropped.
pub struct Session<'engine> {
    // Declared before the guard so the connection closes first.
    conn: Connection,
    _exclusive: Option<MutexGuard<'engine, Connection>>,
}

impl Session<'_> {
    /// Starts a deferred transaction on this session.
    pub fn transaction(&mut self) -> rusqlite::Result<Transaction<'_>> {
        self.conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
    }

    /// Starts a write-locking transaction on this session.
    pub fn write_transaction(&mut self) -> rusqlite::Result<Transaction<'_>> {
        self.conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Engine {
    /// Opens an engine handle without touching the schema.
    ///
    /// A probe connection is established once so that unreachable storage
    /// fails here rather than on the first data-access call.
    ///
    /// # Side effects
    /// - Creates the database file when it does not exist yet.
    /// - Emits `engine_open` logging events with duration and status.
    pub fn open(config: EngineConfig) -> DbResult<Self> {
        let started_at = Instant::now();
        let mode = location_mode(&config.location);
        info!("event=engine_open module=db status=start mode={mode}");

        let target = match open_target(&config.location) {
            Ok(target) => target,
            Err(err) => {
                error!(
                    "event=engine_open module=db status=error mode={mode} duration_ms={} error_code=engine_open_failed error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err);
            }
        };

        let engine = Self { config, target };
        if let Err(err) = engine.connect().map(drop) {
            error!(
                "event=engine_open module=db status=error mode={mode} duration_ms={} error_code=engine_probe_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err);
        }

        info!(
            "event=engine_open module=db status=ok mode={mode} duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.config.error_policy
    }

    /// Acquires a fresh session for one data-access call.
    ///
    /// # Errors
    /// - `SchemaNotApplied` when the schema is older than [`latest_version`].
    /// - `UnsupportedSchemaVersion` when the schema is newer.
    /// - `Sqlite` when the database cannot be opened or configured.
    pub fn session(&self) -> DbResult<Session<'_>> {
        let session = self.connect()?;
        let actual_version = user_version(&session.conn)?;
        let expected_version = latest_version();

        if actual_version > expected_version {
            warn!(
                "event=session_open module=db status=error error_code=schema_too_new db_version={actual_version}"
            );
            return Err(DbError::UnsupportedSchemaVersion {
                db_version: actual_version,
                latest_supported: expected_version,
            });
        }
        if actual_version != expected_version {
            warn!(
                "event=session_open module=db status=error error_code=schema_not_applied db_version={actual_version}"
            );
            return Err(DbError::SchemaNotApplied {
                expected_version,
                actual_version,
            });
        }

        Ok(session)
    }

    /// Acquires a session without checking the schema revision.
    ///
    /// Only the schema lifecycle may work on an unmigrated database.
    pub(crate) fn raw_session(&self) -> DbResult<Session<'_>> {
        self.connect()
    }

    fn connect(&self) -> DbResult<Session<'_>> {
        let (conn, exclusive) = match &self.target {
            Target::File(path) => (Connection::open(path)?, None),
            Target::Memory { uri, anchor } => {
                // The anchor connection itself is never used; a panicking
                // holder cannot leave it in a bad state.
                let guard = anchor.lock().unwrap_or_else(PoisonError::into_inner);
                (Connection::open_with_flags(uri, memory_flags())?, Some(guard))
            }
        };
        conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
        conn.busy_timeout(self.config.busy_timeout)?;
        Ok(Session {
            conn,
            _exclusive: exclusive,
        })
    }
}

/// Opens a file-backed engine and applies all pending schema revisions.
pub fn open_engine(path: impl AsRef<Path>) -> DbResult<Engine> {
    let engine = Engine::open(EngineConfig::file(path))?;
    upgrade(&engine)?;
    Ok(engine)
}

/// Opens a private in-memory engine and applies all pending schema revisions.
pub fn open_engine_in_memory() -> DbResult<Engine> {
    let engine = Engine::open(EngineConfig::memory())?;
    upgrade(&engine)?;
    Ok(engine)
}

pub(crate) fn user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

fn open_target(location: &StorageLocation) -> DbResult<Target> {
    match location {
        StorageLocation::File(path) => Ok(Target::File(path.clone())),
        StorageLocation::Memory => {
            let uri = format!(
                "file:orchestra-{}?mode=memory&cache=shared",
                Uuid::new_v4().simple()
            );
            let anchor = Connection::open_with_flags(&uri, memory_flags())?;
            Ok(Target::Memory {
                uri,
                anchor: Mutex::new(anchor),
            })
        }
    }
}

fn memory_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
}

fn location_mode(location: &StorageLocation) -> &'static str {
    match location {
        StorageLocation::File(_) => "file",
        StorageLocation::Memory => "memory",
    }
}
