//! Schema revision registry, upgrade and downgrade.
//!
//! # Responsibility
//! - Register schema revisions in strictly increasing order.
//! - Apply pending revisions, or revert applied ones, atomically.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Upgrade creates `context` before `node`; downgrade drops `node` before
//!   `context`. Reversing either order breaks the node -> context reference.
//! - Applied revision is mirrored to `PRAGMA user_version`.

use super::engine::user_version;
use crate::db::{DbError, DbResult, Engine};
use log::{error, info};
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    up: &'static str,
    down: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    up: include_str!("0001_orchestra_persistence.sql"),
    down: include_str!("0001_orchestra_persistence.down.sql"),
}];

/// Returns the latest schema revision known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Returns the schema revision currently applied to the engine's database.
pub fn current_version(engine: &Engine) -> DbResult<u32> {
    let session = engine.raw_session()?;
    user_version(session.connection())
}

/// Applies all pending revisions in one transaction.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the database is newer than this binary.
pub fn upgrade(engine: &Engine) -> DbResult<()> {
    let started_at = Instant::now();
    let result = apply_upgrade(engine);
    log_outcome("schema_upgrade", started_at, &result);
    result.map(|_| ())
}

/// Reverts every applied revision, newest first, in one transaction.
///
/// Leaves the database at revision 0 with both tables dropped.
pub fn downgrade(engine: &Engine) -> DbResult<()> {
    let started_at = Instant::now();
    let result = apply_downgrade(engine);
    log_outcome("schema_downgrade", started_at, &result);
    result.map(|_| ())
}

fn apply_upgrade(engine: &Engine) -> DbResult<u32> {
    let mut session = engine.raw_session()?;
    let current_version = user_version(session.connection())?;
    let latest = latest_version();

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(latest);
    }

    let tx = session.write_transaction()?;
    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        tx.execute_batch(migration.up)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    Ok(latest)
}

fn apply_downgrade(engine: &Engine) -> DbResult<u32> {
    let mut session = engine.raw_session()?;
    let current_version = user_version(session.connection())?;
    let latest = latest_version();

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    let tx = session.write_transaction()?;
    for migration in MIGRATIONS.iter().rev() {
        if migration.version > current_version {
            continue;
        }

        tx.execute_batch(migration.down)?;
        tx.execute_batch(&format!(
            "PRAGMA user_version = {};",
            migration.version - 1
        ))?;
    }
    tx.commit()?;

    Ok(0)
}

fn log_outcome(event: &str, started_at: Instant, result: &DbResult<u32>) {
    match result {
        Ok(version) => info!(
            "event={event} module=migrations status=ok version={version} duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event={event} module=migrations status=error duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::MIGRATIONS;

    #[test]
    fn versions_are_strictly_increasing() {
        for pair in MIGRATIONS.windows(2) {
            assert!(pair[0].version < pair[1].version);
        }
    }

    #[test]
    fn first_revision_orders_tables_by_dependency() {
        let first = MIGRATIONS[0];

        let up_context = first.up.find("CREATE TABLE context").unwrap();
        let up_node = first.up.find("CREATE TABLE node").unwrap();
        assert!(up_context < up_node);

        let down_node = first.down.find("DROP TABLE node").unwrap();
        let down_context = first.down.find("DROP TABLE context").unwrap();
        assert!(down_node < down_context);
    }
}
