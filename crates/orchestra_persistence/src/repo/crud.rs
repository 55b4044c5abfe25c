//! Generic CRUD contract shared by every persisted entity kind.
//!
//! # Responsibility
//! - Describe each entity's table layout once (`Record`).
//! - Implement save/insert/update/delete/list/find_by/get_all_by once (`Crud`).
//! - Scope every operation to one session and one transaction.
//!
//! # Invariants
//! - Every call acquires its own session and releases it before returning.
//! - Column and filter names in SQL always come from `Record::COLUMNS`, never
//!   from caller strings.
//! - `update`, `list`, `find_by` and `get_all_by` always surface errors;
//!   `save`, `insert` and `delete` follow the engine's `ErrorPolicy`.
//! - Reads return rows in insertion (`rowid`) order.

use crate::db::{DbError, Engine, ErrorPolicy};
use crate::model::field::{FieldMap, FieldTypeError, FieldValue};
use log::{debug, error, warn};
use rusqlite::{params_from_iter, ErrorCode, Row, Transaction};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for entity persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// No session could be bound from the engine; the action never ran.
    Misconfigured(DbError),
    /// Storage failure other than a constraint violation.
    Db(DbError),
    /// Unique key or node -> context reference violated.
    Constraint(String),
    /// `update` could not re-fetch the row it just wrote.
    NotFound { table: &'static str, key: String },
    /// Filter names a field the entity does not declare.
    UnknownField { table: &'static str, field: String },
    InvalidField(FieldTypeError),
    /// Context description does not serialize to the expected mapping.
    InvalidDescription(serde_json::Error),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Misconfigured(err) => write!(f, "storage engine misconfigured: {err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Constraint(message) => write!(f, "constraint violation: {message}"),
            Self::NotFound { table, key } => write!(f, "{table} not found: {key}"),
            Self::UnknownField { table, field } => {
                write!(f, "{table} has no field `{field}`")
            }
            Self::InvalidField(err) => write!(f, "{err}"),
            Self::InvalidDescription(err) => write!(f, "invalid context description: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Misconfigured(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::InvalidField(err) => Some(err),
            Self::InvalidDescription(err) => Some(err),
            Self::Constraint(_) => None,
            Self::NotFound { .. } => None,
            Self::UnknownField { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => err.into(),
            other => Self::Db(other),
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, message) = &value {
            if failure.code == ErrorCode::ConstraintViolation {
                return Self::Constraint(message.clone().unwrap_or_else(|| failure.to_string()));
            }
        }
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<FieldTypeError> for RepoError {
    fn from(value: FieldTypeError) -> Self {
        Self::InvalidField(value)
    }
}

/// Schema descriptor of one persisted entity kind.
pub trait Record: Clone {
    const TABLE: &'static str;
    /// Column names in storage order, key column included.
    const COLUMNS: &'static [&'static str];
    const KEY_COLUMN: &'static str = "name";
    /// Column that must match before `save` overwrites an existing row.
    const OWNER_COLUMN: Option<&'static str> = None;

    /// Current value of the key column.
    fn key(&self) -> &str;

    /// Column values in `COLUMNS` order.
    fn values(&self) -> Vec<FieldValue>;

    /// Overwrites one declared field.
    ///
    /// Returns `Ok(false)` when `field` is not declared by this entity.
    fn assign(&mut self, field: &str, value: FieldValue) -> RepoResult<bool>;

    fn from_row(row: &Row<'_>) -> RepoResult<Self>;
}

/// Persistence operations shared by every [`Record`].
pub trait Crud: Record {
    /// Upserts the current state under the key column.
    ///
    /// A row held by a different `OWNER_COLUMN` value is left untouched and
    /// reported as [`RepoError::Constraint`].
    fn save(&self, engine: &Engine) -> RepoResult<()> {
        let started_at = Instant::now();
        let result = with_session(engine, true, |tx| {
            let changed = tx.execute(&upsert_sql::<Self>(), params_from_iter(self.values()))?;
            if changed == 0 {
                return Err(RepoError::Constraint(format!(
                    "UNIQUE constraint failed: {}.{} is owned by another {}",
                    Self::TABLE,
                    Self::KEY_COLUMN,
                    Self::OWNER_COLUMN.unwrap_or("row")
                )));
            }
            Ok(())
        });
        apply_policy::<Self>(engine, "save", self.key(), started_at, result)
    }

    /// Inserts a new row; an existing key is a constraint violation.
    fn insert(&self, engine: &Engine) -> RepoResult<()> {
        let started_at = Instant::now();
        let result = with_session(engine, true, |tx| {
            tx.execute(&insert_sql::<Self>(), params_from_iter(self.values()))?;
            Ok(())
        });
        apply_policy::<Self>(engine, "insert", self.key(), started_at, result)
    }

    /// Deletes the row stored under this entity's key.
    ///
    /// Nothing else is deleted as a side effect.
    fn delete(&self, engine: &Engine) -> RepoResult<()> {
        let started_at = Instant::now();
        let result = with_session(engine, true, |tx| {
            let changed = tx.execute(&delete_sql::<Self>(), [self.key()])?;
            if changed == 0 {
                return Err(RepoError::NotFound {
                    table: Self::TABLE,
                    key: self.key().to_string(),
                });
            }
            Ok(())
        });
        apply_policy::<Self>(engine, "delete", self.key(), started_at, result)
    }

    /// Applies declared fields from `values`, persists, and returns the
    /// stored row.
    ///
    /// # Contract
    /// - Unknown field names are ignored.
    /// - The row is written under the key held before this call, so a `name`
    ///   change renames the row; a missing row is inserted.
    /// - Errors always propagate, whatever the engine's `ErrorPolicy`.
    /// - `self` only changes once the write has succeeded.
    fn update(&mut self, engine: &Engine, values: &FieldMap) -> RepoResult<Self> {
        let started_at = Instant::now();
        let previous_key = self.key().to_string();
        let result = update_record(engine, self, &previous_key, values);
        log_outcome::<Self, _, _>("update", &previous_key, started_at, &result);
        result
    }

    /// Returns every row of this entity kind.
    fn list(engine: &Engine) -> RepoResult<Vec<Self>> {
        Self::get_all_by(engine, &[])
    }

    /// Returns the first row whose fields equal every filter pair.
    fn find_by(engine: &Engine, filter: &[(&str, FieldValue)]) -> RepoResult<Option<Self>> {
        let sql = format!("{} LIMIT 1", select_sql::<Self>(filter)?);
        let mut rows = query_rows::<Self>(engine, &sql, filter)?;
        Ok(rows.pop())
    }

    /// Returns every row whose fields equal every filter pair.
    ///
    /// An empty filter matches all rows; no match yields an empty vec.
    fn get_all_by(engine: &Engine, filter: &[(&str, FieldValue)]) -> RepoResult<Vec<Self>> {
        let sql = select_sql::<Self>(filter)?;
        query_rows::<Self>(engine, &sql, filter)
    }
}

/// Runs `action` inside one freshly acquired session and transaction.
///
/// The transaction commits only when `action` succeeds. The session is
/// released on every path.
pub fn with_session<T>(
    engine: &Engine,
    write: bool,
    action: impl FnOnce(&Transaction<'_>) -> RepoResult<T>,
) -> RepoResult<T> {
    let mut session = engine.session().map_err(RepoError::Misconfigured)?;
    let tx = if write {
        session.write_transaction()?
    } else {
        session.transaction()?
    };
    let output = action(&tx)?;
    tx.commit()?;
    Ok(output)
}

fn update_record<R: Crud>(
    engine: &Engine,
    record: &mut R,
    previous_key: &str,
    values: &FieldMap,
) -> RepoResult<R> {
    let mut staged = record.clone();
    for (field, value) in values {
        if !staged.assign(field, value.clone())? {
            debug!(
                "event=update module=repo status=skip table={} field={}",
                R::TABLE,
                field
            );
        }
    }

    with_session(engine, true, |tx| {
        let mut params = staged.values();
        params.push(FieldValue::from(previous_key));
        let changed = tx.execute(&update_by_key_sql::<R>(), params_from_iter(params))?;
        if changed == 0 {
            tx.execute(&insert_sql::<R>(), params_from_iter(staged.values()))?;
        }
        Ok(())
    })?;
    *record = staged;

    R::find_by(engine, &[(R::KEY_COLUMN, FieldValue::from(record.key()))])?.ok_or_else(|| {
        RepoError::NotFound {
            table: R::TABLE,
            key: record.key().to_string(),
        }
    })
}

fn query_rows<R: Record>(
    engine: &Engine,
    sql: &str,
    filter: &[(&str, FieldValue)],
) -> RepoResult<Vec<R>> {
    let started_at = Instant::now();
    let result = with_session(engine, false, |tx| {
        let mut stmt = tx.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(filter.iter().map(|(_, value)| value)))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(R::from_row(row)?);
        }
        Ok(records)
    });

    match &result {
        Ok(records) => debug!(
            "event=query module=repo status=ok table={} filters={} rows={} duration_ms={}",
            R::TABLE,
            filter.len(),
            records.len(),
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=query module=repo status=error table={} duration_ms={} error={}",
            R::TABLE,
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

fn apply_policy<R: Record>(
    engine: &Engine,
    op: &str,
    key: &str,
    started_at: Instant,
    result: RepoResult<()>,
) -> RepoResult<()> {
    match result {
        Err(err @ RepoError::Misconfigured(_)) => {
            log_outcome::<R, _, _>(op, key, started_at, &Err::<(), _>(&err));
            Err(err)
        }
        Err(err) if engine.error_policy() == ErrorPolicy::Lenient => {
            warn!(
                "event={op} module=repo status=swallowed table={} key={key} duration_ms={} error={}",
                R::TABLE,
                started_at.elapsed().as_millis(),
                err
            );
            Ok(())
        }
        other => {
            log_outcome::<R, _, _>(op, key, started_at, &other);
            other
        }
    }
}

fn log_outcome<R: Record, T, E: Display>(
    op: &str,
    key: &str,
    started_at: Instant,
    result: &Result<T, E>,
) {
    match result {
        Ok(_) => debug!(
            "event={op} module=repo status=ok table={} key={key} duration_ms={}",
            R::TABLE,
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event={op} module=repo status=error table={} key={key} duration_ms={} error={}",
            R::TABLE,
            started_at.elapsed().as_millis(),
            err
        ),
    }
}

fn insert_sql<R: Record>() -> String {
    let placeholders = (1..=R::COLUMNS.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        R::TABLE,
        R::COLUMNS.join(", ")
    )
}

fn upsert_sql<R: Record>() -> String {
    let assignments = R::COLUMNS
        .iter()
        .filter(|column| **column != R::KEY_COLUMN)
        .map(|column| format!("{column} = excluded.{column}"))
        .collect::<Vec<_>>()
        .join(", ");
    let guard = R::OWNER_COLUMN
        .map(|owner| format!(" WHERE {0}.{owner} IS excluded.{owner}", R::TABLE))
        .unwrap_or_default();
    format!(
        "{} ON CONFLICT({}) DO UPDATE SET {assignments}{guard}",
        insert_sql::<R>(),
        R::KEY_COLUMN
    )
}

fn update_by_key_sql<R: Record>() -> String {
    let assignments = R::COLUMNS
        .iter()
        .enumerate()
        .map(|(index, column)| format!("{column} = ?{}", index + 1))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE {} SET {assignments} WHERE {} = ?{}",
        R::TABLE,
        R::KEY_COLUMN,
        R::COLUMNS.len() + 1
    )
}

fn delete_sql<R: Record>() -> String {
    format!("DELETE FROM {} WHERE {} = ?1", R::TABLE, R::KEY_COLUMN)
}

fn select_sql<R: Record>(filter: &[(&str, FieldValue)]) -> RepoResult<String> {
    let mut sql = format!("SELECT {} FROM {}", R::COLUMNS.join(", "), R::TABLE);

    for (index, (field, _)) in filter.iter().enumerate() {
        let column = R::COLUMNS
            .iter()
            .find(|column| **column == *field)
            .ok_or_else(|| RepoError::UnknownField {
                table: R::TABLE,
                field: (*field).to_string(),
            })?;
        let joiner = if index == 0 { " WHERE" } else { " AND" };
        sql.push_str(&format!("{joiner} {column} IS ?{}", index + 1));
    }

    sql.push_str(" ORDER BY rowid ASC");
    Ok(sql)
}
