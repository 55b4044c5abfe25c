//! Dynamic field values used by `update` and filter predicates.
//!
//! # Responsibility
//! - Carry caller-supplied values for named entity fields.
//! - Bind those values to SQL parameters without string interpolation.
//!
//! # Invariants
//! - `Bool` binds as SQLite integer `0`/`1`, matching stored `BOOLEAN` columns.
//! - `Null` only matches NULL columns when compared with `IS`.

use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Field name -> new value mapping accepted by `update`.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// One value for a named entity field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Text(String),
}

impl FieldValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Text(_) => "text",
        }
    }

    /// Converts into a required text value for `field`.
    pub fn into_text(self, field: &str) -> Result<String, FieldTypeError> {
        match self {
            Self::Text(value) => Ok(value),
            other => Err(FieldTypeError::new(field, "text", &other)),
        }
    }

    /// Converts into a nullable text value for `field`.
    pub fn into_optional_text(self, field: &str) -> Result<Option<String>, FieldTypeError> {
        match self {
            Self::Text(value) => Ok(Some(value)),
            Self::Null => Ok(None),
            other => Err(FieldTypeError::new(field, "text or null", &other)),
        }
    }

    /// Converts into a required boolean value for `field`.
    pub fn into_bool(self, field: &str) -> Result<bool, FieldTypeError> {
        match self {
            Self::Bool(value) => Ok(value),
            other => Err(FieldTypeError::new(field, "bool", &other)),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(Value::Null),
            Self::Bool(value) => ToSqlOutput::Owned(Value::Integer(i64::from(*value))),
            Self::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
        })
    }
}

/// A known field was given a value of the wrong type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTypeError {
    pub field: String,
    pub expected: &'static str,
    pub found: &'static str,
}

impl FieldTypeError {
    fn new(field: &str, expected: &'static str, found: &FieldValue) -> Self {
        Self {
            field: field.to_string(),
            expected,
            found: found.kind(),
        }
    }
}

impl Display for FieldTypeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "field `{}` expects {}, got {}",
            self.field, self.expected, self.found
        )
    }
}

impl Error for FieldTypeError {}
