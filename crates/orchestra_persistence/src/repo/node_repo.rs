//! Node persistence: table descriptor and construction under a context.
//!
//! # Invariants
//! - Node names are unique across all contexts.
//! - The node -> context reference is checked by the store when the row is
//!   written; nothing here re-validates it.

use crate::db::Engine;
use crate::model::context::Context;
use crate::model::field::FieldValue;
use crate::model::node::{Node, NodeSpec};
use crate::repo::crud::{Crud, Record, RepoError, RepoResult};
use rusqlite::Row;

impl Record for Node {
    const TABLE: &'static str = "node";
    const COLUMNS: &'static [&'static str] = &[
        "context",
        "name",
        "is_provisioned",
        "properties",
        "attributes",
        "runtime_properties",
    ];
    const OWNER_COLUMN: Option<&'static str> = Some("context");

    fn key(&self) -> &str {
        &self.name
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::from(self.context.clone()),
            FieldValue::from(self.name.as_str()),
            FieldValue::from(self.is_provisioned),
            FieldValue::from(self.properties.clone()),
            FieldValue::from(self.attributes.clone()),
            FieldValue::from(self.runtime_properties.clone()),
        ]
    }

    fn assign(&mut self, field: &str, value: FieldValue) -> RepoResult<bool> {
        match field {
            "context" => self.context = value.into_optional_text(field)?,
            "name" => self.name = value.into_text(field)?,
            "is_provisioned" => self.is_provisioned = value.into_bool(field)?,
            "properties" => self.properties = value.into_optional_text(field)?,
            "attributes" => self.attributes = value.into_optional_text(field)?,
            "runtime_properties" => self.runtime_properties = value.into_optional_text(field)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        let is_provisioned = match row.get::<_, i64>("is_provisioned")? {
            0 => false,
            1 => true,
            other => {
                return Err(RepoError::InvalidData(format!(
                    "invalid is_provisioned value `{other}` in node.is_provisioned"
                )));
            }
        };

        Ok(Self {
            context: row.get("context")?,
            name: row.get("name")?,
            is_provisioned,
            properties: row.get("properties")?,
            attributes: row.get("attributes")?,
            runtime_properties: row.get("runtime_properties")?,
        })
    }
}

impl Crud for Node {}

impl Node {
    /// Persists one node row owned by `context`.
    pub fn create(engine: &Engine, context: &Context, spec: &NodeSpec) -> RepoResult<Self> {
        let node = Self::from_spec(&context.name, spec);
        node.insert(engine)?;
        Ok(node)
    }
}
