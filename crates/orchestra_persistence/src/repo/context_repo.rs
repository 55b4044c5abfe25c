//! Context persistence: table descriptor, batch construction and assembly.
//!
//! # Responsibility
//! - Map `Context` onto the `context` table for the shared CRUD contract.
//! - Construct a context together with its initial nodes.
//! - Reassemble a context with every node that references it.
//!
//! # Invariants
//! - The context row is written before any of its nodes.
//! - Batch construction is not atomic: nodes written before a failure stay.

use crate::db::Engine;
use crate::model::context::{AssembledContext, Context, ContextSpec};
use crate::model::field::FieldValue;
use crate::model::node::Node;
use crate::repo::crud::{Crud, Record, RepoError, RepoResult};
use log::{error, info};
use rusqlite::Row;
use serde::Serialize;
use std::time::Instant;

impl Record for Context {
    const TABLE: &'static str = "context";
    const COLUMNS: &'static [&'static str] = &["name", "status", "template_path", "inputs"];

    fn key(&self) -> &str {
        &self.name
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::from(self.name.as_str()),
            FieldValue::from(self.status.as_str()),
            FieldValue::from(self.template_path.as_str()),
            FieldValue::from(self.inputs.as_str()),
        ]
    }

    fn assign(&mut self, field: &str, value: FieldValue) -> RepoResult<bool> {
        match field {
            "name" => self.name = value.into_text(field)?,
            "status" => self.status = value.into_text(field)?,
            "template_path" => self.template_path = value.into_text(field)?,
            "inputs" => self.inputs = value.into_text(field)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            name: row.get("name")?,
            status: row.get("status")?,
            template_path: row.get("template_path")?,
            inputs: row.get("inputs")?,
        })
    }
}

impl Crud for Context {}

impl Context {
    /// Persists a context and one node per entry of its description.
    ///
    /// `description` must serialize to the [`ContextSpec`] shape. Nodes are
    /// written in description order after the context row.
    ///
    /// # Errors
    /// - `InvalidDescription` when `description` does not fit the shape.
    /// - Write errors from the context or any node, subject to the engine's
    ///   `ErrorPolicy`. Nodes written before the failing one are kept.
    pub fn create<D: Serialize>(description: &D, engine: &Engine) -> RepoResult<Self> {
        let started_at = Instant::now();
        let spec: ContextSpec = serde_json::to_value(description)
            .and_then(serde_json::from_value)
            .map_err(RepoError::InvalidDescription)?;

        let context = Self::from(&spec);
        let result = context.insert(engine).and_then(|()| {
            spec.nodes
                .iter()
                .try_for_each(|node| Node::create(engine, &context, node).map(|_| ()))
        });

        match result {
            Ok(()) => {
                info!(
                    "event=context_create module=repo status=ok context={} nodes={} duration_ms={}",
                    context.name,
                    spec.nodes.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(context)
            }
            Err(err) => {
                error!(
                    "event=context_create module=repo status=error context={} duration_ms={} error={}",
                    context.name,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Looks up one context by name.
    pub fn find(engine: &Engine, name: &str) -> RepoResult<Option<Self>> {
        Self::find_by(engine, &[("name", FieldValue::from(name))])
    }

    /// Returns every node that references this context.
    pub fn nodes(&self, engine: &Engine) -> RepoResult<Vec<Node>> {
        Node::get_all_by(engine, &[("context", FieldValue::from(self.name.as_str()))])
    }

    /// Combines the named context with all of its nodes.
    ///
    /// Returns `Ok(None)` when no context is stored under `name`.
    pub fn assemble(name: &str, engine: &Engine) -> RepoResult<Option<AssembledContext>> {
        let Some(context) = Self::find(engine, name)? else {
            return Ok(None);
        };
        let nodes = context.nodes(engine)?;
        Ok(Some(AssembledContext { context, nodes }))
    }
}
