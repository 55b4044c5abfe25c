//! Context domain model.
//!
//! # Responsibility
//! - Define the root orchestration record and its caller-facing description.
//! - Produce the plain field mappings exchanged with callers.
//!
//! # Invariants
//! - `name` is the natural identifier and the target of node references.
//! - `inputs` is opaque text; this layer never parses it.

use super::node::{Node, NodeSpec};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Persisted orchestration context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub name: String,
    /// Free-form lifecycle state, e.g. `created` or `deployed`.
    pub status: String,
    pub template_path: String,
    /// Serialized input parameters.
    pub inputs: String,
}

/// Caller-supplied context description used for construction.
///
/// Any value that serializes to this shape can be passed to
/// `Context::create`; `nodes` keeps the order in which node rows are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSpec {
    pub name: String,
    pub status: String,
    pub template_path: String,
    pub inputs: String,
    pub nodes: Vec<NodeSpec>,
}

/// A context combined with every node that references it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledContext {
    pub context: Context,
    pub nodes: Vec<Node>,
}

impl Context {
    pub fn new(
        name: impl Into<String>,
        status: impl Into<String>,
        template_path: impl Into<String>,
        inputs: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            status: status.into(),
            template_path: template_path.into(),
            inputs: inputs.into(),
        }
    }

    /// Returns the caller-facing field mapping of this context.
    pub fn jsonify(&self) -> Value {
        json!({
            "name": self.name,
            "status": self.status,
            "template_path": self.template_path,
            "inputs": self.inputs,
        })
    }
}

impl From<&ContextSpec> for Context {
    fn from(spec: &ContextSpec) -> Self {
        Self::new(
            spec.name.as_str(),
            spec.status.as_str(),
            spec.template_path.as_str(),
            spec.inputs.as_str(),
        )
    }
}

impl AssembledContext {
    /// Returns context fields plus `path` and the jsonified `nodes` list.
    pub fn jsonify(&self) -> Value {
        let mut value = self.context.jsonify();
        if let Value::Object(map) = &mut value {
            map.insert(
                "path".to_string(),
                Value::String(self.context.template_path.clone()),
            );
            map.insert(
                "nodes".to_string(),
                Value::Array(self.nodes.iter().map(Node::jsonify).collect()),
            );
        }
        value
    }
}
