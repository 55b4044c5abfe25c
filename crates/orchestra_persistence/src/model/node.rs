//! Node domain model.
//!
//! # Responsibility
//! - Define one resource record within a context.
//! - Map the orchestrator's node wire names (`__name`, `__properties`,
//!   `__attributes`) onto typed fields.
//!
//! # Invariants
//! - `name` is unique across all contexts, not only within one.
//! - `properties`, `attributes` and `runtime_properties` are opaque text.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Persisted node row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Owning context name. The schema allows this to be unset.
    pub context: Option<String>,
    pub name: String,
    /// Whether the underlying resource has been created.
    pub is_provisioned: bool,
    /// Desired-state properties.
    pub properties: Option<String>,
    /// Static attributes.
    pub attributes: Option<String>,
    /// Values discovered after provisioning.
    pub runtime_properties: Option<String>,
}

/// Per-node data record used when constructing nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(rename = "__name", alias = "name")]
    pub name: String,
    pub is_provisioned: bool,
    #[serde(rename = "__properties", alias = "properties", default)]
    pub properties: Option<String>,
    #[serde(rename = "__attributes", alias = "attributes", default)]
    pub attributes: Option<String>,
    #[serde(default)]
    pub runtime_properties: Option<String>,
}

impl Node {
    /// Builds a node row for `context_name` from a node description.
    pub fn from_spec(context_name: &str, spec: &NodeSpec) -> Self {
        Self {
            context: Some(context_name.to_string()),
            name: spec.name.clone(),
            is_provisioned: spec.is_provisioned,
            properties: spec.properties.clone(),
            attributes: spec.attributes.clone(),
            runtime_properties: spec.runtime_properties.clone(),
        }
    }

    /// Returns the caller-facing field mapping of this node.
    ///
    /// The owning context is not part of the mapping; the output can be fed
    /// back as a [`NodeSpec`].
    pub fn jsonify(&self) -> Value {
        json!({
            "name": self.name,
            "is_provisioned": self.is_provisioned,
            "__properties": self.properties,
            "__attributes": self.attributes,
            "runtime_properties": self.runtime_properties,
        })
    }
}
