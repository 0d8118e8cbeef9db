//! Core graph model for the workflow engine.
//!
//! These types are the in-memory shape of a workflow definition. They
//! (de)serialize from the JSON a graph source hands over and are never
//! mutated by validation.

use std::collections::BTreeSet;

use nodes::{NodeType, Rule};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// DataSchema
// ---------------------------------------------------------------------------

/// Coarse type tag of a declared node input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaType {
    #[default]
    Any,
    Object,
    Array,
    String,
    Number,
    Boolean,
}

/// Declared shape of a node's input or output.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataSchema {
    #[serde(rename = "type", default)]
    pub schema_type: SchemaType,
    /// Fields an output schema promises to produce.
    #[serde(default)]
    pub fields: BTreeSet<String>,
    /// Fields an input schema needs from upstream.
    #[serde(default)]
    pub required: BTreeSet<String>,
}

impl DataSchema {
    pub fn of(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            ..Self::default()
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_required<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Whether an output of shape `self` may feed an input of shape `input`:
    /// equal type tags (or `any` on either side) and every required input
    /// field present in the output's fields.
    pub fn feeds(&self, input: &DataSchema) -> Result<(), String> {
        let types_match = self.schema_type == SchemaType::Any
            || input.schema_type == SchemaType::Any
            || self.schema_type == input.schema_type;
        if !types_match {
            return Err(format!(
                "output type {:?} does not match input type {:?}",
                self.schema_type, input.schema_type
            ));
        }
        let missing: Vec<&str> = input
            .required
            .iter()
            .filter(|f| !self.fields.contains(*f))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(format!("required input fields not produced upstream: {missing:?}"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// NodeDefinition
// ---------------------------------------------------------------------------

/// A single step in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique identifier within this graph (referenced by edges).
    pub id: String,
    /// Selects the processor that runs this node.
    #[serde(rename = "type", alias = "node_type")]
    pub node_type: NodeType,
    /// Processor configuration; may also carry `retry` / `timeout_ms` overrides.
    #[serde(default)]
    pub config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<DataSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<DataSchema>,
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>, node_type: NodeType, config: Value) -> Self {
        Self {
            id: id.into(),
            node_type,
            config,
            input_schema: None,
            output_schema: None,
        }
    }

    pub fn with_input_schema(mut self, schema: DataSchema) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn with_output_schema(mut self, schema: DataSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed edge from one node to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(alias = "from")]
    pub source: String,
    #[serde(alias = "to")]
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    /// Guard evaluated against the run context; a false guard deactivates the edge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Rule>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
            condition: None,
        }
    }

    pub fn from_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    pub fn to_handle(mut self, handle: impl Into<String>) -> Self {
        self.target_handle = Some(handle.into());
        self
    }

    pub fn guarded_by(mut self, rule: Rule) -> Self {
        self.condition = Some(rule);
        self
    }

    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }
}

// ---------------------------------------------------------------------------
// WorkflowGraph
// ---------------------------------------------------------------------------

/// A set of nodes plus an ordered sequence of edges.
///
/// Acyclicity is not assumed; run the validator before executing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowGraph {
    pub fn new(nodes: Vec<NodeDefinition>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// First node declared with `id`.
    pub fn node(&self, id: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.target == id)
    }
}
