//! Per-run mutable state shared across node executions.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::template::{self, Reference};
use crate::ContextError;

/// Shared context for a single workflow run.
///
/// Variables are fixed at trigger time. Node outputs are write-once and
/// are recorded by the orchestrator right after a node's `execute`
/// succeeds; any downstream node may read them.
#[derive(Debug)]
pub struct ExecutionContext {
    run_id: Uuid,
    workflow_id: Option<Uuid>,
    variables: Value,
    node_outputs: RwLock<HashMap<String, Value>>,
    cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(variables: Map<String, Value>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            workflow_id: None,
            variables: Value::Object(variables),
            node_outputs: RwLock::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_workflow_id(mut self, workflow_id: Uuid) -> Self {
        self.workflow_id = Some(workflow_id);
        self
    }

    /// Bind the run to a cancellation signal.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn workflow_id(&self) -> Option<Uuid> {
        self.workflow_id
    }

    pub fn variables(&self) -> &Value {
        &self.variables
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Read a run variable by dotted path, falling back to `default`.
    pub fn get_variable(&self, path: &str, default: Value) -> Value {
        template::lookup_path(&self.variables, path)
            .cloned()
            .unwrap_or(default)
    }

    /// Read a node's recorded output, optionally narrowed by a dotted `key`.
    pub fn get_node_output(&self, node_id: &str, key: Option<&str>) -> Option<Value> {
        let outputs = self.node_outputs.read();
        let output = outputs.get(node_id)?;
        match key {
            Some(key) => template::lookup_path(output, key).cloned(),
            None => Some(output.clone()),
        }
    }

    pub fn has_node_output(&self, node_id: &str) -> bool {
        self.node_outputs.read().contains_key(node_id)
    }

    /// Record a node's output.
    ///
    /// # Errors
    /// [`ContextError::OutputAlreadySet`] if the node already has an output.
    pub fn set_node_output(&self, node_id: &str, outputs: Value) -> Result<(), ContextError> {
        let mut guard = self.node_outputs.write();
        if guard.contains_key(node_id) {
            return Err(ContextError::OutputAlreadySet(node_id.to_owned()));
        }
        guard.insert(node_id.to_owned(), outputs);
        Ok(())
    }

    /// Copy of every recorded node output.
    pub fn node_outputs(&self) -> HashMap<String, Value> {
        self.node_outputs.read().clone()
    }

    /// Resolve a single reference expression (see [`crate::template`]).
    pub fn resolve_reference(&self, expr: &str) -> Option<Value> {
        match Reference::parse(expr) {
            Reference::Variable(path) => template::lookup_path(&self.variables, path).cloned(),
            Reference::NodeOutput { node_id, path } => self.get_node_output(node_id, path),
        }
    }

    /// Replace every `{{ ... }}` reference nested in `value`.
    pub fn render(&self, value: &Value) -> Value {
        template::render(value, &|expr| self.resolve_reference(expr))
    }
}
