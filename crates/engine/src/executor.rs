//! Workflow execution engine.
//!
//! `WorkflowExecutor` is the orchestrator that walks a validated graph:
//! 1. Validates the graph and takes its topology.
//! 2. Runs each topological level's nodes as concurrent tasks, bounded
//!    by `max_parallelism`.
//! 3. Records every successful output in the run's `ExecutionContext`
//!    before the next level starts.
//! 4. Skips nodes whose incoming edges are all inactive (branch not
//!    taken, guard false, or source skipped).
//! 5. Aborts the run on the first node failure or on cancellation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use nodes::{ExecutionContext, MetricsSummary, NodeType, ProcessorConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::models::{Edge, NodeDefinition, WorkflowGraph};
use crate::registry::ProcessorRegistry;
use crate::source::GraphSource;
use crate::topology::{get_topology, Topology};
use crate::validator::{DagValidator, ValidationOptions};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Maximum number of nodes of one level running at the same time.
    pub max_parallelism: usize,
    /// Base processor configuration; nodes may override it.
    pub processor: ProcessorConfig,
    /// Options for the validation pass that precedes every run.
    pub validation: ValidationOptions,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallelism: 4,
            processor: ProcessorConfig::default(),
            validation: ValidationOptions::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Output of a completed execution
// ---------------------------------------------------------------------------

/// The result of running a full workflow.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub run_id: Uuid,
    /// Output of every node that ran, keyed by node id.
    pub outputs: BTreeMap<String, Value>,
    /// Nodes that ran, in topological order.
    pub completed: Vec<String>,
    /// Nodes skipped because none of their incoming edges was active.
    pub skipped: Vec<String>,
    pub topology: Topology,
    /// Processor metrics recorded for this run.
    pub metrics: MetricsSummary,
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Stateless orchestrator; one instance can serve many concurrent runs.
pub struct WorkflowExecutor {
    registry: Arc<ProcessorRegistry>,
    validator: DagValidator,
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    pub fn new(registry: Arc<ProcessorRegistry>, config: ExecutorConfig) -> Self {
        Self {
            registry,
            validator: DagValidator::new(),
            config,
        }
    }

    /// Use `validator` (for example one with a reference lookup) for the
    /// pre-run validation pass.
    pub fn with_validator(mut self, validator: DagValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Validate and run `graph`.
    ///
    /// `payload` is handed to the trigger nodes; `variables` become the
    /// run variables. Cancelling `cancel` stops the run cooperatively.
    ///
    /// # Errors
    /// [`EngineError::InvalidGraph`] if validation fails,
    /// [`EngineError::Processor`] for the first failing node,
    /// [`EngineError::Cancelled`] if `cancel` fires first.
    pub async fn run(
        &self,
        graph: &WorkflowGraph,
        payload: Map<String, Value>,
        variables: Map<String, Value>,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, EngineError> {
        let context = ExecutionContext::new(variables).with_cancellation(cancel.child_token());
        self.execute(graph, Arc::new(context), payload, &cancel).await
    }

    /// Load `workflow_id` from `source` and run it.
    ///
    /// # Errors
    /// As [`WorkflowExecutor::run`], plus whatever the source reports.
    pub async fn run_workflow(
        &self,
        source: &dyn GraphSource,
        workflow_id: Uuid,
        payload: Map<String, Value>,
        variables: Map<String, Value>,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, EngineError> {
        let graph = source.load(workflow_id).await?;
        let context = ExecutionContext::new(variables)
            .with_workflow_id(workflow_id)
            .with_cancellation(cancel.child_token());
        self.execute(&graph, Arc::new(context), payload, &cancel).await
    }

    #[instrument(
        name = "workflow.run",
        skip_all,
        fields(run_id = %context.run_id(), workflow_id = ?context.workflow_id())
    )]
    async fn execute(
        &self,
        graph: &WorkflowGraph,
        context: Arc<ExecutionContext>,
        payload: Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, EngineError> {
        // ------------------------------------------------------------------
        // Validate and take the topology.
        // ------------------------------------------------------------------
        let validation = self.validator.validate(graph, &self.config.validation).await;
        if !validation.is_valid {
            error!(errors = validation.errors.len(), "graph rejected by validation");
            return Err(EngineError::InvalidGraph(Box::new(validation)));
        }
        let topology = match validation.topology {
            Some(topology) => topology,
            None => get_topology(graph)?,
        };
        info!(
            levels = topology.levels.len(),
            nodes = topology.node_count(),
            "graph validated, starting run"
        );

        let run_token = context.cancellation().clone();
        let outcome = self.run_levels(graph, &topology, &context, &payload).await;
        // Stop anything still in flight, whatever the outcome.
        run_token.cancel();

        let (completed, skipped) = match outcome {
            Ok(done) => done,
            Err(_) if cancel.is_cancelled() => {
                warn!("run cancelled");
                return Err(EngineError::Cancelled);
            }
            Err(e) => return Err(e),
        };

        let run_id = context.run_id();
        info!(completed = completed.len(), skipped = skipped.len(), "run finished");
        Ok(ExecutionResult {
            run_id,
            outputs: context.node_outputs().into_iter().collect(),
            completed,
            skipped,
            topology,
            metrics: self.registry.metrics().get_summary(Some(run_id)),
        })
    }

    async fn run_levels(
        &self,
        graph: &WorkflowGraph,
        topology: &Topology,
        context: &Arc<ExecutionContext>,
        payload: &Map<String, Value>,
    ) -> Result<(Vec<String>, Vec<String>), EngineError> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallelism.max(1)));
        let mut completed = Vec::new();
        let mut skipped: HashSet<String> = HashSet::new();
        let mut skipped_order = Vec::new();

        for (index, level) in topology.levels.iter().enumerate() {
            if context.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            debug!(level = index, nodes = level.len(), "level started");

            let mut tasks = JoinSet::new();
            for node_id in level {
                let Some(node) = graph.node(node_id) else { continue };

                let Some(inputs) = raw_inputs(graph, node, context, &skipped, payload) else {
                    warn!(node_id = %node.id, "no active incoming edge, skipping node");
                    skipped.insert(node.id.clone());
                    skipped_order.push(node.id.clone());
                    continue;
                };

                let executable = self
                    .registry
                    .create(node.node_type, node, context.clone(), &self.config.processor)?;
                let semaphore = semaphore.clone();
                tasks.spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    let result = executable.execute(inputs).await;
                    (executable.node_id().to_owned(), result)
                });
            }

            let mut finished: HashSet<String> = HashSet::new();
            while let Some(joined) = tasks.join_next().await {
                let (node_id, result) = joined?;
                match result {
                    Ok(output) => {
                        context.set_node_output(&node_id, output)?;
                        finished.insert(node_id);
                    }
                    Err(failure) => {
                        // Dropping the JoinSet aborts the rest of the level.
                        context.cancellation().cancel();
                        return Err(failure.into());
                    }
                }
            }

            completed.extend(level.iter().filter(|id| finished.contains(*id)).cloned());
        }

        Ok((completed, skipped_order))
    }
}

// ---------------------------------------------------------------------------
// Data flow between nodes
// ---------------------------------------------------------------------------

/// Whether `edge` carries data in this run.
fn edge_is_active(
    edge: &Edge,
    graph: &WorkflowGraph,
    context: &ExecutionContext,
    skipped: &HashSet<String>,
) -> bool {
    if skipped.contains(&edge.source) {
        return false;
    }
    let Some(output) = context.get_node_output(&edge.source, None) else {
        return false;
    };

    let source_type = graph.node(&edge.source).map(|n| n.node_type);
    let branch_taken = match (source_type, edge.source_handle.as_deref()) {
        (Some(NodeType::Condition), Some(handle)) => {
            output.get("branch").and_then(Value::as_str) == Some(handle)
        }
        (Some(NodeType::Condition), None) => false,
        // A node that succeeded never emits on its error handle.
        (_, Some("error")) => false,
        _ => true,
    };

    branch_taken
        && edge
            .condition
            .as_ref()
            .map_or(true, |rule| rule.evaluate_in(context))
}

/// Raw inputs for `node`, or `None` when it must be skipped.
///
/// Entry triggers receive the run payload; every other node receives an
/// object of its active upstream outputs keyed by source node id.
fn raw_inputs(
    graph: &WorkflowGraph,
    node: &NodeDefinition,
    context: &ExecutionContext,
    skipped: &HashSet<String>,
    payload: &Map<String, Value>,
) -> Option<Value> {
    let incoming: Vec<&Edge> = graph.incoming(&node.id).collect();
    if incoming.is_empty() {
        return (node.node_type == NodeType::Trigger).then(|| Value::Object(payload.clone()));
    }

    let mut inputs: HashMap<&str, Value> = HashMap::new();
    for edge in incoming {
        if edge_is_active(edge, graph, context, skipped) {
            if let Some(output) = context.get_node_output(&edge.source, None) {
                inputs.insert(edge.source.as_str(), output);
            }
        }
    }
    if inputs.is_empty() {
        return None;
    }
    Some(Value::Object(
        inputs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect(),
    ))
}
