//! DAG validation. Run this before executing a workflow.
//!
//! Checks run in a fixed order and accumulate every finding:
//! 1. structural (duplicate ids, self-loops, unknown endpoints, duplicate edges, cycles)
//! 2. connectivity (entry trigger, dangling, unreachable, dead ends)
//! 3. node compatibility (per-type configuration, edge handles)
//! 4. references (tool/agent existence through a [`ReferenceLookup`])
//! 5. data flow (schema compatibility, variable references)
//!
//! Size and time limits are the exception: exceeding them aborts the pass
//! with a single error.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use nodes::builtin::{
    AdapterConfig, AgentConfig, AggregatorConfig, ConditionConfig, ToolConfig, TriggerConfig,
};
use nodes::config::duration_ms;
use nodes::node_type::{INPUT_HANDLE, OUTPUT_HANDLE};
use nodes::template::{collect_references, Reference};
use nodes::{NodeType, ProcessorConfig, ProcessorError, ReferenceKind, ReferenceLookup};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::graph::GraphView;
use crate::models::{NodeDefinition, WorkflowGraph};
use crate::topology::Topology;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    /// Unreachable and dangling nodes are warnings.
    #[default]
    Lenient,
    /// Unreachable and dangling nodes are errors.
    Strict,
}

/// Tuning knobs for a validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationOptions {
    pub level: ValidationLevel,
    pub max_nodes: usize,
    pub max_edges: usize,
    /// Wall-clock budget for the whole pass.
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    /// Attach a [`Topology`] to valid results.
    pub compute_topology: bool,
    /// Node types allowed to have no outgoing edge.
    pub terminal_types: Vec<NodeType>,
    /// Variable roots a run will provide. `None` skips the variable check.
    pub declared_variables: Option<BTreeSet<String>>,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            level: ValidationLevel::Lenient,
            max_nodes: 500,
            max_edges: 2_000,
            timeout: Duration::from_secs(5),
            compute_topology: true,
            terminal_types: vec![
                NodeType::Tool,
                NodeType::Agent,
                NodeType::Adapter,
                NodeType::Aggregator,
            ],
            declared_variables: None,
        }
    }
}

impl ValidationOptions {
    pub fn strict() -> Self {
        Self {
            level: ValidationLevel::Strict,
            ..Self::default()
        }
    }

    pub fn with_declared_variables<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declared_variables = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

/// Machine-readable kind of a [`ValidationIssue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    CycleDetected,
    SelfLoop,
    NodeNotFound,
    DuplicateEdge,
    DuplicateNode,
    NoTriggerNode,
    DanglingNode,
    UnreachableNode,
    DeadEnd,
    InvalidNodeConfig,
    InvalidHandle,
    InvalidReference,
    SchemaMismatch,
    UndefinedVariable,
    GraphTooLarge,
    ValidationTimeout,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        f.write_str(&tag)
    }
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub message: String,
    /// Node ids the finding is about (a cycle lists its whole path).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<String>,
    /// Index of the offending edge in the graph's edge list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge: Option<usize>,
}

impl ValidationIssue {
    fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            nodes: Vec::new(),
            edge: None,
        }
    }

    fn on_node(kind: IssueKind, node_id: &str, message: impl Into<String>) -> Self {
        Self {
            nodes: vec![node_id.to_owned()],
            ..Self::new(kind, message)
        }
    }

    fn on_edge(kind: IssueKind, edge: usize, message: impl Into<String>) -> Self {
        Self {
            edge: Some(edge),
            ..Self::new(kind, message)
        }
    }
}

/// Outcome of a validation pass. Findings are data, never `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    /// Present only on valid results when topology was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<Topology>,
    pub node_count: usize,
    pub edge_count: usize,
    #[serde(rename = "elapsed_ms", with = "duration_ms")]
    pub elapsed: Duration,
}

impl ValidationResult {
    pub fn has_error(&self, kind: IssueKind) -> bool {
        self.errors.iter().any(|i| i.kind == kind)
    }

    pub fn has_warning(&self, kind: IssueKind) -> bool {
        self.warnings.iter().any(|i| i.kind == kind)
    }
}

/// Accumulates findings for one pass.
struct Report {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
    started: Instant,
    budget: Duration,
}

impl Report {
    fn error(&mut self, issue: ValidationIssue) {
        self.errors.push(issue);
    }

    fn warning(&mut self, issue: ValidationIssue) {
        self.warnings.push(issue);
    }

    /// Error under strict validation, warning otherwise.
    fn by_level(&mut self, level: ValidationLevel, issue: ValidationIssue) {
        match level {
            ValidationLevel::Strict => self.error(issue),
            ValidationLevel::Lenient => self.warning(issue),
        }
    }

    fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.started.elapsed())
    }

    fn out_of_time(&self) -> bool {
        self.started.elapsed() >= self.budget
    }
}

/// Why a pass stopped before running every step.
enum Abort {
    TooLarge(String),
    Timeout,
}

// ---------------------------------------------------------------------------
// DagValidator
// ---------------------------------------------------------------------------

/// Validates workflow graphs.
///
/// Reference checks run only when a [`ReferenceLookup`] is attached.
#[derive(Clone, Default)]
pub struct DagValidator {
    lookup: Option<Arc<dyn ReferenceLookup>>,
}

impl DagValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reference_lookup(mut self, lookup: Arc<dyn ReferenceLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Validate `graph`. Never mutates it and never returns `Err`:
    /// every finding lands in the [`ValidationResult`].
    #[instrument(
        name = "dag.validate",
        skip_all,
        fields(nodes = graph.nodes.len(), edges = graph.edges.len())
    )]
    pub async fn validate(&self, graph: &WorkflowGraph, options: &ValidationOptions) -> ValidationResult {
        let mut report = Report {
            errors: Vec::new(),
            warnings: Vec::new(),
            started: Instant::now(),
            budget: options.timeout,
        };

        let outcome = self.run_checks(graph, options, &mut report).await;
        let topology = match outcome {
            Ok(topology) => topology,
            Err(abort) => {
                let issue = match abort {
                    Abort::TooLarge(message) => ValidationIssue::new(IssueKind::GraphTooLarge, message),
                    Abort::Timeout => ValidationIssue::new(
                        IssueKind::ValidationTimeout,
                        format!("validation exceeded its budget of {:?}", options.timeout),
                    ),
                };
                report.errors = vec![issue];
                report.warnings.clear();
                None
            }
        };

        let is_valid = report.errors.is_empty();
        let result = ValidationResult {
            is_valid,
            topology: topology.filter(|_| is_valid),
            errors: report.errors,
            warnings: report.warnings,
            node_count: graph.nodes.len(),
            edge_count: graph.edges.len(),
            elapsed: report.started.elapsed(),
        };

        info!(
            valid = result.is_valid,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            elapsed = ?result.elapsed,
            "validation finished"
        );
        result
    }

    async fn run_checks(
        &self,
        graph: &WorkflowGraph,
        options: &ValidationOptions,
        report: &mut Report,
    ) -> Result<Option<Topology>, Abort> {
        if graph.nodes.len() > options.max_nodes {
            return Err(Abort::TooLarge(format!(
                "graph has {} nodes, limit is {}",
                graph.nodes.len(),
                options.max_nodes
            )));
        }
        if graph.edges.len() > options.max_edges {
            return Err(Abort::TooLarge(format!(
                "graph has {} edges, limit is {}",
                graph.edges.len(),
                options.max_edges
            )));
        }

        let view = GraphView::without_self_loops(graph);

        check_structure(graph, &view, report);
        let structural_ok = report.errors.is_empty();
        checkpoint(report, "structural")?;

        check_connectivity(&view, options, report);
        checkpoint(report, "connectivity")?;

        check_nodes(graph, report);
        checkpoint(report, "node compatibility")?;

        if let Some(lookup) = &self.lookup {
            let remaining = report.remaining();
            tokio::time::timeout(remaining, check_references(graph, lookup.as_ref(), report))
                .await
                .map_err(|_| Abort::Timeout)?;
            checkpoint(report, "references")?;
        }

        check_data_flow(graph, options, report);
        checkpoint(report, "data flow")?;

        Ok((structural_ok && options.compute_topology).then(|| Topology::from_view(&view)))
    }
}

/// Convenience wrapper: validate without a reference lookup.
pub async fn validate(graph: &WorkflowGraph, options: &ValidationOptions) -> ValidationResult {
    DagValidator::new().validate(graph, options).await
}

fn checkpoint(report: &Report, step: &str) -> Result<(), Abort> {
    debug!(step, elapsed = ?report.started.elapsed(), "validation step done");
    if report.out_of_time() {
        return Err(Abort::Timeout);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 1. Structural
// ---------------------------------------------------------------------------

fn check_structure(graph: &WorkflowGraph, view: &GraphView<'_>, report: &mut Report) {
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &graph.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            report.error(ValidationIssue::on_node(
                IssueKind::DuplicateNode,
                &node.id,
                format!("duplicate node id '{}'", node.id),
            ));
        }
    }

    // An omitted handle is the same edge as the default one.
    let mut seen_edges: HashSet<(&str, &str, &str, &str)> = HashSet::new();
    for (i, edge) in graph.edges.iter().enumerate() {
        if edge.is_self_loop() {
            report.error(ValidationIssue {
                nodes: vec![edge.source.clone()],
                ..ValidationIssue::on_edge(
                    IssueKind::SelfLoop,
                    i,
                    format!("node '{}' has an edge to itself", edge.source),
                )
            });
        }

        for (side, id) in [("source", &edge.source), ("target", &edge.target)] {
            if !view.contains(id) {
                report.error(ValidationIssue {
                    nodes: vec![id.clone()],
                    ..ValidationIssue::on_edge(
                        IssueKind::NodeNotFound,
                        i,
                        format!("edge {side} '{id}' is not a node of this graph"),
                    )
                });
            }
        }

        let key = (
            edge.source.as_str(),
            edge.target.as_str(),
            edge.source_handle.as_deref().unwrap_or(OUTPUT_HANDLE),
            edge.target_handle.as_deref().unwrap_or(INPUT_HANDLE),
        );
        if !seen_edges.insert(key) {
            report.error(ValidationIssue::on_edge(
                IssueKind::DuplicateEdge,
                i,
                format!("duplicate edge '{}' -> '{}'", edge.source, edge.target),
            ));
        }
    }

    if let Some(cycle) = view.detect_cycle() {
        report.error(ValidationIssue {
            message: format!("cycle detected: {}", cycle.join(" -> ")),
            nodes: cycle,
            ..ValidationIssue::new(IssueKind::CycleDetected, "")
        });
    }
}

// ---------------------------------------------------------------------------
// 2. Connectivity
// ---------------------------------------------------------------------------

fn check_connectivity(view: &GraphView<'_>, options: &ValidationOptions, report: &mut Report) {
    let entries = view.entry_triggers();
    if entries.is_empty() {
        report.error(ValidationIssue::new(
            IssueKind::NoTriggerNode,
            "graph has no trigger node without incoming edges",
        ));
    }

    let entry_set: HashSet<&str> = entries.iter().map(String::as_str).collect();
    let dangling: Vec<String> = view
        .dangling_nodes()
        .into_iter()
        .filter(|id| !entry_set.contains(id.as_str()))
        .collect();
    for id in &dangling {
        report.by_level(
            options.level,
            ValidationIssue::on_node(IssueKind::DanglingNode, id, format!("node '{id}' has no edges")),
        );
    }

    let dangling_set: HashSet<&str> = dangling.iter().map(String::as_str).collect();
    if !entries.is_empty() {
        for id in view.unreachable_from(&entries) {
            if !dangling_set.contains(id.as_str()) {
                report.by_level(
                    options.level,
                    ValidationIssue::on_node(
                        IssueKind::UnreachableNode,
                        &id,
                        format!("node '{id}' cannot be reached from any trigger"),
                    ),
                );
            }
        }
    }

    for id in view.dead_ends(&options.terminal_types) {
        if !dangling_set.contains(id.as_str()) {
            report.warning(ValidationIssue::on_node(
                IssueKind::DeadEnd,
                &id,
                format!("node '{id}' has no outgoing edge and is not a terminal type"),
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// 3. Node compatibility
// ---------------------------------------------------------------------------

/// Parse a node's configuration the way its processor will.
fn check_config(node: &NodeDefinition) -> Result<(), ProcessorError> {
    match node.node_type {
        NodeType::Trigger => TriggerConfig::from_value(&node.config).map(drop),
        NodeType::Tool => ToolConfig::from_value(&node.config).map(drop),
        NodeType::Agent => AgentConfig::from_value(&node.config).map(drop),
        NodeType::Condition => ConditionConfig::from_value(&node.config).map(drop),
        NodeType::Adapter => AdapterConfig::from_value(&node.config).map(drop),
        NodeType::Aggregator => AggregatorConfig::from_value(&node.config).map(drop),
    }?;
    ProcessorConfig::default().with_overrides(&node.config).map(drop)
}

/// Source handles a node declares; `None` when its configuration is unusable.
pub(crate) fn source_handles(node: &NodeDefinition) -> Option<Vec<String>> {
    match node.node_type {
        NodeType::Condition => ConditionConfig::from_value(&node.config)
            .ok()
            .map(|c| c.handles()),
        other => Some(other.source_handles().iter().map(|h| (*h).to_owned()).collect()),
    }
}

fn check_nodes(graph: &WorkflowGraph, report: &mut Report) {
    for node in &graph.nodes {
        if let Err(e) = check_config(node) {
            report.error(ValidationIssue::on_node(
                IssueKind::InvalidNodeConfig,
                &node.id,
                format!("{} node '{}': {e}", node.node_type, node.id),
            ));
        }
    }

    for (i, edge) in graph.edges.iter().enumerate() {
        if let (Some(handle), Some(source)) = (&edge.source_handle, graph.node(&edge.source)) {
            if let Some(declared) = source_handles(source) {
                if !declared.contains(handle) {
                    report.error(ValidationIssue {
                        nodes: vec![source.id.clone()],
                        ..ValidationIssue::on_edge(
                            IssueKind::InvalidHandle,
                            i,
                            format!(
                                "{} node '{}' has no source handle '{handle}' (declared: {declared:?})",
                                source.node_type, source.id
                            ),
                        )
                    });
                }
            }
        }

        // Condition out-edges must name the branch they follow.
        if let (None, Some(source)) = (&edge.source_handle, graph.node(&edge.source)) {
            if source.node_type == NodeType::Condition {
                report.error(ValidationIssue {
                    nodes: vec![source.id.clone()],
                    ..ValidationIssue::on_edge(
                        IssueKind::InvalidHandle,
                        i,
                        format!("edge from condition node '{}' names no branch handle", source.id),
                    )
                });
            }
        }

        if let Some(handle) = &edge.target_handle {
            if handle != INPUT_HANDLE && graph.contains(&edge.target) {
                report.error(ValidationIssue {
                    nodes: vec![edge.target.clone()],
                    ..ValidationIssue::on_edge(
                        IssueKind::InvalidHandle,
                        i,
                        format!("node '{}' has no target handle '{handle}'", edge.target),
                    )
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 4. References
// ---------------------------------------------------------------------------

async fn check_references(graph: &WorkflowGraph, lookup: &dyn ReferenceLookup, report: &mut Report) {
    for node in &graph.nodes {
        let reference = match node.node_type {
            NodeType::Tool => ToolConfig::from_value(&node.config)
                .ok()
                .map(|c| (ReferenceKind::Tool, c.tool_id)),
            NodeType::Agent => AgentConfig::from_value(&node.config)
                .ok()
                .map(|c| (ReferenceKind::Agent, c.agent_id)),
            _ => None,
        };
        let Some((kind, id)) = reference else { continue };

        if !lookup.exists(kind, &id).await {
            report.error(ValidationIssue::on_node(
                IssueKind::InvalidReference,
                &node.id,
                format!("node '{}' references unknown or inactive {kind} '{id}'", node.id),
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// 5. Data flow
// ---------------------------------------------------------------------------

fn check_data_flow(graph: &WorkflowGraph, options: &ValidationOptions, report: &mut Report) {
    for (i, edge) in graph.edges.iter().enumerate() {
        let (Some(source), Some(target)) = (graph.node(&edge.source), graph.node(&edge.target)) else {
            continue;
        };
        if let (Some(output), Some(input)) = (&source.output_schema, &target.input_schema) {
            if let Err(reason) = output.feeds(input) {
                report.error(ValidationIssue {
                    nodes: vec![source.id.clone(), target.id.clone()],
                    ..ValidationIssue::on_edge(
                        IssueKind::SchemaMismatch,
                        i,
                        format!("'{}' -> '{}': {reason}", source.id, target.id),
                    )
                });
            }
        }
    }

    for node in &graph.nodes {
        for expr in collect_references(&node.config) {
            let undefined = match Reference::parse(&expr) {
                Reference::NodeOutput { node_id, .. } => (!graph.contains(node_id))
                    .then(|| format!("references unknown node '{node_id}'")),
                reference @ Reference::Variable(_) => {
                    let root = reference.variable_root().unwrap_or_default();
                    options
                        .declared_variables
                        .as_ref()
                        .filter(|declared| !declared.contains(root))
                        .map(|_| format!("references undeclared variable '{root}'"))
                }
            };
            if let Some(reason) = undefined {
                report.error(ValidationIssue::on_node(
                    IssueKind::UndefinedVariable,
                    &node.id,
                    format!("node '{}' {reason} in '{{{{ {expr} }}}}'", node.id),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DataSchema, Edge, SchemaType};
    use nodes::mock::StaticReferenceLookup;
    use serde_json::{json, Value};

    fn trigger(id: &str) -> NodeDefinition {
        NodeDefinition::new(id, NodeType::Trigger, Value::Null)
    }

    fn tool(id: &str, tool_id: &str) -> NodeDefinition {
        NodeDefinition::new(id, NodeType::Tool, json!({ "tool_id": tool_id }))
    }

    fn condition(id: &str) -> NodeDefinition {
        NodeDefinition::new(
            id,
            NodeType::Condition,
            json!({
                "conditions": [{ "handle": "high", "variable": "score", "operator": ">", "value": 5 }],
                "default_handle": "low"
            }),
        )
    }

    fn linear() -> WorkflowGraph {
        WorkflowGraph::new(
            vec![trigger("start"), tool("fetch", "http"), tool("store", "db")],
            vec![Edge::new("start", "fetch"), Edge::new("fetch", "store")],
        )
    }

    fn kinds(issues: &[ValidationIssue]) -> Vec<IssueKind> {
        issues.iter().map(|i| i.kind).collect()
    }

    #[tokio::test]
    async fn valid_graph_gets_a_topology() {
        let result = validate(&linear(), &ValidationOptions::default()).await;
        assert!(result.is_valid, "{:?}", result.errors);
        assert!(result.warnings.is_empty());
        assert_eq!(result.node_count, 3);
        assert_eq!(result.edge_count, 2);
        let topology = result.topology.unwrap();
        assert_eq!(topology.levels, vec![vec!["start"], vec!["fetch"], vec!["store"]]);
        assert_eq!(topology.critical_path_length, 2);
    }

    #[tokio::test]
    async fn topology_can_be_skipped() {
        let options = ValidationOptions {
            compute_topology: false,
            ..ValidationOptions::default()
        };
        let result = validate(&linear(), &options).await;
        assert!(result.is_valid);
        assert!(result.topology.is_none());
    }

    #[tokio::test]
    async fn structural_findings_are_all_reported_in_order() {
        let mut graph = linear();
        graph.nodes.push(tool("fetch", "http"));
        graph.edges.push(Edge::new("store", "store"));
        graph.edges.push(Edge::new("fetch", "ghost"));
        graph.edges.push(Edge::new("start", "fetch"));
        graph.edges.push(Edge::new("store", "fetch"));

        let result = validate(&graph, &ValidationOptions::default()).await;
        assert!(!result.is_valid);
        assert!(result.topology.is_none());
        assert_eq!(
            kinds(&result.errors)[..5],
            [
                IssueKind::DuplicateNode,
                IssueKind::SelfLoop,
                IssueKind::NodeNotFound,
                IssueKind::DuplicateEdge,
                IssueKind::CycleDetected,
            ]
        );
        let cycle = result.errors.iter().find(|i| i.kind == IssueKind::CycleDetected).unwrap();
        assert_eq!(cycle.nodes, vec!["fetch", "store", "fetch"]);
        // the self-loop is not reported a second time as a cycle
        assert_eq!(result.errors.iter().filter(|i| i.kind == IssueKind::CycleDetected).count(), 1);
    }

    #[tokio::test]
    async fn missing_trigger_is_an_error() {
        let graph = WorkflowGraph::new(
            vec![tool("a", "x"), tool("b", "y")],
            vec![Edge::new("a", "b")],
        );
        let result = validate(&graph, &ValidationOptions::default()).await;
        assert!(result.has_error(IssueKind::NoTriggerNode));

        // a trigger with an incoming edge is not an entry point
        let graph = WorkflowGraph::new(
            vec![tool("a", "x"), trigger("t")],
            vec![Edge::new("a", "t")],
        );
        assert!(validate(&graph, &ValidationOptions::default()).await.has_error(IssueKind::NoTriggerNode));
    }

    #[tokio::test]
    async fn connectivity_severity_follows_level() {
        let mut graph = linear();
        graph.nodes.push(tool("orphan", "x"));
        graph.nodes.push(tool("island", "x"));
        graph.nodes.push(tool("island_sink", "x"));
        graph.edges.push(Edge::new("island", "island_sink"));

        let lenient = validate(&graph, &ValidationOptions::default()).await;
        assert!(lenient.is_valid);
        assert_eq!(
            kinds(&lenient.warnings),
            [IssueKind::DanglingNode, IssueKind::UnreachableNode, IssueKind::UnreachableNode]
        );

        let strict = validate(&graph, &ValidationOptions::strict()).await;
        assert!(!strict.is_valid);
        assert_eq!(
            kinds(&strict.errors),
            [IssueKind::DanglingNode, IssueKind::UnreachableNode, IssueKind::UnreachableNode]
        );
    }

    #[tokio::test]
    async fn dead_ends_are_warnings_only() {
        let graph = WorkflowGraph::new(
            vec![trigger("t"), condition("route")],
            vec![Edge::new("t", "route")],
        );
        let result = validate(&graph, &ValidationOptions::strict()).await;
        assert!(result.is_valid);
        assert_eq!(kinds(&result.warnings), [IssueKind::DeadEnd]);
        assert_eq!(result.warnings[0].nodes, vec!["route"]);
    }

    #[tokio::test]
    async fn node_configs_and_handles_are_checked() {
        let graph = WorkflowGraph::new(
            vec![
                trigger("t"),
                NodeDefinition::new("fetch", NodeType::Tool, json!({})),
                condition("route"),
                NodeDefinition::new("shape", NodeType::Adapter, json!({ "mappings": { "a": "b" }, "timeout_ms": "soon" })),
                tool("hi", "x"),
                tool("lo", "x"),
            ],
            vec![
                Edge::new("t", "fetch"),
                Edge::new("fetch", "route").from_handle("error"),
                Edge::new("route", "hi").from_handle("high"),
                Edge::new("route", "lo").from_handle("medium"),
                Edge::new("route", "shape").from_handle("low").to_handle("side"),
            ],
        );
        let result = validate(&graph, &ValidationOptions::default()).await;
        assert_eq!(
            kinds(&result.errors),
            [
                IssueKind::InvalidNodeConfig,
                IssueKind::InvalidNodeConfig,
                IssueKind::InvalidHandle,
                IssueKind::InvalidHandle,
            ]
        );
        assert_eq!(result.errors[0].nodes, vec!["fetch"]);
        assert_eq!(result.errors[1].nodes, vec!["shape"]);
        assert_eq!(result.errors[2].edge, Some(3));
        assert_eq!(result.errors[3].edge, Some(4));
    }

    #[tokio::test]
    async fn omitted_handles_match_their_defaults_for_duplicates() {
        let mut graph = linear();
        graph.edges.push(Edge::new("start", "fetch").from_handle("output").to_handle("input"));
        graph.edges.push(Edge::new("fetch", "store").to_handle("input"));
        graph.edges.push(Edge::new("fetch", "store").from_handle("error"));

        let result = validate(&graph, &ValidationOptions::default()).await;
        assert_eq!(kinds(&result.errors), [IssueKind::DuplicateEdge, IssueKind::DuplicateEdge]);
        assert_eq!(result.errors[0].edge, Some(2));
        assert_eq!(result.errors[1].edge, Some(3));
    }

    #[tokio::test]
    async fn condition_out_edges_must_name_a_branch() {
        let graph = WorkflowGraph::new(
            vec![trigger("t"), condition("route"), tool("hi", "x"), tool("any", "x")],
            vec![
                Edge::new("t", "route"),
                Edge::new("route", "hi").from_handle("high"),
                Edge::new("route", "any"),
            ],
        );
        let result = validate(&graph, &ValidationOptions::default()).await;
        assert_eq!(kinds(&result.errors), [IssueKind::InvalidHandle]);
        assert_eq!(result.errors[0].edge, Some(2));
        assert_eq!(result.errors[0].nodes, vec!["route"]);
    }

    #[tokio::test]
    async fn references_are_checked_through_the_lookup() {
        let mut graph = linear();
        graph.nodes.push(NodeDefinition::new("write", NodeType::Agent, json!({ "agent_id": "writer" })));
        graph.edges.push(Edge::new("store", "write"));

        let lookup = StaticReferenceLookup::new()
            .with(ReferenceKind::Tool, "http")
            .with(ReferenceKind::Agent, "writer");
        let validator = DagValidator::new().with_reference_lookup(Arc::new(lookup));

        let result = validator.validate(&graph, &ValidationOptions::default()).await;
        assert_eq!(kinds(&result.errors), [IssueKind::InvalidReference]);
        assert_eq!(result.errors[0].nodes, vec!["store"]);
    }

    #[tokio::test]
    async fn schema_and_variable_checks() {
        let graph = WorkflowGraph::new(
            vec![
                trigger("t").with_output_schema(DataSchema::of(SchemaType::Object).with_fields(["order"])),
                NodeDefinition::new(
                    "fetch",
                    NodeType::Tool,
                    json!({ "tool_id": "http", "parameters": {
                        "url": "{{ variables.base_url }}/orders/{{ nodes.t.payload.order }}",
                        "token": "{{ secret }}",
                        "trace": "{{ nodes.ghost.id }}"
                    } }),
                )
                .with_input_schema(DataSchema::of(SchemaType::Object).with_required(["order", "customer"])),
            ],
            vec![Edge::new("t", "fetch")],
        );
        let options = ValidationOptions::default().with_declared_variables(["base_url"]);
        let result = validate(&graph, &options).await;
        assert_eq!(
            kinds(&result.errors),
            [IssueKind::SchemaMismatch, IssueKind::UndefinedVariable, IssueKind::UndefinedVariable]
        );
        assert!(result.errors[0].message.contains("customer"));

        // without declared variables only node references are checked
        let result = validate(&graph, &ValidationOptions::default()).await;
        assert_eq!(kinds(&result.errors), [IssueKind::SchemaMismatch, IssueKind::UndefinedVariable]);
    }

    #[tokio::test]
    async fn size_limits_short_circuit() {
        let mut graph = linear();
        graph.edges.push(Edge::new("store", "store"));
        let options = ValidationOptions {
            max_nodes: 2,
            ..ValidationOptions::default()
        };
        let result = validate(&graph, &options).await;
        assert_eq!(kinds(&result.errors), [IssueKind::GraphTooLarge]);
        assert!(result.warnings.is_empty());

        let options = ValidationOptions {
            max_edges: 1,
            ..ValidationOptions::default()
        };
        assert_eq!(kinds(&validate(&graph, &options).await.errors), [IssueKind::GraphTooLarge]);
    }

    struct SlowLookup;

    #[async_trait::async_trait]
    impl ReferenceLookup for SlowLookup {
        async fn exists(&self, _kind: ReferenceKind, _id: &str) -> bool {
            tokio::time::sleep(Duration::from_secs(60)).await;
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_lookup_hits_the_time_limit() {
        let validator = DagValidator::new().with_reference_lookup(Arc::new(SlowLookup));
        let result = validator.validate(&linear(), &ValidationOptions::default()).await;
        assert!(!result.is_valid);
        assert_eq!(kinds(&result.errors), [IssueKind::ValidationTimeout]);
    }

    #[tokio::test]
    async fn validation_is_deterministic() {
        let mut graph = linear();
        graph.nodes.push(condition("route"));
        graph.nodes.push(tool("orphan", "x"));
        graph.edges.push(Edge::new("fetch", "route").from_handle("output"));
        graph.edges.push(Edge::new("route", "fetch").from_handle("nope"));

        let options = ValidationOptions::strict();
        let mut first = validate(&graph, &options).await;
        let mut second = validate(&graph, &options).await;
        first.elapsed = Duration::ZERO;
        second.elapsed = Duration::ZERO;
        assert_eq!(first, second);
        assert!(!first.errors.is_empty());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: ValidationOptions =
            serde_json::from_value(json!({ "level": "strict", "timeout_ms": 250 })).unwrap();
        assert_eq!(options.level, ValidationLevel::Strict);
        assert_eq!(options.timeout, Duration::from_millis(250));
        assert_eq!(options.max_nodes, 500);
        assert_eq!(IssueKind::UndefinedVariable.to_string(), "undefined_variable");
    }
}
