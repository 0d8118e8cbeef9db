//! End-to-end tests for the workflow execution engine.
//!
//! These run real built-in processors against the mock tool and agent
//! invokers from `nodes::mock`, so no external runtime is needed. Timing
//! assertions use tokio's paused clock.

use std::sync::Arc;
use std::time::Duration;

use nodes::mock::{MockAgentInvoker, MockToolInvoker};
use nodes::{MetricsCollector, MetricsFilter, NodeType, Operator, Phase, ProcessorError, Rule};
use serde_json::{json, Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{Edge, NodeDefinition, WorkflowGraph};
use crate::registry::ProcessorRegistry;
use crate::source::InMemoryGraphSource;
use crate::validator::IssueKind;
use crate::{EngineError, ExecutorConfig, WorkflowExecutor};

fn executor(tools: Arc<MockToolInvoker>, max_parallelism: usize) -> (WorkflowExecutor, Arc<ProcessorRegistry>) {
    let registry = Arc::new(ProcessorRegistry::with_defaults(
        Arc::new(MetricsCollector::new()),
        tools,
        Arc::new(MockAgentInvoker::returning(json!("done"))),
    ));
    let config = ExecutorConfig {
        max_parallelism,
        ..ExecutorConfig::default()
    };
    (WorkflowExecutor::new(registry.clone(), config), registry)
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn trigger(id: &str) -> NodeDefinition {
    NodeDefinition::new(id, NodeType::Trigger, Value::Null)
}

fn tool(id: &str, tool_id: &str) -> NodeDefinition {
    NodeDefinition::new(id, NodeType::Tool, json!({ "tool_id": tool_id }))
}

// ============================================================
// Data flow
// ============================================================

#[tokio::test]
async fn outputs_flow_through_a_linear_workflow() {
    let tools = Arc::new(MockToolInvoker::returning(json!({ "temp": 4 })));
    let (executor, _) = executor(tools.clone(), 4);

    let graph = WorkflowGraph::new(
        vec![
            trigger("start"),
            NodeDefinition::new(
                "fetch",
                NodeType::Tool,
                json!({ "tool_id": "weather", "parameters": { "city": "{{ nodes.start.payload.city }}" } }),
            ),
            NodeDefinition::new("shape", NodeType::Adapter, json!({ "mappings": { "temp": "fetch.result.temp" } })),
        ],
        vec![Edge::new("start", "fetch"), Edge::new("fetch", "shape")],
    );

    let result = executor
        .run(&graph, object(json!({ "city": "Oslo" })), Map::new(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.completed, vec!["start", "fetch", "shape"]);
    assert!(result.skipped.is_empty());
    assert_eq!(result.outputs["shape"], json!({ "temp": 4 }));
    assert_eq!(result.outputs["start"]["payload"], json!({ "city": "Oslo" }));

    let calls = tools.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1["city"], "Oslo");

    assert_eq!(result.metrics.total_processors, 3);
    assert_eq!(result.metrics.success_rate, 1.0);
}

#[tokio::test(start_paused = true)]
async fn a_level_runs_concurrently_up_to_the_parallelism_limit() {
    let graph = WorkflowGraph::new(
        vec![
            trigger("start"),
            tool("a", "slow"),
            tool("b", "slow"),
            NodeDefinition::new("join", NodeType::Aggregator, json!({ "mode": "list" })),
        ],
        vec![
            Edge::new("start", "a"),
            Edge::new("start", "b"),
            Edge::new("a", "join"),
            Edge::new("b", "join"),
        ],
    );

    let tools = Arc::new(MockToolInvoker::returning(json!(1)).with_delay(Duration::from_millis(100)));
    let (parallel, _) = executor(tools, 2);
    let started = Instant::now();
    let result = parallel
        .run(&graph, Map::new(), Map::new(), CancellationToken::new())
        .await
        .unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(100) && elapsed < Duration::from_millis(200), "{elapsed:?}");
    assert_eq!(result.topology.levels, vec![vec!["start"], vec!["a", "b"], vec!["join"]]);
    assert_eq!(result.outputs["join"]["source_count"], 2);
    assert_eq!(result.outputs["join"]["result"][0]["result"], 1);

    let tools = Arc::new(MockToolInvoker::returning(json!(1)).with_delay(Duration::from_millis(100)));
    let (serial, _) = executor(tools, 1);
    let started = Instant::now();
    serial
        .run(&graph, Map::new(), Map::new(), CancellationToken::new())
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(200));
}

// ============================================================
// Branching
// ============================================================

#[tokio::test]
async fn only_the_selected_branch_runs() {
    let tools = Arc::new(MockToolInvoker::returning(json!("sent")));
    let (executor, _) = executor(tools.clone(), 4);

    let graph = WorkflowGraph::new(
        vec![
            trigger("start"),
            NodeDefinition::new(
                "route",
                NodeType::Condition,
                json!({
                    "conditions": [{ "handle": "vip", "variable": "tier", "operator": ">=", "value": 3 }],
                    "default_handle": "standard"
                }),
            ),
            tool("vip_mail", "vip"),
            tool("std_mail", "standard"),
            NodeDefinition::new("std_log", NodeType::Adapter, json!({ "mappings": { "r": "std_mail.result" } })),
        ],
        vec![
            Edge::new("start", "route"),
            Edge::new("route", "vip_mail").from_handle("vip"),
            Edge::new("route", "std_mail").from_handle("standard"),
            Edge::new("std_mail", "std_log"),
        ],
    );

    let result = executor
        .run(&graph, Map::new(), object(json!({ "tier": 5 })), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.outputs["route"]["branch"], "vip");
    assert_eq!(result.completed, vec!["start", "route", "vip_mail"]);
    assert_eq!(result.skipped, vec!["std_mail", "std_log"]);
    assert_eq!(tools.call_count(), 1);
    assert_eq!(tools.calls()[0].0, "vip");
}

#[tokio::test]
async fn false_guard_deactivates_an_edge() {
    let tools = Arc::new(MockToolInvoker::returning(json!(null)));
    let (executor, _) = executor(tools.clone(), 4);

    let guard = Rule {
        variable: "notify".into(),
        operator: Operator::Truthy,
        value: Value::Null,
    };
    let graph = WorkflowGraph::new(
        vec![trigger("start"), tool("notify", "mail"), tool("log", "log")],
        vec![
            Edge::new("start", "notify").guarded_by(guard),
            Edge::new("start", "log"),
        ],
    );

    let result = executor
        .run(&graph, Map::new(), object(json!({ "notify": false })), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.completed, vec!["start", "log"]);
    assert_eq!(result.skipped, vec!["notify"]);
    assert_eq!(tools.call_count(), 1);
}

// ============================================================
// Failure handling
// ============================================================

#[tokio::test]
async fn invalid_graph_is_rejected_before_anything_runs() {
    let tools = Arc::new(MockToolInvoker::returning(json!(null)));
    let (executor, registry) = executor(tools.clone(), 4);

    let graph = WorkflowGraph::new(
        vec![trigger("start"), tool("a", "x"), tool("b", "y")],
        vec![Edge::new("start", "a"), Edge::new("a", "b"), Edge::new("b", "a")],
    );

    match executor.run(&graph, Map::new(), Map::new(), CancellationToken::new()).await {
        Err(EngineError::InvalidGraph(result)) => assert!(result.has_error(IssueKind::CycleDetected)),
        other => panic!("expected an invalid graph, got {other:?}"),
    }
    assert_eq!(tools.call_count(), 0);
    assert!(registry.metrics().is_empty());
}

#[tokio::test]
async fn first_failure_aborts_the_run() {
    let tools = Arc::new(MockToolInvoker::failing(ProcessorError::internal("boom")));
    let (executor, registry) = executor(tools.clone(), 4);

    let graph = WorkflowGraph::new(
        vec![trigger("start"), tool("fetch", "http"), tool("store", "db")],
        vec![Edge::new("start", "fetch"), Edge::new("fetch", "store")],
    );

    match executor.run(&graph, Map::new(), Map::new(), CancellationToken::new()).await {
        Err(EngineError::Processor(failure)) => {
            assert_eq!(failure.node_id, "fetch");
            assert_eq!(failure.node_type, NodeType::Tool);
            assert_eq!(failure.phase, Phase::Process);
            assert!(matches!(failure.error, ProcessorError::Execution { attempts: 1, .. }));
        }
        other => panic!("expected a processor failure, got {other:?}"),
    }
    assert_eq!(tools.call_count(), 1);

    let summary = registry.metrics().get_summary(None);
    assert_eq!(summary.total_processors, 2);
    assert_eq!(summary.failed, 1);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_inside_a_run() {
    let tools = Arc::new(MockToolInvoker::scripted(
        vec![Err(ProcessorError::transient("reset"))],
        json!({ "ok": true }),
    ));
    let (executor, registry) = executor(tools.clone(), 4);

    let graph = WorkflowGraph::new(
        vec![trigger("start"), tool("fetch", "http")],
        vec![Edge::new("start", "fetch")],
    );
    let result = executor
        .run(&graph, Map::new(), Map::new(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.outputs["fetch"]["result"], json!({ "ok": true }));
    assert_eq!(tools.call_count(), 2);
    let fetch = registry.metrics().filter(MetricsFilter {
        run_id: Some(result.run_id),
        processor_type: Some(NodeType::Tool),
    });
    assert_eq!(fetch.len(), 1);
    assert_eq!(fetch[0].retry_count, 1);
}

#[tokio::test(start_paused = true)]
async fn node_timeout_override_applies() {
    let tools = Arc::new(MockToolInvoker::returning(json!(null)).with_delay(Duration::from_secs(5)));
    let (executor, _) = executor(tools, 4);

    let graph = WorkflowGraph::new(
        vec![
            trigger("start"),
            NodeDefinition::new(
                "fetch",
                NodeType::Tool,
                json!({ "tool_id": "http", "timeout_ms": 100, "retry": { "enabled": false } }),
            ),
        ],
        vec![Edge::new("start", "fetch")],
    );

    match executor.run(&graph, Map::new(), Map::new(), CancellationToken::new()).await {
        Err(EngineError::Processor(failure)) => match failure.error {
            ProcessorError::Execution { cause, .. } => {
                assert!(matches!(*cause, ProcessorError::Timeout { timeout } if timeout == Duration::from_millis(100)));
            }
            other => panic!("expected an execution error, got {other:?}"),
        },
        other => panic!("expected a processor failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_the_run() {
    let tools = Arc::new(MockToolInvoker::returning(json!(null)).with_delay(Duration::from_secs(10)));
    let (executor, _) = executor(tools.clone(), 4);

    let graph = WorkflowGraph::new(
        vec![trigger("start"), tool("slow", "x"), tool("after", "y")],
        vec![Edge::new("start", "slow"), Edge::new("slow", "after")],
    );

    let cancel = CancellationToken::new();
    let trip = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trip.cancel();
    });

    let started = Instant::now();
    let outcome = executor.run(&graph, Map::new(), Map::new(), cancel).await;
    assert!(matches!(outcome, Err(EngineError::Cancelled)), "{outcome:?}");
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(tools.call_count(), 1);
}

// ============================================================
// Graph sources
// ============================================================

#[tokio::test]
async fn runs_a_workflow_loaded_from_a_source() {
    let tools = Arc::new(MockToolInvoker::returning(json!(null)));
    let (executor, _) = executor(tools, 4);
    let source = InMemoryGraphSource::new();
    let id = source.insert(WorkflowGraph::new(
        vec![trigger("start"), tool("fetch", "http")],
        vec![Edge::new("start", "fetch")],
    ));

    let result = executor
        .run_workflow(&source, id, Map::new(), Map::new(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.completed, vec!["start", "fetch"]);

    let missing = Uuid::new_v4();
    assert!(matches!(
        executor
            .run_workflow(&source, missing, Map::new(), Map::new(), CancellationToken::new())
            .await,
        Err(EngineError::WorkflowNotFound(id)) if id == missing
    ));
}
