//! Execution topology: dependency levels plus the critical path.

use serde::{Deserialize, Serialize};

use crate::graph::GraphView;
use crate::models::WorkflowGraph;
use crate::EngineError;

/// Levels of node ids. Members of one level share no edge, and every
/// edge goes from a lower level to a strictly higher one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub levels: Vec<Vec<String>>,
    /// Longest dependency chain, in execution order.
    pub critical_path: Vec<String>,
    /// Number of edges on the critical path.
    pub critical_path_length: usize,
}

impl Topology {
    pub(crate) fn from_view(view: &GraphView<'_>) -> Self {
        let (critical_path, critical_path_length) = view.critical_path();
        Self {
            levels: view.topological_levels(),
            critical_path,
            critical_path_length,
        }
    }

    /// Index of the level holding `node_id`.
    pub fn level_of(&self, node_id: &str) -> Option<usize> {
        self.levels
            .iter()
            .position(|level| level.iter().any(|id| id == node_id))
    }

    pub fn node_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }
}

/// Compute the topology of an acyclic graph.
///
/// # Errors
/// [`EngineError::CycleDetected`] if the graph is not acyclic.
pub fn get_topology(graph: &WorkflowGraph) -> Result<Topology, EngineError> {
    let view = GraphView::new(graph);
    if let Some(cycle) = view.detect_cycle() {
        return Err(EngineError::CycleDetected(cycle));
    }
    Ok(Topology::from_view(&view))
}

/// Whether adding `source -> target` to `graph` would close a loop.
/// The graph is not modified.
pub fn would_create_cycle(graph: &WorkflowGraph, source: &str, target: &str) -> bool {
    GraphView::new(graph).would_create_cycle(source, target)
}
