//! Graph snapshot sources.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::models::WorkflowGraph;
use crate::EngineError;

/// Hands out the current graph of a workflow as an immutable snapshot.
/// The engine never writes back.
#[async_trait]
pub trait GraphSource: Send + Sync {
    async fn load(&self, workflow_id: Uuid) -> Result<WorkflowGraph, EngineError>;
}

/// A [`GraphSource`] kept in memory, for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryGraphSource {
    graphs: RwLock<HashMap<Uuid, WorkflowGraph>>,
}

impl InMemoryGraphSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `graph` under a fresh id and return it.
    pub fn insert(&self, graph: WorkflowGraph) -> Uuid {
        let id = Uuid::new_v4();
        self.graphs.write().insert(id, graph);
        id
    }

    /// Replace the graph stored under `id`.
    pub fn put(&self, id: Uuid, graph: WorkflowGraph) {
        self.graphs.write().insert(id, graph);
    }
}

#[async_trait]
impl GraphSource for InMemoryGraphSource {
    async fn load(&self, workflow_id: Uuid) -> Result<WorkflowGraph, EngineError> {
        self.graphs
            .read()
            .get(&workflow_id)
            .cloned()
            .ok_or(EngineError::WorkflowNotFound(workflow_id))
    }
}
