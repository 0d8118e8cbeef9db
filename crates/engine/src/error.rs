//! Engine-level error types.

use nodes::{ContextError, ProcessorFailure};
use thiserror::Error;
use tokio::task::JoinError;
use uuid::Uuid;

use crate::validator::ValidationResult;

/// Errors produced by the workflow engine (topology + execution).
///
/// Validation findings are not errors; they are returned as data in a
/// [`ValidationResult`]. This type only appears when a caller asks for
/// something the graph cannot provide.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Graph errors ------

    /// The graph contains a cycle; carries the path `[n0, ..., n0]`.
    #[error("workflow graph contains a cycle: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    /// The graph was rejected by validation before execution.
    #[error("workflow graph is invalid ({} error(s))", .0.errors.len())]
    InvalidGraph(Box<ValidationResult>),

    /// A graph source has no workflow with this id.
    #[error("workflow '{0}' not found")]
    WorkflowNotFound(Uuid),

    // ------ Execution errors ------

    /// A node failed; the whole run is aborted.
    #[error(transparent)]
    Processor(#[from] ProcessorFailure),

    #[error(transparent)]
    Context(#[from] ContextError),

    /// The run was cancelled before every node finished.
    #[error("workflow run cancelled")]
    Cancelled,

    /// A node task panicked or was aborted.
    #[error("node task failed: {0}")]
    TaskJoin(#[from] JoinError),
}
