//! Processor-level error types.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::NodeType;

/// Category of a `process`-phase failure.
///
/// The retry policy's allow-list is expressed in these categories; a
/// failure is only retried when its category is on the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Short-lived fault (connection reset, temporary unavailability).
    Transient,
    /// A single attempt exceeded its deadline.
    Timeout,
    /// The collaborator asked us to slow down.
    RateLimited,
    /// The collaborator is down or unreachable.
    Unavailable,
    /// A permanent fault inside the processor or collaborator.
    Internal,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::Transient => "transient",
            FailureCategory::Timeout => "timeout",
            FailureCategory::RateLimited => "rate_limited",
            FailureCategory::Unavailable => "unavailable",
            FailureCategory::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a processor or by the lifecycle around it.
///
/// The lifecycle uses the variant to decide retry behaviour:
/// - `Validation` / `Configuration`: never retried.
/// - `Failed` / `Timeout`: retried when the category is allow-listed,
///   then wrapped into `Execution` once attempts run out.
/// - `Cancelled`: the run was cancelled; never retried.
#[derive(Debug, Clone, Error)]
pub enum ProcessorError {
    /// Input or output did not have the expected shape.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// `process` kept failing; carries the attempt count and the last cause.
    #[error("execution failed after {attempts} attempt(s): {cause}")]
    Execution {
        attempts: u32,
        #[source]
        cause: Box<ProcessorError>,
    },

    /// A single attempt exceeded its deadline.
    #[error("attempt exceeded timeout of {timeout:?}")]
    Timeout { timeout: Duration },

    /// The processor was set up with an invalid configuration.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// No processor is registered for the requested node type.
    #[error("no processor registered for node type '{tag}'")]
    NotFound { tag: String },

    /// A raw failure reported by a processor or one of its collaborators.
    #[error("{category} failure: {message}")]
    Failed {
        category: FailureCategory,
        message: String,
    },

    /// The surrounding run was cancelled.
    #[error("execution cancelled")]
    Cancelled,
}

impl ProcessorError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn failed(category: FailureCategory, message: impl Into<String>) -> Self {
        Self::Failed {
            category,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::failed(FailureCategory::Transient, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::failed(FailureCategory::Internal, message)
    }

    /// Retry category, if this error is subject to the retry policy at all.
    pub fn category(&self) -> Option<FailureCategory> {
        match self {
            Self::Failed { category, .. } => Some(*category),
            Self::Timeout { .. } => Some(FailureCategory::Timeout),
            _ => None,
        }
    }

    /// Short machine-readable tag recorded in [`crate::ProcessorMetrics`].
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Execution { .. } => "execution_error",
            Self::Timeout { .. } => "timeout_error",
            Self::Configuration { .. } => "configuration_error",
            Self::NotFound { .. } => "not_found_error",
            Self::Failed { .. } => "process_failure",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether this error (or the cause of an `Execution` error) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Execution { cause, .. } => cause.is_cancelled(),
            _ => false,
        }
    }
}

/// Lifecycle phase in which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Registry lookup and processor construction.
    Setup,
    PreProcess,
    Process,
    PostProcess,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Setup => "setup",
            Phase::PreProcess => "pre_process",
            Phase::Process => "process",
            Phase::PostProcess => "post_process",
        })
    }
}

/// A [`ProcessorError`] attributed to the node that raised it.
///
/// This is what [`crate::ExecutableNode::execute`] returns, so an
/// orchestrator can log the failure and mark the run without re-deriving
/// which node, phase or attempt it came from.
#[derive(Debug, Clone, Error)]
#[error("{node_type} node '{node_id}' failed in {phase} after {retry_count} retries: {error}")]
pub struct ProcessorFailure {
    pub node_type: NodeType,
    pub node_id: String,
    pub phase: Phase,
    pub retry_count: u32,
    #[source]
    pub error: ProcessorError,
}

impl ProcessorFailure {
    pub fn new(
        node_type: NodeType,
        node_id: impl Into<String>,
        phase: Phase,
        retry_count: u32,
        error: ProcessorError,
    ) -> Self {
        Self {
            node_type,
            node_id: node_id.into(),
            phase,
            retry_count,
            error,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.is_cancelled()
    }
}

/// Errors raised by the [`crate::ExecutionContext`].
#[derive(Debug, Error)]
pub enum ContextError {
    /// Node outputs are write-once.
    #[error("output for node '{0}' has already been recorded")]
    OutputAlreadySet(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_failed_and_timeout_have_retry_categories() {
        assert_eq!(
            ProcessorError::transient("reset").category(),
            Some(FailureCategory::Transient)
        );
        assert_eq!(
            ProcessorError::Timeout {
                timeout: Duration::from_secs(1)
            }
            .category(),
            Some(FailureCategory::Timeout)
        );
        assert_eq!(ProcessorError::validation("bad").category(), None);
        assert_eq!(ProcessorError::configuration("bad").category(), None);
        assert_eq!(ProcessorError::Cancelled.category(), None);
    }

    #[test]
    fn failure_display_carries_attribution() {
        let failure = ProcessorFailure::new(
            NodeType::Tool,
            "fetch",
            Phase::Process,
            2,
            ProcessorError::Execution {
                attempts: 3,
                cause: Box::new(ProcessorError::transient("connection reset")),
            },
        );
        let text = failure.to_string();
        assert!(text.contains("tool node 'fetch'"));
        assert!(text.contains("process after 2 retries"));
        assert!(text.contains("3 attempt(s)"));
    }
}
