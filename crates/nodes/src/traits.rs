//! The processor contracts.

use async_trait::async_trait;
use serde_json::Value;

use crate::{NodeType, ProcessorError, ProcessorFailure};

/// Typed three-phase lifecycle implemented by every node type.
///
/// Implementations only describe what each phase does; retries, the
/// per-attempt timeout and metrics are applied by
/// [`crate::ProcessorRunner`].
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    /// Validated, typed input produced by `pre_process`.
    type Input: Send + Sync;
    /// Typed result of `process`.
    type Output: Send;

    /// The node type this processor handles.
    const NODE_TYPE: NodeType;

    /// Validate and coerce the raw inputs. Failures here are never retried.
    fn pre_process(&self, raw_inputs: Value) -> Result<Self::Input, ProcessorError>;

    /// The side-effecting core. May be invoked more than once with the same input.
    async fn process(&self, input: &Self::Input) -> Result<Self::Output, ProcessorError>;

    /// Flatten the typed output for storage in the execution context.
    fn post_process(&self, output: Self::Output) -> Result<Value, ProcessorError>;
}

/// Object-safe entry point the engine dispatches through.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    fn node_type(&self) -> NodeType;

    fn node_id(&self) -> &str;

    /// Run the full lifecycle and return the serialized result.
    async fn execute(&self, raw_inputs: Value) -> Result<Value, ProcessorFailure>;
}
