//! `nodes` crate — the processor framework and built-in node processors.
//!
//! Every node type is handled by a [`Processor`] (typed three-phase
//! lifecycle). The [`ProcessorRunner`] wraps a processor with retry,
//! per-attempt timeout and metrics emission, and exposes it to the engine
//! as an [`ExecutableNode`] trait object.

pub mod builtin;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod mock;
pub mod node_type;
pub mod template;
pub mod traits;

pub use builtin::condition::{Operator, Rule};
pub use collaborators::{AgentInvoker, ReferenceKind, ReferenceLookup, ToolInvoker};
pub use config::{ProcessorConfig, RetryPolicy};
pub use context::ExecutionContext;
pub use error::{ContextError, FailureCategory, Phase, ProcessorError, ProcessorFailure};
pub use lifecycle::ProcessorRunner;
pub use metrics::{MetricsCollector, MetricsFilter, MetricsSummary, ProcessorMetrics};
pub use node_type::NodeType;
pub use traits::{ExecutableNode, Processor};
