//! `engine` crate — graph model, DAG validation, topology, the processor
//! registry and the level-parallel execution engine.

pub mod error;
pub mod executor;
pub mod graph;
pub mod models;
pub mod registry;
pub mod source;
pub mod topology;
pub mod validator;

pub use error::EngineError;
pub use executor::{ExecutionResult, ExecutorConfig, WorkflowExecutor};
pub use graph::GraphView;
pub use models::{DataSchema, Edge, NodeDefinition, SchemaType, WorkflowGraph};
pub use registry::{ProcessorConstructor, ProcessorRegistry};
pub use source::{GraphSource, InMemoryGraphSource};
pub use topology::{get_topology, would_create_cycle, Topology};
pub use validator::{
    validate, DagValidator, IssueKind, ValidationIssue, ValidationLevel, ValidationOptions,
    ValidationResult,
};

#[cfg(test)]
mod executor_tests;
