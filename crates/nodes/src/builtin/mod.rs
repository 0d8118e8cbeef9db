//! Built-in processors, one per [`crate::NodeType`].

pub mod adapter;
pub mod aggregator;
pub mod agent;
pub mod condition;
pub mod tool;
pub mod trigger;

pub use adapter::{AdapterConfig, AdapterProcessor};
pub use aggregator::{AggregateMode, AggregatorConfig, AggregatorProcessor, Reducer};
pub use agent::{AgentConfig, AgentProcessor};
pub use condition::{ConditionConfig, ConditionProcessor};
pub use tool::{ToolConfig, ToolProcessor};
pub use trigger::{TriggerConfig, TriggerProcessor};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{NodeType, ProcessorError};

/// Deserialize a node's configuration, treating `null` as an empty object.
pub(crate) fn parse_config<T: DeserializeOwned>(
    node_type: NodeType,
    config: &Value,
) -> Result<T, ProcessorError> {
    let source = if config.is_null() {
        Value::Object(Map::new())
    } else {
        config.clone()
    };
    serde_json::from_value(source)
        .map_err(|e| ProcessorError::configuration(format!("invalid {node_type} configuration: {e}")))
}

/// Raw inputs must be a JSON object; `null` counts as an empty one.
pub(crate) fn input_object(raw_inputs: Value) -> Result<Map<String, Value>, ProcessorError> {
    match raw_inputs {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(ProcessorError::validation(format!(
            "expected an object of inputs, got {}",
            json_type(&other)
        ))),
    }
}

pub(crate) fn to_json<T: Serialize>(output: &T) -> Result<Value, ProcessorError> {
    serde_json::to_value(output)
        .map_err(|e| ProcessorError::validation(format!("output is not serializable: {e}")))
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), ProcessorError> {
    if value.trim().is_empty() {
        return Err(ProcessorError::configuration(format!("'{field}' must not be empty")));
    }
    Ok(())
}
