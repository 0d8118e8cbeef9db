//! Adapter processor: declarative projection of the inputs into a new shape.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{input_object, parse_config};
use crate::template::lookup_path;
use crate::{NodeType, Processor, ProcessorError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Output key → dotted path into the inputs.
    pub mappings: BTreeMap<String, String>,
    /// Fallbacks for mappings whose path is missing.
    #[serde(default)]
    pub defaults: Map<String, Value>,
}

impl AdapterConfig {
    pub fn from_value(config: &Value) -> Result<Self, ProcessorError> {
        let parsed: Self = parse_config(NodeType::Adapter, config)?;
        if parsed.mappings.is_empty() {
            return Err(ProcessorError::configuration("'mappings' must not be empty"));
        }
        Ok(parsed)
    }
}

pub struct AdapterProcessor {
    config: AdapterConfig,
}

impl AdapterProcessor {
    pub fn new(config: &Value) -> Result<Self, ProcessorError> {
        Ok(Self {
            config: AdapterConfig::from_value(config)?,
        })
    }
}

#[async_trait]
impl Processor for AdapterProcessor {
    type Input = Value;
    type Output = Map<String, Value>;
    const NODE_TYPE: NodeType = NodeType::Adapter;

    fn pre_process(&self, raw_inputs: Value) -> Result<Self::Input, ProcessorError> {
        input_object(raw_inputs).map(Value::Object)
    }

    async fn process(&self, input: &Self::Input) -> Result<Self::Output, ProcessorError> {
        let mut output = Map::new();
        for (key, path) in &self.config.mappings {
            let value = lookup_path(input, path)
                .or_else(|| self.config.defaults.get(key))
                .cloned()
                .unwrap_or(Value::Null);
            output.insert(key.clone(), value);
        }
        Ok(output)
    }

    fn post_process(&self, output: Self::Output) -> Result<Value, ProcessorError> {
        Ok(Value::Object(output))
    }
}
