//! Tool processor: invokes an external tool with rendered parameters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{input_object, parse_config, require_non_empty, to_json};
use crate::{ExecutionContext, NodeType, Processor, ProcessorError, ToolInvoker};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    pub tool_id: String,
    /// Static parameters; string values may hold `{{ ... }}` references.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl ToolConfig {
    pub fn from_value(config: &Value) -> Result<Self, ProcessorError> {
        let parsed: Self = parse_config(NodeType::Tool, config)?;
        require_non_empty("tool_id", &parsed.tool_id)?;
        Ok(parsed)
    }
}

/// Parameters after template rendering and input overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInput {
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolOutput {
    pub tool_id: String,
    pub result: Value,
}

pub struct ToolProcessor {
    config: ToolConfig,
    context: Arc<ExecutionContext>,
    tools: Arc<dyn ToolInvoker>,
    timeout: Duration,
}

impl ToolProcessor {
    pub fn new(
        config: &Value,
        context: Arc<ExecutionContext>,
        tools: Arc<dyn ToolInvoker>,
        timeout: Duration,
    ) -> Result<Self, ProcessorError> {
        Ok(Self {
            config: ToolConfig::from_value(config)?,
            context,
            tools,
            timeout,
        })
    }
}

#[async_trait]
impl Processor for ToolProcessor {
    type Input = ToolInput;
    type Output = ToolOutput;
    const NODE_TYPE: NodeType = NodeType::Tool;

    /// Render the configured parameters, then overlay an optional
    /// `parameters` object from the raw inputs (input keys win).
    fn pre_process(&self, raw_inputs: Value) -> Result<Self::Input, ProcessorError> {
        let mut inputs = input_object(raw_inputs)?;

        let rendered = self.context.render(&Value::Object(self.config.parameters.clone()));
        let Value::Object(mut parameters) = rendered else {
            return Err(ProcessorError::validation("tool parameters must render to an object"));
        };

        match inputs.remove("parameters") {
            None | Some(Value::Null) => {}
            Some(Value::Object(overlay)) => parameters.extend(overlay),
            Some(_) => {
                return Err(ProcessorError::validation("input 'parameters' must be an object"));
            }
        }

        Ok(ToolInput { parameters })
    }

    async fn process(&self, input: &Self::Input) -> Result<Self::Output, ProcessorError> {
        let result = self
            .tools
            .invoke(&self.config.tool_id, input.parameters.clone(), self.timeout)
            .await?;
        Ok(ToolOutput {
            tool_id: self.config.tool_id.clone(),
            result,
        })
    }

    fn post_process(&self, output: Self::Output) -> Result<Value, ProcessorError> {
        to_json(&output)
    }
}
