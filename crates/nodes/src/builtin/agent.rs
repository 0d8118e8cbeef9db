//! Agent processor: invokes an LLM-backed agent with rendered prompt variables.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{input_object, parse_config, require_non_empty, to_json};
use crate::collaborators::{GenerationParams, TokenUsage};
use crate::{AgentInvoker, ExecutionContext, NodeType, Processor, ProcessorError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_id: String,
    /// Prompt variables; string values may hold `{{ ... }}` references.
    #[serde(default)]
    pub prompt_variables: Map<String, Value>,
    #[serde(default)]
    pub generation: GenerationParams,
}

impl AgentConfig {
    pub fn from_value(config: &Value) -> Result<Self, ProcessorError> {
        let parsed: Self = parse_config(NodeType::Agent, config)?;
        require_non_empty("agent_id", &parsed.agent_id)?;
        Ok(parsed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentInput {
    pub prompt_variables: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentOutput {
    pub agent_id: String,
    pub response: Value,
    pub usage: TokenUsage,
}

pub struct AgentProcessor {
    config: AgentConfig,
    context: Arc<ExecutionContext>,
    agents: Arc<dyn AgentInvoker>,
}

impl AgentProcessor {
    pub fn new(
        config: &Value,
        context: Arc<ExecutionContext>,
        agents: Arc<dyn AgentInvoker>,
    ) -> Result<Self, ProcessorError> {
        Ok(Self {
            config: AgentConfig::from_value(config)?,
            context,
            agents,
        })
    }
}

#[async_trait]
impl Processor for AgentProcessor {
    type Input = AgentInput;
    type Output = AgentOutput;
    const NODE_TYPE: NodeType = NodeType::Agent;

    /// Render the configured prompt variables, then overlay an optional
    /// `variables` object from the raw inputs.
    fn pre_process(&self, raw_inputs: Value) -> Result<Self::Input, ProcessorError> {
        let mut inputs = input_object(raw_inputs)?;

        let rendered = self
            .context
            .render(&Value::Object(self.config.prompt_variables.clone()));
        let Value::Object(mut prompt_variables) = rendered else {
            return Err(ProcessorError::validation("prompt variables must render to an object"));
        };

        match inputs.remove("variables") {
            None | Some(Value::Null) => {}
            Some(Value::Object(overlay)) => prompt_variables.extend(overlay),
            Some(_) => return Err(ProcessorError::validation("input 'variables' must be an object")),
        }

        Ok(AgentInput { prompt_variables })
    }

    async fn process(&self, input: &Self::Input) -> Result<Self::Output, ProcessorError> {
        let response = self
            .agents
            .invoke(
                &self.config.agent_id,
                input.prompt_variables.clone(),
                &self.config.generation,
            )
            .await?;
        Ok(AgentOutput {
            agent_id: self.config.agent_id.clone(),
            response: response.content,
            usage: response.usage,
        })
    }

    fn post_process(&self, output: Self::Output) -> Result<Value, ProcessorError> {
        to_json(&output)
    }
}
