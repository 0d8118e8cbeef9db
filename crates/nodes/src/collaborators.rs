//! Narrow contracts for the external collaborators the core consumes.
//!
//! Tool and agent business logic, and the storage behind reference
//! checks, live outside this workspace; processors and the validator only
//! see these traits.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ProcessorError;

/// Invokes a tool by id. Used only inside the Tool processor's `process` phase.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(
        &self,
        tool_id: &str,
        parameters: Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value, ProcessorError>;
}

/// Generation parameters forwarded to an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Token accounting reported by an agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Text or structured response from an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub content: Value,
    pub usage: TokenUsage,
}

/// Invokes an LLM-backed agent. Used only inside the Agent processor's `process` phase.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(
        &self,
        agent_id: &str,
        prompt_variables: Map<String, Value>,
        params: &GenerationParams,
    ) -> Result<AgentResponse, ProcessorError>;
}

/// Kind of entity a node configuration refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Tool,
    Agent,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReferenceKind::Tool => "tool",
            ReferenceKind::Agent => "agent",
        })
    }
}

/// Answers whether a referenced tool/agent exists and is active.
/// Used only by the validator's reference step.
#[async_trait]
pub trait ReferenceLookup: Send + Sync {
    async fn exists(&self, kind: ReferenceKind, id: &str) -> bool;
}
