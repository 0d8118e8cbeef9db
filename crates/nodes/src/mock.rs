//! Test doubles for the external collaborators.
//!
//! Useful in unit and integration tests where a real tool runtime, agent
//! backend or reference store is either unavailable or irrelevant.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::collaborators::{AgentResponse, GenerationParams, TokenUsage};
use crate::{AgentInvoker, ProcessorError, ReferenceKind, ReferenceLookup, ToolInvoker};

/// A mock tool runtime that records every call and replays a script of
/// results. Once the script is exhausted the fallback result is returned.
pub struct MockToolInvoker {
    script: Mutex<VecDeque<Result<Value, ProcessorError>>>,
    fallback: Result<Value, ProcessorError>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl MockToolInvoker {
    /// Always succeed with `value`.
    pub fn returning(value: Value) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Ok(value),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always fail with `error`.
    pub fn failing(error: ProcessorError) -> Self {
        Self {
            fallback: Err(error),
            ..Self::returning(Value::Null)
        }
    }

    /// Replay `results` in order, then fall back to `then`.
    pub fn scripted(results: Vec<Result<Value, ProcessorError>>, then: Value) -> Self {
        Self {
            script: Mutex::new(results.into()),
            ..Self::returning(then)
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every `(tool_id, parameters)` seen, in call order.
    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ToolInvoker for MockToolInvoker {
    async fn invoke(
        &self,
        tool_id: &str,
        parameters: Map<String, Value>,
        _timeout: Duration,
    ) -> Result<Value, ProcessorError> {
        self.calls.lock().push((tool_id.to_owned(), parameters));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// A mock agent backend that always answers with the same content and a
/// fixed token usage of 10 prompt + 5 completion tokens.
pub struct MockAgentInvoker {
    content: Value,
    calls: Mutex<Vec<String>>,
}

impl MockAgentInvoker {
    pub fn returning(content: Value) -> Self {
        Self {
            content,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl AgentInvoker for MockAgentInvoker {
    async fn invoke(
        &self,
        agent_id: &str,
        _prompt_variables: Map<String, Value>,
        _params: &GenerationParams,
    ) -> Result<AgentResponse, ProcessorError> {
        self.calls.lock().push(agent_id.to_owned());
        Ok(AgentResponse {
            content: self.content.clone(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
        })
    }
}

/// Reference lookup backed by a fixed set of known tools and agents.
#[derive(Debug, Default)]
pub struct StaticReferenceLookup {
    known: HashSet<(ReferenceKind, String)>,
}

impl StaticReferenceLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: ReferenceKind, id: impl Into<String>) -> Self {
        self.known.insert((kind, id.into()));
        self
    }
}

#[async_trait]
impl ReferenceLookup for StaticReferenceLookup {
    async fn exists(&self, kind: ReferenceKind, id: &str) -> bool {
        self.known.contains(&(kind, id.to_owned()))
    }
}
