//! Trigger processor: initializes a run from the trigger payload.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{input_object, parse_config, to_json};
use crate::{ExecutionContext, NodeType, Processor, ProcessorError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// How the run was started (`manual`, `webhook`, `cron`, ...). Informational.
    #[serde(default = "default_trigger_type")]
    pub trigger_type: String,
}

fn default_trigger_type() -> String {
    "manual".to_owned()
}

impl TriggerConfig {
    pub fn from_value(config: &Value) -> Result<Self, ProcessorError> {
        parse_config(NodeType::Trigger, config)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerOutput {
    pub trigger_type: String,
    pub run_id: Uuid,
    pub triggered_at: DateTime<Utc>,
    pub payload: Map<String, Value>,
}

pub struct TriggerProcessor {
    config: TriggerConfig,
    context: Arc<ExecutionContext>,
}

impl TriggerProcessor {
    pub fn new(config: &Value, context: Arc<ExecutionContext>) -> Result<Self, ProcessorError> {
        Ok(Self {
            config: TriggerConfig::from_value(config)?,
            context,
        })
    }
}

#[async_trait]
impl Processor for TriggerProcessor {
    type Input = Map<String, Value>;
    type Output = TriggerOutput;
    const NODE_TYPE: NodeType = NodeType::Trigger;

    fn pre_process(&self, raw_inputs: Value) -> Result<Self::Input, ProcessorError> {
        input_object(raw_inputs)
    }

    async fn process(&self, input: &Self::Input) -> Result<Self::Output, ProcessorError> {
        Ok(TriggerOutput {
            trigger_type: self.config.trigger_type.clone(),
            run_id: self.context.run_id(),
            triggered_at: Utc::now(),
            payload: input.clone(),
        })
    }

    fn post_process(&self, output: Self::Output) -> Result<Value, ProcessorError> {
        to_json(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn stamps_run_id_and_payload() {
        let ctx = Arc::new(ExecutionContext::new(Map::new()));
        let trigger = TriggerProcessor::new(&json!({ "trigger_type": "webhook" }), ctx.clone()).unwrap();

        let input = trigger.pre_process(json!({ "order": 7 })).unwrap();
        let out = trigger.post_process(trigger.process(&input).await.unwrap()).unwrap();

        assert_eq!(out["trigger_type"], "webhook");
        assert_eq!(out["run_id"], json!(ctx.run_id()));
        assert_eq!(out["payload"], json!({ "order": 7 }));
    }

    #[test]
    fn defaults_to_manual_and_rejects_scalar_payloads() {
        let ctx = Arc::new(ExecutionContext::new(Map::new()));
        let trigger = TriggerProcessor::new(&Value::Null, ctx).unwrap();
        assert_eq!(trigger.config.trigger_type, "manual");
        assert!(matches!(
            trigger.pre_process(json!(42)),
            Err(ProcessorError::Validation { .. })
        ));
    }
}
