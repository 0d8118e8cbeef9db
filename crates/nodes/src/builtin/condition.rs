//! Condition processor: picks an outgoing branch by evaluating rules
//! against the inputs and the run variables.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{input_object, parse_config, require_non_empty, to_json};
use crate::template::lookup_path;
use crate::{ExecutionContext, NodeType, Processor, ProcessorError};

/// Comparison applied by a [`Rule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[serde(alias = "==")]
    Eq,
    #[serde(alias = "!=")]
    Ne,
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = ">=")]
    Gte,
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "<=")]
    Lte,
    /// Substring, array membership or object key.
    Contains,
    Exists,
    Truthy,
}

/// A single predicate over a value found at `variable`.
///
/// `variable` is a dotted path; `nodes.<id>.<path>` reads an upstream
/// output, anything else reads the run variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub variable: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

impl Rule {
    pub fn evaluate(&self, subject: Option<&Value>) -> bool {
        let Some(subject) = subject else {
            return matches!(self.operator, Operator::Ne) && !self.value.is_null();
        };
        match self.operator {
            Operator::Exists => !subject.is_null(),
            Operator::Truthy => truthy(subject),
            Operator::Eq => loosely_equal(subject, &self.value),
            Operator::Ne => !loosely_equal(subject, &self.value),
            Operator::Gt => compare(subject, &self.value) == Some(Ordering::Greater),
            Operator::Gte => matches!(
                compare(subject, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Lt => compare(subject, &self.value) == Some(Ordering::Less),
            Operator::Lte => matches!(
                compare(subject, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::Contains => contains(subject, &self.value),
        }
    }

    /// Evaluate against the run context only.
    pub fn evaluate_in(&self, context: &ExecutionContext) -> bool {
        let subject = context.resolve_reference(&self.variable);
        self.evaluate(subject.as_ref())
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(h), Value::String(n)) => h.contains(n.as_str()),
        (Value::Array(items), n) => items.iter().any(|item| loosely_equal(item, n)),
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}

/// A rule and the handle taken when it matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionBranch {
    pub handle: String,
    #[serde(flatten)]
    pub rule: Rule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    /// Evaluated in order; the first match wins.
    pub conditions: Vec<ConditionBranch>,
    /// Taken when no rule matches.
    #[serde(default = "default_handle")]
    pub default_handle: String,
}

fn default_handle() -> String {
    "default".to_owned()
}

impl ConditionConfig {
    /// Parse and check that at least two distinct branch handles exist.
    pub fn from_value(config: &Value) -> Result<Self, ProcessorError> {
        let parsed: Self = parse_config(NodeType::Condition, config)?;
        for branch in &parsed.conditions {
            require_non_empty("handle", &branch.handle)?;
        }
        require_non_empty("default_handle", &parsed.default_handle)?;

        let handles = parsed.handles();
        if handles.len() < 2 {
            return Err(ProcessorError::configuration(format!(
                "a condition needs at least two distinct outgoing handles, found {handles:?}"
            )));
        }
        Ok(parsed)
    }

    /// Distinct branch handles in declaration order, default last.
    pub fn handles(&self) -> Vec<String> {
        let mut handles: Vec<String> = Vec::new();
        let all = self
            .conditions
            .iter()
            .map(|b| &b.handle)
            .chain(std::iter::once(&self.default_handle));
        for handle in all {
            if !handles.contains(handle) {
                handles.push(handle.clone());
            }
        }
        handles
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionOutput {
    pub branch: String,
    /// Index of the matching rule; `None` when the default branch was taken.
    pub matched_rule: Option<usize>,
}

pub struct ConditionProcessor {
    config: ConditionConfig,
    context: Arc<ExecutionContext>,
}

impl ConditionProcessor {
    pub fn new(config: &Value, context: Arc<ExecutionContext>) -> Result<Self, ProcessorError> {
        Ok(Self {
            config: ConditionConfig::from_value(config)?,
            context,
        })
    }
}

#[async_trait]
impl Processor for ConditionProcessor {
    /// Values that shadow run variables of the same path.
    type Input = Value;
    type Output = ConditionOutput;
    const NODE_TYPE: NodeType = NodeType::Condition;

    fn pre_process(&self, raw_inputs: Value) -> Result<Self::Input, ProcessorError> {
        input_object(raw_inputs).map(Value::Object)
    }

    async fn process(&self, input: &Self::Input) -> Result<Self::Output, ProcessorError> {
        for (index, branch) in self.config.conditions.iter().enumerate() {
            let subject = lookup_path(input, &branch.rule.variable)
                .cloned()
                .or_else(|| self.context.resolve_reference(&branch.rule.variable));
            if branch.rule.evaluate(subject.as_ref()) {
                return Ok(ConditionOutput {
                    branch: branch.handle.clone(),
                    matched_rule: Some(index),
                });
            }
        }
        Ok(ConditionOutput {
            branch: self.config.default_handle.clone(),
            matched_rule: None,
        })
    }

    fn post_process(&self, output: Self::Output) -> Result<Value, ProcessorError> {
        to_json(&output)
    }
}
