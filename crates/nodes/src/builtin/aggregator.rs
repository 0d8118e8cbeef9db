//! Aggregator processor: merges, lists or reduces the outputs of several
//! upstream nodes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::{input_object, json_type, parse_config, to_json};
use crate::template::lookup_path;
use crate::{NodeType, Processor, ProcessorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateMode {
    /// Shallow-merge object sources; later sources win.
    Merge,
    /// Collect sources into an array.
    List,
    /// Fold one field of every source with a [`Reducer`].
    Reduce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    Sum,
    Min,
    Max,
    Count,
    /// Concatenate strings or arrays.
    Concat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    pub mode: AggregateMode,
    #[serde(default)]
    pub reducer: Option<Reducer>,
    /// Dotted path read from each source in `reduce` mode.
    #[serde(default)]
    pub field: Option<String>,
    /// Upstream ids to aggregate, in order. Empty means every input, sorted by id.
    #[serde(default)]
    pub sources: Vec<String>,
}

impl AggregatorConfig {
    pub fn from_value(config: &Value) -> Result<Self, ProcessorError> {
        let parsed: Self = parse_config(NodeType::Aggregator, config)?;
        if parsed.mode == AggregateMode::Reduce && (parsed.reducer.is_none() || parsed.field.is_none()) {
            return Err(ProcessorError::configuration(
                "reduce mode requires both 'reducer' and 'field'",
            ));
        }
        Ok(parsed)
    }
}

/// Source values in aggregation order.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorInput {
    pub sources: Vec<(String, Value)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregatorOutput {
    pub mode: AggregateMode,
    pub result: Value,
    pub source_count: usize,
}

pub struct AggregatorProcessor {
    config: AggregatorConfig,
}

impl AggregatorProcessor {
    pub fn new(config: &Value) -> Result<Self, ProcessorError> {
        Ok(Self {
            config: AggregatorConfig::from_value(config)?,
        })
    }

    fn field(&self) -> &str {
        self.config.field.as_deref().unwrap_or_default()
    }
}

#[async_trait]
impl Processor for AggregatorProcessor {
    type Input = AggregatorInput;
    type Output = AggregatorOutput;
    const NODE_TYPE: NodeType = NodeType::Aggregator;

    fn pre_process(&self, raw_inputs: Value) -> Result<Self::Input, ProcessorError> {
        let mut inputs = input_object(raw_inputs)?;

        let sources: Vec<(String, Value)> = if self.config.sources.is_empty() {
            let mut all: Vec<_> = inputs.into_iter().collect();
            all.sort_by(|a, b| a.0.cmp(&b.0));
            all
        } else {
            self.config
                .sources
                .iter()
                .map(|id| {
                    inputs
                        .remove(id)
                        .map(|v| (id.clone(), v))
                        .ok_or_else(|| ProcessorError::validation(format!("missing input from source '{id}'")))
                })
                .collect::<Result<_, _>>()?
        };

        match self.config.mode {
            AggregateMode::Merge => {
                if let Some((id, v)) = sources.iter().find(|(_, v)| !v.is_object()) {
                    return Err(ProcessorError::validation(format!(
                        "merge needs object sources, '{id}' is {}",
                        json_type(v)
                    )));
                }
            }
            AggregateMode::Reduce => {
                let numeric = matches!(self.config.reducer, Some(Reducer::Sum | Reducer::Min | Reducer::Max));
                for (id, source) in &sources {
                    let value = lookup_path(source, self.field());
                    if numeric && value.is_some_and(|v| !v.is_number() && !v.is_null()) {
                        return Err(ProcessorError::validation(format!(
                            "field '{}' of source '{id}' is not a number",
                            self.field()
                        )));
                    }
                }
            }
            AggregateMode::List => {}
        }

        Ok(AggregatorInput { sources })
    }

    async fn process(&self, input: &Self::Input) -> Result<Self::Output, ProcessorError> {
        let result = match self.config.mode {
            AggregateMode::Merge => {
                let mut merged = Map::new();
                for (_, source) in &input.sources {
                    if let Value::Object(map) = source {
                        merged.extend(map.clone());
                    }
                }
                Value::Object(merged)
            }
            AggregateMode::List => Value::Array(input.sources.iter().map(|(_, v)| v.clone()).collect()),
            AggregateMode::Reduce => {
                let values: Vec<&Value> = input
                    .sources
                    .iter()
                    .filter_map(|(_, source)| lookup_path(source, self.field()))
                    .filter(|v| !v.is_null())
                    .collect();
                reduce(self.config.reducer.unwrap_or(Reducer::Count), &values)
            }
        };

        Ok(AggregatorOutput {
            mode: self.config.mode,
            result,
            source_count: input.sources.len(),
        })
    }

    fn post_process(&self, output: Self::Output) -> Result<Value, ProcessorError> {
        to_json(&output)
    }
}

fn number(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn reduce(reducer: Reducer, values: &[&Value]) -> Value {
    let numbers = || values.iter().filter_map(|v| v.as_f64());
    match reducer {
        Reducer::Count => Value::from(values.len()),
        Reducer::Sum => {
            // Integer sum while it fits, float sum otherwise.
            let exact = values
                .iter()
                .try_fold(0i64, |acc, v| v.as_i64().and_then(|n| acc.checked_add(n)));
            match exact {
                Some(total) => Value::from(total),
                None => number(numbers().sum()),
            }
        }
        Reducer::Min => numbers().reduce(f64::min).map_or(Value::Null, number),
        Reducer::Max => numbers().reduce(f64::max).map_or(Value::Null, number),
        Reducer::Concat => {
            if values.iter().all(|v| v.is_string()) {
                Value::String(values.iter().filter_map(|v| v.as_str()).collect())
            } else {
                Value::Array(
                    values
                        .iter()
                        .flat_map(|v| match v {
                            Value::Array(items) => items.clone(),
                            other => vec![(*other).clone()],
                        })
                        .collect(),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn run(config: Value, inputs: Value) -> Result<Value, ProcessorError> {
        let p = AggregatorProcessor::new(&config)?;
        let input = p.pre_process(inputs)?;
        p.post_process(p.process(&input).await?)
    }

    #[tokio::test]
    async fn merge_is_ordered_by_sources() {
        let out = run(
            json!({ "mode": "merge", "sources": ["b", "a"] }),
            json!({ "a": { "x": 1, "y": 1 }, "b": { "x": 2 } }),
        )
        .await
        .unwrap();
        assert_eq!(out["result"], json!({ "x": 1, "y": 1 }));
        assert_eq!(out["source_count"], 2);
    }

    #[tokio::test]
    async fn list_defaults_to_id_order() {
        let out = run(json!({ "mode": "list" }), json!({ "b": 2, "a": 1 })).await.unwrap();
        assert_eq!(out["result"], json!([1, 2]));
    }

    #[tokio::test]
    async fn reduce_sums_a_field() {
        let config = json!({ "mode": "reduce", "reducer": "sum", "field": "result.count" });
        let inputs = json!({ "a": { "result": { "count": 2 } }, "b": { "result": { "count": 5 } } });
        assert_eq!(run(config, inputs).await.unwrap()["result"], json!(7));

        let config = json!({ "mode": "reduce", "reducer": "max", "field": "v" });
        let inputs = json!({ "a": { "v": 1.5 }, "b": { "v": -3 } });
        assert_eq!(run(config, inputs).await.unwrap()["result"], json!(1.5));
    }

    #[tokio::test]
    async fn integer_sum_overflow_falls_back_to_float() {
        let config = json!({ "mode": "reduce", "reducer": "sum", "field": "v" });
        let inputs = json!({ "a": { "v": i64::MAX }, "b": { "v": 1 } });
        let total = run(config, inputs).await.unwrap()["result"].as_f64().unwrap();
        assert_eq!(total, i64::MAX as f64 + 1.0);
    }

    #[tokio::test]
    async fn reduce_concat_joins_strings_and_arrays() {
        let config = json!({ "mode": "reduce", "reducer": "concat", "field": "t" });
        let strings = json!({ "a": { "t": "ab" }, "b": { "t": "cd" } });
        assert_eq!(run(config.clone(), strings).await.unwrap()["result"], json!("abcd"));
        let arrays = json!({ "a": { "t": [1] }, "b": { "t": [2, 3] } });
        assert_eq!(run(config, arrays).await.unwrap()["result"], json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn shape_errors_are_validation_errors() {
        let merge_scalar = run(json!({ "mode": "merge" }), json!({ "a": 3 })).await;
        assert!(matches!(merge_scalar, Err(ProcessorError::Validation { .. })));

        let missing = run(json!({ "mode": "list", "sources": ["ghost"] }), json!({})).await;
        assert!(matches!(missing, Err(ProcessorError::Validation { .. })));

        let text_sum = run(
            json!({ "mode": "reduce", "reducer": "sum", "field": "v" }),
            json!({ "a": { "v": "1" } }),
        )
        .await;
        assert!(matches!(text_sum, Err(ProcessorError::Validation { .. })));
    }

    #[test]
    fn reduce_requires_reducer_and_field() {
        assert!(matches!(
            AggregatorProcessor::new(&json!({ "mode": "reduce", "field": "v" })).err(),
            Some(ProcessorError::Configuration { .. })
        ));
    }
}
