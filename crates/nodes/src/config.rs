//! Processor tuning knobs: retry policy and per-attempt timeout.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{FailureCategory, ProcessorError};

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Retry behaviour for the `process` phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// When false every processor gets exactly one attempt.
    pub enabled: bool,
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(rename = "initial_delay_ms", with = "duration_ms")]
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,
    /// Multiplier applied per retry.
    pub backoff_factor: f64,
    /// Failure categories that may be retried.
    pub retryable_categories: Vec<FailureCategory>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            retryable_categories: vec![
                FailureCategory::Transient,
                FailureCategory::Timeout,
                FailureCategory::RateLimited,
                FailureCategory::Unavailable,
            ],
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Total attempts `process` may get, the first one included.
    pub fn max_attempts(&self) -> u32 {
        if self.enabled {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }

    pub fn is_retryable(&self, category: FailureCategory) -> bool {
        self.enabled && self.retryable_categories.contains(&category)
    }

    /// Delay before retry number `retry` (0-based):
    /// `min(initial_delay * backoff_factor^retry, max_delay)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }
}

// ---------------------------------------------------------------------------
// Processor configuration
// ---------------------------------------------------------------------------

/// Per-invocation configuration handed to a processor by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub retry: RetryPolicy,
    /// Deadline for a single `process` attempt.
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ProcessorConfig {
    /// Apply the `retry` and `timeout_ms` overrides a node may carry in
    /// its own configuration.
    ///
    /// A `retry` override replaces the whole policy; fields it omits take
    /// their [`RetryPolicy::default`] values.
    ///
    /// # Errors
    /// [`ProcessorError::Configuration`] if an override is malformed.
    pub fn with_overrides(&self, node_config: &Value) -> Result<Self, ProcessorError> {
        let mut merged = self.clone();

        if let Some(retry) = node_config.get("retry") {
            merged.retry = serde_json::from_value(retry.clone())
                .map_err(|e| ProcessorError::configuration(format!("invalid retry override: {e}")))?;
        }

        if let Some(timeout) = node_config.get("timeout_ms") {
            let millis = timeout.as_u64().ok_or_else(|| {
                ProcessorError::configuration("timeout_ms must be a non-negative integer")
            })?;
            merged.timeout = Duration::from_millis(millis);
        }

        Ok(merged)
    }
}

/// (De)serialize a [`Duration`] as integer milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
