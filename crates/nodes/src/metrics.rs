//! Per-invocation processor metrics and the collector that stores them.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::duration_ms;
use crate::NodeType;

/// Timing and outcome of one processor invocation. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorMetrics {
    pub processor_type: NodeType,
    pub node_id: String,
    pub run_id: Uuid,
    #[serde(with = "duration_ms")]
    pub pre_process_duration: Duration,
    #[serde(with = "duration_ms")]
    pub process_duration: Duration,
    #[serde(with = "duration_ms")]
    pub post_process_duration: Duration,
    #[serde(with = "duration_ms")]
    pub total_duration: Duration,
    pub success: bool,
    pub retry_count: u32,
    /// Error kind tag (see [`crate::ProcessorError::kind`]) when the invocation failed.
    pub error_type: Option<String>,
    /// Serialized size of the raw inputs, in bytes.
    pub input_size: usize,
    /// Serialized size of the result, in bytes.
    pub output_size: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Selects a subset of recorded metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsFilter {
    pub run_id: Option<Uuid>,
    pub processor_type: Option<NodeType>,
}

impl MetricsFilter {
    fn matches(&self, m: &ProcessorMetrics) -> bool {
        self.run_id.map_or(true, |id| m.run_id == id)
            && self.processor_type.map_or(true, |t| m.processor_type == t)
    }
}

/// Aggregate over a set of [`ProcessorMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub total_processors: usize,
    pub successful: usize,
    pub failed: usize,
    /// `successful / total_processors`, or 0 when nothing was recorded.
    pub success_rate: f64,
    pub by_type: BTreeMap<NodeType, TypeSummary>,
}

/// Per-processor-type slice of a [`MetricsSummary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeSummary {
    pub count: usize,
    pub successful: usize,
    #[serde(with = "duration_ms")]
    pub average_duration: Duration,
    pub success_rate: f64,
}

/// Append-only, concurrency-safe store of processor metrics.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    records: Mutex<Vec<ProcessorMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide collector for callers that do not inject their own.
    pub fn global() -> Arc<MetricsCollector> {
        static GLOBAL: OnceLock<Arc<MetricsCollector>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(MetricsCollector::new())).clone()
    }

    pub fn record(&self, metrics: ProcessorMetrics) {
        self.records.lock().push(metrics);
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Every record, in append order.
    pub fn all(&self) -> Vec<ProcessorMetrics> {
        self.records.lock().clone()
    }

    pub fn filter(&self, filter: MetricsFilter) -> Vec<ProcessorMetrics> {
        self.records
            .lock()
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect()
    }

    /// Summarize one run, or everything recorded when `run_id` is `None`.
    pub fn get_summary(&self, run_id: Option<Uuid>) -> MetricsSummary {
        let records = self.filter(MetricsFilter {
            run_id,
            processor_type: None,
        });
        summarize(&records)
    }
}

fn rate(successes: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        successes as f64 / total as f64
    }
}

fn summarize(records: &[ProcessorMetrics]) -> MetricsSummary {
    let total = records.len();
    let successful = records.iter().filter(|m| m.success).count();

    let mut grouped: BTreeMap<NodeType, (usize, usize, Duration)> = BTreeMap::new();
    for m in records {
        let entry = grouped.entry(m.processor_type).or_default();
        entry.0 += 1;
        entry.1 += usize::from(m.success);
        entry.2 += m.total_duration;
    }

    let by_type = grouped
        .into_iter()
        .map(|(kind, (count, ok, duration))| {
            let divisor = u32::try_from(count).unwrap_or(u32::MAX).max(1);
            (
                kind,
                TypeSummary {
                    count,
                    successful: ok,
                    average_duration: duration / divisor,
                    success_rate: rate(ok, count),
                },
            )
        })
        .collect();

    MetricsSummary {
        total_processors: total,
        successful,
        failed: total - successful,
        success_rate: rate(successful, total),
        by_type,
    }
}

// ---------------------------------------------------------------------------
// Recording guard
// ---------------------------------------------------------------------------

/// Builds one [`ProcessorMetrics`] record and appends it on drop, so a
/// record is emitted on every exit path of `execute`, including early
/// returns and a dropped (aborted) future.
pub(crate) struct MetricsGuard {
    collector: Arc<MetricsCollector>,
    started: Instant,
    record: ProcessorMetrics,
}

impl MetricsGuard {
    pub(crate) fn start(
        collector: Arc<MetricsCollector>,
        processor_type: NodeType,
        node_id: &str,
        run_id: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            collector,
            started: Instant::now(),
            record: ProcessorMetrics {
                processor_type,
                node_id: node_id.to_owned(),
                run_id,
                pre_process_duration: Duration::ZERO,
                process_duration: Duration::ZERO,
                post_process_duration: Duration::ZERO,
                total_duration: Duration::ZERO,
                success: false,
                retry_count: 0,
                error_type: None,
                input_size: 0,
                output_size: 0,
                started_at: now,
                finished_at: now,
            },
        }
    }

    pub(crate) fn record_mut(&mut self) -> &mut ProcessorMetrics {
        &mut self.record
    }

    pub(crate) fn succeed(&mut self, output_size: usize) {
        self.record.success = true;
        self.record.error_type = None;
        self.record.output_size = output_size;
    }

    pub(crate) fn fail(&mut self, error_type: &str, retry_count: u32) {
        self.record.success = false;
        self.record.retry_count = retry_count;
        self.record.error_type = Some(error_type.to_owned());
    }
}

impl Drop for MetricsGuard {
    fn drop(&mut self) {
        let mut record = self.record.clone();
        record.total_duration = self.started.elapsed();
        record.finished_at = Utc::now();
        if !record.success && record.error_type.is_none() {
            record.error_type = Some("aborted".to_owned());
        }
        self.collector.record(record);
    }
}
