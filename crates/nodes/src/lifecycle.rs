//! The composed `execute` lifecycle: pre-process, process with
//! retry/timeout, post-process, and one metrics record per invocation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

use crate::metrics::MetricsGuard;
use crate::{
    ExecutableNode, ExecutionContext, MetricsCollector, NodeType, Phase, Processor,
    ProcessorConfig, ProcessorError, ProcessorFailure,
};

/// Wraps a [`Processor`] with the retry policy, timeout and metrics
/// emission shared by every node type.
pub struct ProcessorRunner<P: Processor> {
    processor: P,
    node_id: String,
    context: Arc<ExecutionContext>,
    config: ProcessorConfig,
    metrics: Arc<MetricsCollector>,
}

/// Outcome of the `process` phase: the output or the final error, plus
/// how many retries were spent getting there.
struct ProcessOutcome<T> {
    result: Result<T, ProcessorError>,
    retries: u32,
}

impl<P: Processor> ProcessorRunner<P> {
    pub fn new(
        processor: P,
        node_id: impl Into<String>,
        context: Arc<ExecutionContext>,
        config: ProcessorConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            processor,
            node_id: node_id.into(),
            context,
            config,
            metrics,
        }
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    fn failure(
        &self,
        guard: &mut MetricsGuard,
        phase: Phase,
        retry_count: u32,
        error: ProcessorError,
    ) -> ProcessorFailure {
        guard.fail(error.kind(), retry_count);
        error!(
            node_id = %self.node_id,
            node_type = %P::NODE_TYPE,
            %phase,
            retry_count,
            "processor failed: {error}"
        );
        ProcessorFailure::new(P::NODE_TYPE, self.node_id.clone(), phase, retry_count, error)
    }

    /// Run `process` under the retry policy.
    ///
    /// Each attempt races the per-attempt timeout and the run's
    /// cancellation token; the backoff sleep is also cancellable.
    async fn process_with_retry(&self, input: &P::Input) -> ProcessOutcome<P::Output> {
        let policy = &self.config.retry;
        let max_attempts = policy.max_attempts();
        let cancel = self.context.cancellation();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let retries = attempt - 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ProcessorError::Cancelled),
                timed = tokio::time::timeout(self.config.timeout, self.processor.process(input)) => {
                    timed.unwrap_or(Err(ProcessorError::Timeout { timeout: self.config.timeout }))
                }
            };

            let error = match outcome {
                Ok(output) => {
                    return ProcessOutcome {
                        result: Ok(output),
                        retries,
                    }
                }
                Err(error) => error,
            };

            let Some(category) = error.category() else {
                // Validation, configuration and cancellation fail fast.
                return ProcessOutcome {
                    result: Err(error),
                    retries,
                };
            };

            if !policy.is_retryable(category) || attempt >= max_attempts {
                return ProcessOutcome {
                    result: Err(ProcessorError::Execution {
                        attempts: attempt,
                        cause: Box::new(error),
                    }),
                    retries,
                };
            }

            let delay = policy.delay_for(retries);
            warn!(
                node_id = %self.node_id,
                "retryable {category} failure (attempt {attempt}/{max_attempts}), retrying in {delay:?}: {error}"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return ProcessOutcome {
                        result: Err(ProcessorError::Cancelled),
                        retries,
                    };
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn json_size(value: &Value) -> usize {
    serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0)
}

#[async_trait]
impl<P: Processor> ExecutableNode for ProcessorRunner<P> {
    fn node_type(&self) -> NodeType {
        P::NODE_TYPE
    }

    fn node_id(&self) -> &str {
        &self.node_id
    }

    #[instrument(
        name = "processor.execute",
        skip(self, raw_inputs),
        fields(node_id = %self.node_id, node_type = %P::NODE_TYPE, run_id = %self.context.run_id())
    )]
    async fn execute(&self, raw_inputs: Value) -> Result<Value, ProcessorFailure> {
        let mut guard = MetricsGuard::start(
            self.metrics.clone(),
            P::NODE_TYPE,
            &self.node_id,
            self.context.run_id(),
        );
        guard.record_mut().input_size = json_size(&raw_inputs);

        if self.context.is_cancelled() {
            return Err(self.failure(&mut guard, Phase::PreProcess, 0, ProcessorError::Cancelled));
        }

        // -------------------------------------------------------------------
        // Phase 1: pre-process (never retried)
        // -------------------------------------------------------------------
        let phase_start = Instant::now();
        let pre = self.processor.pre_process(raw_inputs);
        guard.record_mut().pre_process_duration = phase_start.elapsed();
        let input = match pre {
            Ok(input) => input,
            Err(e) => return Err(self.failure(&mut guard, Phase::PreProcess, 0, e)),
        };

        // -------------------------------------------------------------------
        // Phase 2: process (retry + timeout)
        // -------------------------------------------------------------------
        let phase_start = Instant::now();
        let outcome = self.process_with_retry(&input).await;
        guard.record_mut().process_duration = phase_start.elapsed();
        guard.record_mut().retry_count = outcome.retries;
        let output = match outcome.result {
            Ok(output) => output,
            Err(e) => return Err(self.failure(&mut guard, Phase::Process, outcome.retries, e)),
        };

        // -------------------------------------------------------------------
        // Phase 3: post-process
        // -------------------------------------------------------------------
        let phase_start = Instant::now();
        let post = self.processor.post_process(output);
        guard.record_mut().post_process_duration = phase_start.elapsed();
        let result = match post {
            Ok(result) => result,
            Err(e) => return Err(self.failure(&mut guard, Phase::PostProcess, outcome.retries, e)),
        };

        guard.succeed(json_size(&result));
        debug!(
            node_id = %self.node_id,
            retries = outcome.retries,
            "processor succeeded"
        );
        Ok(result)
    }
}
