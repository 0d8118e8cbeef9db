//! Processor registry: maps a node-type tag to a processor constructor.

use std::collections::BTreeMap;
use std::sync::Arc;

use nodes::builtin::{
    AdapterProcessor, AgentProcessor, AggregatorProcessor, ConditionProcessor, ToolProcessor,
    TriggerProcessor,
};
use nodes::{
    AgentInvoker, ExecutableNode, ExecutionContext, MetricsCollector, NodeType, Phase, Processor,
    ProcessorConfig, ProcessorError, ProcessorFailure, ProcessorRunner, ToolInvoker,
};
use tracing::{debug, error};

use crate::models::NodeDefinition;

/// Builds a ready-to-run node for one invocation.
///
/// Receives the node definition, the run context, the effective
/// processor configuration (node overrides already applied) and the
/// metrics sink.
pub type ProcessorConstructor = Arc<
    dyn Fn(
            &NodeDefinition,
            Arc<ExecutionContext>,
            ProcessorConfig,
            Arc<MetricsCollector>,
        ) -> Result<Box<dyn ExecutableNode>, ProcessorError>
        + Send
        + Sync,
>;

/// Turn a closure into a [`ProcessorConstructor`].
pub fn constructor<F>(f: F) -> ProcessorConstructor
where
    F: Fn(
            &NodeDefinition,
            Arc<ExecutionContext>,
            ProcessorConfig,
            Arc<MetricsCollector>,
        ) -> Result<Box<dyn ExecutableNode>, ProcessorError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Wrap a processor in the shared retry/timeout/metrics lifecycle.
pub fn runner<P: Processor>(
    processor: P,
    node: &NodeDefinition,
    context: Arc<ExecutionContext>,
    config: ProcessorConfig,
    metrics: Arc<MetricsCollector>,
) -> Box<dyn ExecutableNode> {
    Box::new(ProcessorRunner::new(processor, node.id.clone(), context, config, metrics))
}

/// Lookup table from [`NodeType`] to [`ProcessorConstructor`].
#[derive(Clone)]
pub struct ProcessorRegistry {
    constructors: BTreeMap<NodeType, ProcessorConstructor>,
    metrics: Arc<MetricsCollector>,
}

impl ProcessorRegistry {
    /// An empty registry reporting to `metrics`.
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self {
            constructors: BTreeMap::new(),
            metrics,
        }
    }

    /// A registry with the six built-in processors.
    pub fn with_defaults(
        metrics: Arc<MetricsCollector>,
        tools: Arc<dyn ToolInvoker>,
        agents: Arc<dyn AgentInvoker>,
    ) -> Self {
        let mut registry = Self::new(metrics);

        registry.register(
            NodeType::Trigger,
            constructor(|node, ctx, config, metrics| {
                let processor = TriggerProcessor::new(&node.config, ctx.clone())?;
                Ok(runner(processor, node, ctx, config, metrics))
            }),
        );
        registry.register(
            NodeType::Tool,
            constructor(move |node, ctx, config, metrics| {
                let processor = ToolProcessor::new(&node.config, ctx.clone(), tools.clone(), config.timeout)?;
                Ok(runner(processor, node, ctx, config, metrics))
            }),
        );
        registry.register(
            NodeType::Agent,
            constructor(move |node, ctx, config, metrics| {
                let processor = AgentProcessor::new(&node.config, ctx.clone(), agents.clone())?;
                Ok(runner(processor, node, ctx, config, metrics))
            }),
        );
        registry.register(
            NodeType::Condition,
            constructor(|node, ctx, config, metrics| {
                let processor = ConditionProcessor::new(&node.config, ctx.clone())?;
                Ok(runner(processor, node, ctx, config, metrics))
            }),
        );
        registry.register(
            NodeType::Adapter,
            constructor(|node, ctx, config, metrics| {
                let processor = AdapterProcessor::new(&node.config)?;
                Ok(runner(processor, node, ctx, config, metrics))
            }),
        );
        registry.register(
            NodeType::Aggregator,
            constructor(|node, ctx, config, metrics| {
                let processor = AggregatorProcessor::new(&node.config)?;
                Ok(runner(processor, node, ctx, config, metrics))
            }),
        );

        registry
    }

    /// Register `constructor` for `tag`, replacing any previous entry.
    pub fn register(&mut self, tag: NodeType, constructor: ProcessorConstructor) {
        if self.constructors.insert(tag, constructor).is_some() {
            debug!(%tag, "replaced processor constructor");
        }
    }

    pub fn is_registered(&self, tag: NodeType) -> bool {
        self.constructors.contains_key(&tag)
    }

    pub fn registered_types(&self) -> Vec<NodeType> {
        self.constructors.keys().copied().collect()
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Instantiate the processor for `node`.
    ///
    /// `config` is the base configuration; `retry` / `timeout_ms` keys in
    /// the node's own configuration override it.
    ///
    /// # Errors
    /// A [`ProcessorFailure`] in [`Phase::Setup`] carrying
    /// [`ProcessorError::NotFound`] for an unregistered tag, or the
    /// constructor's configuration error.
    pub fn create(
        &self,
        tag: NodeType,
        node: &NodeDefinition,
        context: Arc<ExecutionContext>,
        config: &ProcessorConfig,
    ) -> Result<Box<dyn ExecutableNode>, ProcessorFailure> {
        let setup_failure = |error: ProcessorError| {
            error!(node_id = %node.id, node_type = %tag, "processor setup failed: {error}");
            ProcessorFailure::new(tag, node.id.clone(), Phase::Setup, 0, error)
        };

        let build = self.constructors.get(&tag).ok_or_else(|| {
            setup_failure(ProcessorError::NotFound {
                tag: tag.to_string(),
            })
        })?;

        let effective = config.with_overrides(&node.config).map_err(&setup_failure)?;
        build(node, context, effective, self.metrics.clone()).map_err(setup_failure)
    }
}
