use std::sync::Arc;
use std::time::Duration;

use tool_chat_gateway::ToolGateway;
use tool_chat_model::ModelProvider;

use super::{ConversationLoop, ExecutionMode, LoopConfig, TurnFn};
use crate::adapter::ModelAdapter;
use crate::model_client::DeltaFn;
use crate::transcript::Turn;

/// [`ConversationLoop`] builder.
pub struct ConversationLoopBuilder {
    adapter: ModelAdapter,
    gateway: Arc<dyn ToolGateway>,
    config: LoopConfig,
    on_turn: Option<TurnFn>,
    on_delta: Option<DeltaFn>,
}

impl ConversationLoopBuilder {
    /// Creates a new builder with the given adapter and gateway.
    #[inline]
    pub fn new(adapter: ModelAdapter, gateway: Arc<dyn ToolGateway>) -> Self {
        Self {
            adapter,
            gateway,
            config: LoopConfig::default(),
            on_turn: None,
            on_delta: None,
        }
    }

    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
        gateway: Arc<dyn ToolGateway>,
    ) -> Self {
        Self::new(ModelAdapter::new(provider), gateway)
    }

    /// Replaces the whole configuration.
    #[inline]
    pub fn config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    /// Bounds the number of model invocations per run.
    #[inline]
    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.config.max_iterations = Some(max_iterations);
        self
    }

    /// Bounds the wall-clock time of each run.
    #[inline]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Sets how tool batches are executed.
    #[inline]
    pub fn execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.config.execution_mode = mode;
        self
    }

    /// Attaches a callback invoked for every turn the loop appends.
    #[inline]
    pub fn on_turn(
        mut self,
        on_turn: impl Fn(&Turn) + Send + Sync + 'static,
    ) -> Self {
        self.on_turn = Some(Box::new(on_turn));
        self
    }

    /// Attaches a callback receiving the model's text as it streams in.
    #[inline]
    pub fn on_delta(
        mut self,
        on_delta: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.on_delta = Some(Arc::new(on_delta));
        self
    }

    /// Builds the loop.
    #[inline]
    pub fn build(self) -> ConversationLoop {
        let Self {
            adapter,
            gateway,
            config,
            on_turn,
            on_delta,
        } = self;
        ConversationLoop {
            adapter,
            gateway,
            config,
            on_turn,
            on_delta,
        }
    }
}
