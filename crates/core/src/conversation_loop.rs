//! The tool-calling conversation loop.

mod builder;
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::{Map, Value};
use tool_chat_gateway::{ToolDescriptor, ToolGateway};
use tool_chat_model::ModelTool;
use tracing::Instrument;

use crate::Error;
use crate::adapter::{ModelAdapter, ModelTurn, translate_tools_for_model};
use crate::model_client::DeltaFn;
use crate::transcript::{ToolRequest, Transcript, Turn};
pub use builder::ConversationLoopBuilder;

type TurnFn = Box<dyn Fn(&Turn) + Send + Sync>;

/// How the requests of one batch are executed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// One request at a time, in emission order.
    #[default]
    Sequential,
    /// All requests at once. Arguments of the whole batch are parsed
    /// before any call starts, and results are appended in emission order.
    Concurrent,
}

/// Limits and execution options of a loop.
///
/// The default configuration has no limits at all: the loop only ends
/// when the model gives an answer without tool requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LoopConfig {
    /// Maximum number of model invocations per run.
    pub max_iterations: Option<u32>,
    /// Wall-clock budget per run.
    pub timeout: Option<Duration>,
    /// How tool batches are executed.
    pub execution_mode: ExecutionMode,
}

#[derive(Debug)]
enum Stage {
    AwaitingModel,
    ExecutingTools(Vec<ToolRequest>),
    Done,
}

/// Drives a model and a tool gateway until the model gives a final answer.
pub struct ConversationLoop {
    adapter: ModelAdapter,
    gateway: Arc<dyn ToolGateway>,
    config: LoopConfig,
    on_turn: Option<TurnFn>,
    on_delta: Option<DeltaFn>,
}

impl ConversationLoop {
    /// Returns the tool gateway the loop calls.
    #[inline]
    pub fn gateway(&self) -> &Arc<dyn ToolGateway> {
        &self.gateway
    }

    /// Returns the loop configuration.
    #[inline]
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Runs the loop on `transcript` with the given tool catalog.
    ///
    /// Turns are appended to `transcript` as the loop advances. On success
    /// the last turn is the model's final answer. On failure the transcript
    /// keeps every turn appended before the error, nothing is rolled back.
    pub async fn run(
        &self,
        transcript: &mut Transcript,
        tools: &[ToolDescriptor],
    ) -> Result<(), Error> {
        let span = debug_span!("conversation loop", history = transcript.len());
        let fut = self.run_stages(transcript, tools).instrument(span);
        let Some(limit) = self.config.timeout else {
            return fut.await;
        };
        tokio::time::timeout(limit, fut).await.map_err(|_| {
            Error::loop_exceeded()
                .with_reason(format!("no final answer within {limit:?}"))
        })?
    }

    async fn run_stages(
        &self,
        transcript: &mut Transcript,
        tools: &[ToolDescriptor],
    ) -> Result<(), Error> {
        let tools = translate_tools_for_model(tools);
        let mut stage = Stage::AwaitingModel;
        let mut iterations = 0;
        loop {
            stage = match stage {
                Stage::AwaitingModel => {
                    if self
                        .config
                        .max_iterations
                        .is_some_and(|max| iterations >= max)
                    {
                        return Err(Error::loop_exceeded().with_reason(
                            format!("no final answer after {iterations} model calls"),
                        ));
                    }
                    iterations += 1;
                    self.await_model(transcript, &tools).await?
                }
                Stage::ExecutingTools(requests) => {
                    match self.config.execution_mode {
                        ExecutionMode::Sequential => {
                            self.execute_sequentially(transcript, requests)
                                .await?
                        }
                        ExecutionMode::Concurrent => {
                            self.execute_concurrently(transcript, requests)
                                .await?
                        }
                    }
                    Stage::AwaitingModel
                }
                Stage::Done => {
                    debug!("done after {iterations} model calls");
                    return Ok(());
                }
            };
        }
    }

    async fn await_model(
        &self,
        transcript: &mut Transcript,
        tools: &[ModelTool],
    ) -> Result<Stage, Error> {
        let turn = self
            .adapter
            .invoke(transcript, tools, self.on_delta.clone())
            .await?;
        match turn {
            ModelTurn::Final(text) => {
                self.append(transcript, Turn::Assistant(text));
                Ok(Stage::Done)
            }
            ModelTurn::ToolCalls { text, requests } => {
                debug!("model requested {} tool calls", requests.len());
                self.append(
                    transcript,
                    Turn::AssistantWithToolRequests {
                        text,
                        requests: requests.clone(),
                    },
                );
                Ok(Stage::ExecutingTools(requests))
            }
        }
    }

    async fn execute_sequentially(
        &self,
        transcript: &mut Transcript,
        requests: Vec<ToolRequest>,
    ) -> Result<(), Error> {
        for req in requests {
            let arguments = parse_arguments(&req)?;
            let result = self
                .gateway
                .call_tool(&req.name, arguments)
                .instrument(debug_span!("tool call", id = %req.id))
                .await?;
            self.append(
                transcript,
                Turn::ToolResult {
                    tool_call_id: req.id,
                    name: req.name,
                    content: result.to_text(),
                },
            );
        }
        Ok(())
    }

    async fn execute_concurrently(
        &self,
        transcript: &mut Transcript,
        requests: Vec<ToolRequest>,
    ) -> Result<(), Error> {
        let arguments = requests
            .iter()
            .map(parse_arguments)
            .collect::<Result<Vec<_>, _>>()?;
        let results = join_all(requests.iter().zip(arguments).map(
            |(req, arguments)| {
                self.gateway
                    .call_tool(&req.name, arguments)
                    .instrument(debug_span!("tool call", id = %req.id))
            },
        ))
        .await;

        for (req, result) in requests.into_iter().zip(results) {
            let result = result?;
            self.append(
                transcript,
                Turn::ToolResult {
                    tool_call_id: req.id,
                    name: req.name,
                    content: result.to_text(),
                },
            );
        }
        Ok(())
    }

    fn append(&self, transcript: &mut Transcript, turn: Turn) {
        trace!("appending {turn:?}");
        if let Some(on_turn) = &self.on_turn {
            on_turn(&turn);
        }
        transcript.push(turn);
    }
}

impl std::fmt::Debug for ConversationLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationLoop")
            .field("adapter", &self.adapter)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn parse_arguments(req: &ToolRequest) -> Result<Map<String, Value>, Error> {
    match serde_json::from_str(&req.arguments) {
        Ok(Value::Object(arguments)) => Ok(arguments),
        Ok(other) => Err(Error::argument_parse().with_reason(format!(
            "arguments of `{}` ({}) are not an object: {other}",
            req.name, req.id
        ))),
        Err(err) => Err(Error::argument_parse().with_reason(format!(
            "arguments of `{}` ({}) are not valid JSON: {err}",
            req.name, req.id
        ))),
    }
}
