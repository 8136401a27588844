//! Translation between transcripts and model requests.

use tool_chat_gateway::ToolDescriptor;
use tool_chat_model::{
    ErrorKind as ModelErrorKind, ModelMessage, ModelProvider, ModelRequest,
    ModelTool, ToolCallResult, ToolChoice,
};

use crate::Error;
use crate::model_client::{DeltaFn, ModelClient};
use crate::transcript::{ToolRequest, Transcript, Turn};

/// What the model answered with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelTurn {
    /// A final answer.
    Final(String),
    /// One or more tool requests, maybe with some text.
    ToolCalls {
        /// Text produced alongside the requests.
        text: Option<String>,
        /// The requests, in emission order. Never empty.
        requests: Vec<ToolRequest>,
    },
}

/// Maps tool descriptors one-to-one onto the model's tool specs.
pub fn translate_tools_for_model(tools: &[ToolDescriptor]) -> Vec<ModelTool> {
    tools
        .iter()
        .map(|tool| ModelTool {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.input_schema.clone(),
        })
        .collect()
}

/// Converts a transcript into the messages a model request carries.
pub fn transcript_to_messages(transcript: &Transcript) -> Vec<ModelMessage> {
    transcript
        .iter()
        .map(|turn| match turn {
            Turn::User(content) => ModelMessage::User(content.clone()),
            Turn::Assistant(content) => {
                ModelMessage::Assistant(content.clone())
            }
            Turn::AssistantWithToolRequests { text, requests } => {
                ModelMessage::AssistantToolCalls {
                    content: text.clone(),
                    tool_calls: requests.clone(),
                }
            }
            Turn::ToolResult {
                tool_call_id,
                content,
                ..
            } => ModelMessage::Tool(ToolCallResult {
                id: tool_call_id.clone(),
                content: content.clone(),
            }),
        })
        .collect()
}

/// Sends transcripts to a model provider.
#[derive(Clone)]
pub struct ModelAdapter {
    client: ModelClient,
    model: Option<String>,
}

impl ModelAdapter {
    /// Creates an adapter that uses the provider's default model.
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        Self {
            client: ModelClient::new(provider),
            model: None,
        }
    }

    /// Uses the given model instead of the provider's default.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Returns the model override, if any.
    #[inline]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Sends the whole transcript with the given tools and waits for the
    /// model's turn.
    ///
    /// Text deltas are forwarded to `on_delta` as they arrive.
    pub async fn invoke(
        &self,
        transcript: &Transcript,
        tools: &[ModelTool],
        on_delta: Option<DeltaFn>,
    ) -> Result<ModelTurn, Error> {
        let req = ModelRequest {
            model: self.model.clone(),
            messages: transcript_to_messages(transcript),
            tools: tools.to_vec(),
            tool_choice: ToolChoice::Auto,
        };
        let resp = self
            .client
            .send_request(req, on_delta)
            .await
            .map_err(|err| Error::from_model_error(err.as_ref()))?;

        if resp.finish_reason.is_none() {
            return Err(Error::model_invocation(
                ModelErrorKind::MalformedResponse,
            )
            .with_reason("response ended before completion"));
        }
        if resp.tool_calls.is_empty() {
            return Ok(ModelTurn::Final(resp.text));
        }
        let text = Some(resp.text).filter(|text| !text.is_empty());
        Ok(ModelTurn::ToolCalls {
            text,
            requests: resp.tool_calls,
        })
    }
}

impl std::fmt::Debug for ModelAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelAdapter")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}
