use std::pin::Pin;
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};

use crate::provider::ModelProviderError;

/// A response that streams in as a series of [`ModelResponseEvent`]s.
///
/// Text arrives as [`MessageDelta`](ModelResponseEvent::MessageDelta)s,
/// then every requested tool call as a complete
/// [`ToolCall`](ModelResponseEvent::ToolCall), and finally a single
/// [`Completed`](ModelResponseEvent::Completed) carrying the finish reason.
pub trait ModelResponse: Sized + Send + 'static {
    /// Error returned when the stream breaks or can't be decoded.
    type Error: ModelProviderError;

    /// Polls for the next event.
    ///
    /// Returns `Poll::Pending` while waiting for the backend, and registers
    /// the task for wakeup. `Ok(Some(_))` hands out an event, `Ok(None)`
    /// marks the end of the stream and `Err(_)` a failure. Once the stream
    /// ended or failed, further polls return `Ok(None)`.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>>;
}

/// Why the model stopped generating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFinishReason {
    /// It wants tool results before going on.
    ToolCalls,
    /// It gave its answer.
    Stop,
}

/// A tool invocation the model asked for.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Id of the call, unique within one response. Results refer to it.
    pub id: String,
    /// Name of the requested tool.
    pub name: String,
    /// The arguments exactly as the model serialized them.
    ///
    /// Providers must not try to repair or parse this payload, a
    /// malformed payload is reported by whoever executes the call.
    pub arguments: String,
}

/// One step of a streamed response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelResponseEvent {
    /// The model is done, for the given reason.
    Completed(ModelFinishReason),
    /// A piece of assistant text.
    MessageDelta(String),
    /// A fully assembled tool call.
    ToolCall(ToolCallRequest),
}
