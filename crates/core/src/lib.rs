//! Core logic: the model invocation adapter, the tool-calling conversation
//! loop, and the transcript it works on.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

pub mod adapter;
mod conversation_loop;
mod error;
mod model_client;
pub mod transcript;

pub use adapter::{ModelAdapter, ModelTurn, translate_tools_for_model};
pub use conversation_loop::{
    ConversationLoop, ConversationLoopBuilder, ExecutionMode, LoopConfig,
};
pub use error::{Error, ErrorKind};
pub use model_client::DeltaFn;
pub use transcript::{Role, ToolRequest, Transcript, Turn};
