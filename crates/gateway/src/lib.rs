//! Client side of the tool gateway, the remote process that exposes
//! callable tools over JSON-RPC.
//!
//! The conversation loop only sees the [`ToolGateway`] trait. The
//! [`HttpGateway`] implementation speaks the streamable HTTP flavor of
//! the Model Context Protocol, and opens a fresh session for every
//! operation.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod error;
mod http;
pub mod rpc;
mod types;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use error::{Error, ErrorKind};
pub use http::HttpGateway;
pub use types::{ToolContent, ToolDescriptor, ToolResult};

/// A remote catalog of tools.
#[async_trait]
pub trait ToolGateway: Send + Sync {
    /// Returns the full tool catalog of the remote server.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, Error>;

    /// Invokes the named tool with the given arguments.
    ///
    /// Argument validation is up to the remote server. An unknown tool or a
    /// tool that reports a failure yields [`ErrorKind::ToolInvocation`].
    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolResult, Error>;
}
