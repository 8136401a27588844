//! A reference tool server for the chat front end.
//!
//! The server exposes a [`Toolbox`](tool::Toolbox) over the streamable
//! HTTP flavor of the Model Context Protocol. The binary serves a single
//! tool, `get_address_by_postal_code`.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod postal;
mod server;
pub mod tool;

pub use postal::{PostalCodeParameters, PostalCodeTool, ZIPCLOUD_BASE_URL};
pub use server::McpServer;
