//! A terminal chat front end whose model can call remote tools.
//!
//! The crate includes a CLI for using in the terminal. The [`Session`]
//! type can also be used as a library to embed the chat elsewhere.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod config;
mod session;

pub use config::Config;
pub use session::{Session, SessionBuilder};

/// Re-exports of [`tool_chat_core`] crate.
pub mod core {
    pub use tool_chat_core::*;
}
