//! Server-sent events over a stream of byte chunks.
//!
//! Both the model provider and the tool gateway receive `text/event-stream`
//! bodies, this crate holds the small reader they share.

#![deny(missing_docs)]

mod chunks;
mod sse;

pub use chunks::{Chunks, Error as ChunksError};
pub use sse::{Error, Sse};
