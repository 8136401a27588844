use std::collections::VecDeque;

use bytes::Bytes;
use reqwest::Response;

/// The underlying transport failed while reading a chunk.
#[derive(Debug, PartialEq, Eq)]
pub struct Error;

/// An adapter for streaming byte chunks.
pub enum Chunks {
    /// Chunks read from a live HTTP response body.
    Response(Response),
    /// Chunks that are already in memory.
    Buffered(VecDeque<Bytes>),
}

impl Chunks {
    /// Reads chunks from the body of `response`.
    #[inline]
    pub fn from_response(response: Response) -> Self {
        Chunks::Response(response)
    }

    /// Reads chunks from an in-memory queue.
    #[inline]
    pub fn from_vec_deque(vec: VecDeque<Bytes>) -> Self {
        Chunks::Buffered(vec)
    }

    /// Returns the next chunk, or `None` when the body is exhausted.
    #[inline]
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            Chunks::Response(response) => {
                let Ok(chunk) = response.chunk().await else {
                    return Err(Error);
                };
                Ok(chunk)
            }
            Chunks::Buffered(vec) => Ok(vec.pop_front()),
        }
    }
}
