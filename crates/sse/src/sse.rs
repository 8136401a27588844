use crate::{Chunks, ChunksError};

/// Errors produced while reading events.
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Reading from the underlying chunks failed.
    ChunksError(ChunksError),
    /// The stream contains data that is not a valid event.
    InvalidPayload,
}

/// A type for reading server-sent events from a chunk stream.
///
/// Only the `data` field is surfaced. Multiple `data` lines of one event
/// are joined with a line feed. Comments and all other fields, including
/// unknown ones, are skipped. Events without any data are dropped.
pub struct Sse {
    buf: Vec<u8>,
    chunks: Chunks,
}

impl Sse {
    /// Creates a reader over `chunks`.
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: Vec::new(),
            chunks,
        }
    }

    /// Returns the data of the next event, or `None` at the end of the
    /// stream. A trailing event that is not terminated by a blank line is
    /// discarded.
    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // There may be complete events left in the buffer from the
            // previous chunk, drain those first.
            if let Some(event) = self.try_parse_event()? {
                return Ok(Some(event));
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                return Ok(None);
            };
            // Line endings are normalized to a single line feed, which
            // keeps the event boundary search trivial.
            self.buf.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
        }
    }

    fn try_parse_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            let Some(eol_idx) = self.buf.windows(2).position(|w| w == b"\n\n")
            else {
                return Ok(None);
            };

            // Multi-byte characters may be split across chunks, so decoding
            // only happens once the whole event is buffered.
            let event = std::str::from_utf8(&self.buf[0..eol_idx])
                .map(parse_data)
                .map_err(|_| Error::InvalidPayload)?;
            self.buf.drain(0..eol_idx + 2);

            if let Some(data) = event {
                return Ok(Some(data));
            }
        }
    }
}

// event         = *( comment / field ) end-of-line
// comment       = colon *any-char end-of-line
// field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
fn parse_data(event: &str) -> Option<String> {
    let mut data: Option<String> = None;
    for line in event.split('\n') {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => {
                (name, value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        if name != "data" {
            continue;
        }
        let data = data.get_or_insert_default();
        if !data.is_empty() {
            data.push('\n');
        }
        data.push_str(value);
    }
    data
}
