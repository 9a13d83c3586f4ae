//! Line-oriented event framing for the chat stream.
//!
//! The chat endpoint writes one `data: <JSON>` line per event. Network reads do not
//! respect line boundaries, so bytes are accumulated in a [`LineBuffer`] and only
//! newline-terminated lines are handed to [`decode_line`]. The trailing partial line
//! always stays in the buffer until the rest of it arrives.

use serde::Deserialize;

/// Prefix that marks an event line. Everything else is ignored.
pub const DATA_PREFIX: &str = "data:";

/// Largest partial line the buffer will hold before giving up on the stream.
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// The partial line in the buffer grew past its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("partial event line exceeded {limit} bytes")]
pub struct LineTooLong {
    pub limit: usize,
}

/// Rolling byte buffer that yields complete lines.
#[derive(Debug)]
pub struct LineBuffer {
    buffer: Vec<u8>,
    limit: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }

    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            limit,
        }
    }

    /// Append `bytes` and drain every complete line.
    ///
    /// Lines are split on `\n` with a trailing `\r` removed. Splitting happens on bytes,
    /// so a multi-byte character cut across two reads is decoded only once whole.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, LineTooLong> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let raw = &self.buffer[start..end];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            lines.push(String::from_utf8_lossy(raw).into_owned());
            start = end + 1;
        }
        self.buffer.drain(..start);

        if self.buffer.len() > self.limit {
            return Err(LineTooLong { limit: self.limit });
        }
        Ok(lines)
    }

    /// Bytes of the incomplete trailing line.
    #[must_use]
    pub fn remainder(&self) -> &[u8] {
        &self.buffer
    }
}

/// A decoded event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Error(String),
    Chunk(String),
    Done,
    /// Valid JSON with none of the recognized keys.
    Unrecognized,
}

/// An event line whose payload is not a valid JSON object of the expected shape.
#[derive(Debug, thiserror::Error)]
#[error("invalid event payload ({payload_bytes} bytes): {source}")]
pub struct FramingError {
    pub payload_bytes: usize,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    chunk: Option<String>,
    #[serde(default)]
    done: Option<bool>,
}

/// Decode one complete line.
///
/// Returns `Ok(None)` for lines without the `data:` prefix. When several keys are
/// present, `error` wins over `chunk`, which wins over `done`. Empty strings count
/// as absent.
pub fn decode_line(line: &str) -> Result<Option<Frame>, FramingError> {
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };
    let payload = rest.strip_prefix(' ').unwrap_or(rest);

    let raw: RawFrame = serde_json::from_str(payload).map_err(|source| FramingError {
        payload_bytes: payload.len(),
        source,
    })?;

    let frame = match raw {
        RawFrame {
            error: Some(message),
            ..
        } if !message.is_empty() => Frame::Error(message),
        RawFrame {
            chunk: Some(text), ..
        } if !text.is_empty() => Frame::Chunk(text),
        RawFrame {
            done: Some(true), ..
        } => Frame::Done,
        _ => Frame::Unrecognized,
    };
    Ok(Some(frame))
}
