//! Newline-delimited JSON (NDJSON) stream processing.
//!
//! Each record is one JSON value terminated by `\n`:
//! ```text
//! {"question": "...", "answer": "A"}
//! {"question": "...", "answer": "C"}
//! ```
//!
//! Chunks arrive with arbitrary boundaries, so the decoder keeps any
//! incomplete UTF-8 sequence and any unterminated line between chunks.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use thiserror::Error;

use crate::client::ClientError;

const BYTE_ORDER_MARK: char = '\u{FEFF}';

/// What to do with an unterminated line left over when the stream ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrailingLine {
    /// Drop it. A fragment without `\n` cannot be told apart from a
    /// truncated record.
    #[default]
    Discard,

    /// Treat end of stream as an implicit terminator and parse it.
    Parse,
}

/// A single line that failed to parse as JSON.
///
/// Never fatal for the stream; it is logged and the line is skipped.
#[derive(Debug, Error)]
#[error("malformed record {line:?}: {source}")]
pub struct RecordParseError {
    pub line: String,
    #[source]
    pub source: serde_json::Error,
}

/// Parse one trimmed, non-empty NDJSON line.
///
/// # Example
/// ```
/// use quizfeed::ndjson::parse_line;
///
/// assert_eq!(parse_line("{\"a\":1}").unwrap()["a"], 1);
/// assert!(parse_line("{bad json}").is_err());
/// ```
pub fn parse_line(line: &str) -> Result<Value, RecordParseError> {
    serde_json::from_str(line).map_err(|source| RecordParseError {
        line: line.to_string(),
        source,
    })
}

/// Incremental UTF-8 decoder plus line splitter for one stream session.
#[derive(Debug, Default)]
pub struct LineBuffer {
    /// Bytes of a code point that straddles a chunk boundary.
    undecoded: Vec<u8>,
    /// Decoded text not yet terminated by `\n`.
    text: String,
    started: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the complete lines it finished.
    ///
    /// Lines are trimmed and blank ones are dropped. The unterminated tail
    /// stays buffered for the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // Everything buffered before this chunk is already known to hold no `\n`.
        let scanned = self.text.len();
        self.decode(chunk);

        let Some(last) = self.text[scanned..].rfind('\n').map(|i| scanned + i) else {
            return Vec::new();
        };

        let remainder = self.text.split_off(last + 1);
        let complete = std::mem::replace(&mut self.text, remainder);

        complete
            .split('\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Number of bytes (decoded or not) still waiting for a terminator.
    pub fn pending_len(&self) -> usize {
        self.text.len() + self.undecoded.len()
    }

    /// Flush the decoder at end of stream and hand back the unterminated
    /// trailing line, if it has any content.
    pub fn finish(&mut self) -> Option<String> {
        if !self.undecoded.is_empty() {
            self.undecoded.clear();
            self.text.push(char::REPLACEMENT_CHARACTER);
        }

        let line = std::mem::take(&mut self.text);
        let line = line.trim();
        (!line.is_empty()).then(|| line.to_string())
    }

    fn decode(&mut self, chunk: &[u8]) {
        self.undecoded.extend_from_slice(chunk);

        let mut consumed = 0;
        while consumed < self.undecoded.len() {
            let rest = &self.undecoded[consumed..];
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    consumed = self.undecoded.len();
                }
                Err(e) => {
                    let valid_len = e.valid_up_to();
                    self.text
                        .push_str(std::str::from_utf8(&rest[..valid_len]).unwrap_or_default());
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            consumed += valid_len;
                            break;
                        }
                        Some(invalid_len) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            consumed += valid_len + invalid_len;
                        }
                    }
                }
            }
        }
        self.undecoded.drain(..consumed);

        if !self.started && !self.text.is_empty() {
            self.started = true;
            if self.text.starts_with(BYTE_ORDER_MARK) {
                self.text.drain(..BYTE_ORDER_MARK.len_utf8());
            }
        }
    }
}

struct RecordState<S> {
    bytes: Pin<Box<S>>,
    buffer: LineBuffer,
    ready: VecDeque<Value>,
    trailing: TrailingLine,
    ended: bool,
}

impl<S> RecordState<S> {
    fn enqueue(&mut self, lines: impl IntoIterator<Item = String>) {
        for line in lines {
            match parse_line(&line) {
                Ok(record) => self.ready.push_back(record),
                Err(e) => tracing::warn!(error = %e.source, line = %e.line, "skipping malformed NDJSON line"),
            }
        }
    }

    fn end(&mut self) {
        self.ended = true;
        let Some(line) = self.buffer.finish() else {
            return;
        };
        match self.trailing {
            TrailingLine::Discard => {
                tracing::debug!(len = line.len(), "discarding unterminated trailing line");
            }
            TrailingLine::Parse => self.enqueue([line]),
        }
    }
}

/// Turn a byte stream into a stream of parsed NDJSON records.
///
/// Records are yielded as soon as their line is complete. Malformed lines are
/// logged and skipped. A transport error is yielded once and ends the stream.
pub fn ndjson_records<S, E>(
    bytes: S,
    trailing: TrailingLine,
) -> impl Stream<Item = Result<Value, ClientError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<ClientError> + Send,
{
    let state = RecordState {
        bytes: Box::pin(bytes),
        buffer: LineBuffer::new(),
        ready: VecDeque::new(),
        trailing,
        ended: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(record) = state.ready.pop_front() {
                return Some((Ok(record), state));
            }
            if state.ended {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let lines = state.buffer.push(&chunk);
                    state.enqueue(lines);
                }
                Some(Err(e)) => {
                    state.ended = true;
                    return Some((Err(e.into()), state));
                }
                None => state.end(),
            }
        }
    })
}

/// Extension trait for `reqwest::Response` to read the body as NDJSON.
///
/// # Example
/// ```ignore
/// use quizfeed::ndjson::{NdjsonResponseExt, TrailingLine};
///
/// let response = client.get(url).send().await?;
/// let mut records = std::pin::pin!(response.ndjson(TrailingLine::Discard));
/// while let Some(record) = records.next().await {
///     println!("{}", record?);
/// }
/// ```
pub trait NdjsonResponseExt {
    fn ndjson(self, trailing: TrailingLine) -> impl Stream<Item = Result<Value, ClientError>> + Send;
}

impl NdjsonResponseExt for reqwest::Response {
    fn ndjson(self, trailing: TrailingLine) -> impl Stream<Item = Result<Value, ClientError>> + Send {
        ndjson_records(self.bytes_stream(), trailing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_record_across_chunks() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"{\"a\":1}\n{\"b\":2"), vec!["{\"a\":1}"]);
        assert_eq!(buffer.push(b"}\n"), vec!["{\"b\":2}"]);
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"\n\n  \n{\"x\":true}\n"), vec!["{\"x\":true}"]);
    }

    #[test]
    fn test_no_terminator_keeps_buffering() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"{\"w\":").is_empty());
        assert!(buffer.push(b"1}").is_empty());
        assert_eq!(buffer.pending_len(), 7);
        assert_eq!(buffer.finish().as_deref(), Some("{\"w\":1}"));
    }

    #[test]
    fn test_long_line_in_small_chunks() {
        let line = format!("{{\"text\":\"{}\"}}", "x".repeat(4096));
        let mut buffer = LineBuffer::new();
        for piece in line.as_bytes().chunks(3) {
            assert!(buffer.push(piece).is_empty());
        }
        assert_eq!(buffer.pending_len(), line.len());

        assert_eq!(buffer.push(b"\n{\"next\""), vec![line]);
        assert_eq!(buffer.push(b":1}\n"), vec!["{\"next\":1}"]);
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn test_crlf_terminators() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"{\"a\":1}\r\n{\"b\":2}\r\n"), vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let bytes = "{\"q\":\"π≈3.14 ✓\"}\n".as_bytes();
        let mut buffer = LineBuffer::new();
        let mut lines = Vec::new();
        for byte in bytes {
            lines.extend(buffer.push(std::slice::from_ref(byte)));
        }
        assert_eq!(lines, vec!["{\"q\":\"π≈3.14 ✓\"}"]);
    }

    #[test]
    fn test_leading_bom_dropped() {
        let mut buffer = LineBuffer::new();
        // BOM split over two chunks.
        assert!(buffer.push(&[0xEF, 0xBB]).is_empty());
        assert_eq!(buffer.push(&[0xBF, b'1', b'\n']), vec!["1"]);
        assert_eq!(buffer.push("\u{FEFF}2\n".as_bytes()), vec!["\u{FEFF}2"]);
    }

    #[test]
    fn test_invalid_utf8_replaced() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"\"a\xFFb\"\n"), vec!["\"a\u{FFFD}b\""]);
    }

    #[test]
    fn test_finish_with_incomplete_code_point() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(&[b'x', 0xE2, 0x89]).is_empty());
        assert_eq!(buffer.finish().as_deref(), Some("x\u{FFFD}"));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("[1,2]").unwrap(), serde_json::json!([1, 2]));
        let err = parse_line("{bad json}").unwrap_err();
        assert_eq!(err.line, "{bad json}");
    }
}
