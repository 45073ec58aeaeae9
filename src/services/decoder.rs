// src/services/decoder.rs
//! Incremental decoding of the backend's newline-delimited JSON stream.
//!
//! The backend emits one JSON object per line:
//! ```text
//! {"model":"llama3","response":"Hel","done":false}
//! {"model":"llama3","response":"lo","done":false}
//! {"model":"llama3","response":"","done":true,"done_reason":"stop"}
//! ```
//! Chunk boundaries are arbitrary: a line, or a single UTF-8 character, may
//! be split across any number of chunks.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;

use crate::error::StreamError;

/// One parsed line of the stream. Unknown backend fields are ignored.
#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct StreamFragment {
    pub response: Option<String>,
    pub done: Option<bool>,
    /// Kept as raw JSON; the backend does not promise a shape for it.
    pub error: Option<serde_json::Value>,
}

/// Parse a single line. Only JSON objects are fragments.
pub fn parse_fragment(line: &str) -> Result<StreamFragment, serde_json::Error> {
    match serde_json::from_str::<serde_json::Value>(line)? {
        value @ serde_json::Value::Object(_) => serde_json::from_value(value),
        _ => Err(<serde_json::Error as serde::de::Error>::custom(
            "fragment is not a JSON object",
        )),
    }
}

/// Streaming UTF-8 decoder. An incomplete multi-byte sequence at the end of a
/// chunk is held back until the next chunk completes it.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::new();
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, tail) = rest.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[len..];
                        }
                        None => {
                            rest = tail;
                            break;
                        }
                    }
                }
            }
        }
        self.pending = rest.to_vec();
        out
    }

    /// Flush whatever is still held back. A truncated sequence decodes to
    /// U+FFFD.
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Splits decoded text into lines, keeping the trailing partial line.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.pending.push_str(text);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line = self.pending[..pos].trim_end_matches('\r').to_string();
            self.pending.drain(..=pos);
            lines.push(line);
        }
        lines
    }

    pub fn take_remainder(&mut self) -> String {
        std::mem::take(&mut self.pending)
    }
}

/// Running state for one generation: decoder, line buffer and the
/// accumulated answer.
#[derive(Debug, Default)]
pub struct Accumulator {
    decoder: Utf8Decoder,
    lines: LineBuffer,
    answer: String,
    fragments: usize,
}

impl Accumulator {
    /// Feed one raw chunk. Returns a snapshot of the accumulated answer for
    /// every fragment that contributed text, in order.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.decoder.decode(chunk);
        let lines = self.lines.push(&text);
        lines
            .iter()
            .filter_map(|line| self.apply_line(line))
            .collect()
    }

    /// End of stream. The unterminated last line gets one parse attempt.
    pub fn finish(&mut self) -> Option<String> {
        let mut remainder = self.lines.take_remainder();
        remainder.push_str(&self.decoder.finish());

        let line = remainder.trim();
        if line.is_empty() {
            return None;
        }
        match parse_fragment(line) {
            Ok(fragment) => self.apply_fragment(fragment),
            Err(err) => {
                tracing::debug!(error = %err, "discarding unterminated trailing line");
                None
            }
        }
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }

    fn apply_line(&mut self, line: &str) -> Option<String> {
        if line.trim().is_empty() {
            return None;
        }
        match parse_fragment(line) {
            Ok(fragment) => self.apply_fragment(fragment),
            Err(err) => {
                tracing::warn!(error = %err, line = %line, "failed to parse stream fragment");
                None
            }
        }
    }

    fn apply_fragment(&mut self, fragment: StreamFragment) -> Option<String> {
        self.fragments += 1;

        if let Some(error) = &fragment.error {
            tracing::warn!(error = %error, "backend reported an error in the stream");
        }
        // Advisory only; the stream ends when the connection does.
        if fragment.done == Some(true) {
            tracing::debug!(fragments = self.fragments, "backend signalled done");
        }

        match fragment.response {
            Some(text) if !text.is_empty() => {
                self.answer.push_str(&text);
                Some(self.answer.clone())
            }
            _ => None,
        }
    }
}

/// Turn a chunk stream into a stream of accumulated-answer snapshots.
///
/// A transport error is yielded once and ends the stream; snapshots already
/// yielded stay valid.
pub fn accumulate<S>(chunks: S) -> impl Stream<Item = Result<String, StreamError>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, StreamError>> + Send + 'static,
{
    async_stream::stream! {
        let mut accumulator = Accumulator::default();
        let mut chunks = std::pin::pin!(chunks);

        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    for snapshot in accumulator.push_chunk(&bytes) {
                        yield Ok(snapshot);
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        answered = accumulator.answer().len(),
                        "stream interrupted"
                    );
                    yield Err(err);
                    return;
                }
            }
        }

        if let Some(snapshot) = accumulator.finish() {
            yield Ok(snapshot);
        }
        tracing::debug!(
            fragments = accumulator.fragments(),
            answered = accumulator.answer().len(),
            "stream ended"
        );
    }
}
