//! Incremental decoder for the gateway's SSE-framed reply stream.
//!
//! Network chunks arrive with arbitrary boundaries — a chunk may end
//! mid-line, mid-escaped-JSON-string, or inside a multi-byte character.
//! The decoder buffers raw bytes across chunks and only interprets
//! complete `\n`-delimited lines, so a split never drops a delta.

use log::{debug, warn};
use serde_json::Value;

use trellis_core::StreamEvent;

/// Event-data field prefix per the SSE framing
const DATA_PREFIX: &str = "data:";

/// Sentinel payload marking the end of the reply
const DONE_SENTINEL: &str = "[DONE]";

/// What a single extracted line decoded to
enum LineOutcome {
    /// A delta-content fragment
    Delta(String),
    /// The `[DONE]` sentinel
    Done,
    /// Nothing of interest (blank, comment, non-data, or no content field)
    Skip,
    /// Not yet parseable — needs more bytes
    Incomplete,
}

/// Streaming decoder from raw byte chunks to [`StreamEvent`]s.
///
/// Line extraction works on bytes: UTF-8 is self-synchronizing, so a
/// multi-byte character split across chunks simply stays buffered until the
/// newline that completes its line arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the sentinel was seen or the input was flushed
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one network chunk and collect the events it completes.
    ///
    /// Returns an empty vec when the chunk only extends a partial line.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.buf.extend_from_slice(chunk);
        self.drain_lines()
    }

    /// Signal end-of-input.
    ///
    /// If the sentinel never arrived, leftover buffered text gets one
    /// best-effort decode pass, then completion is signalled regardless.
    /// Trailing garbage is reported as a single `ParseError`, never an
    /// `Err` — partial content must not crash the consumer.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        let mut events = self.drain_lines();
        if self.finished {
            return events;
        }
        if !self.buf.is_empty() {
            let leftover = std::mem::take(&mut self.buf);
            match decode_line(&leftover) {
                LineOutcome::Delta(text) => events.push(StreamEvent::delta(text)),
                LineOutcome::Done | LineOutcome::Skip => {}
                LineOutcome::Incomplete => {
                    warn!("discarding undecodable trailing fragment ({} bytes)", leftover.len());
                    events.push(StreamEvent::ParseError);
                }
            }
        }
        self.finished = true;
        events.push(StreamEvent::Done);
        events
    }

    /// Extract and decode complete lines from the buffer.
    fn drain_lines(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while !self.finished {
            let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
                break;
            };
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop(); // the '\n' delimiter

            match decode_line(&line) {
                LineOutcome::Delta(text) => events.push(StreamEvent::delta(text)),
                LineOutcome::Done => {
                    debug!("stream end marker received");
                    self.finished = true;
                    events.push(StreamEvent::Done);
                }
                LineOutcome::Skip => {}
                LineOutcome::Incomplete => {
                    // The line was cut by chunking. Put it back in front of
                    // the remaining bytes and retry once more data arrives.
                    line.push(b'\n');
                    line.extend_from_slice(&self.buf);
                    self.buf = line;
                    break;
                }
            }
        }
        events
    }
}

/// Decode one extracted line (without its `\n` delimiter).
fn decode_line(line: &[u8]) -> LineOutcome {
    let Ok(text) = std::str::from_utf8(line) else {
        return LineOutcome::Incomplete;
    };
    let text = text.strip_suffix('\r').unwrap_or(text);

    if text.is_empty() {
        return LineOutcome::Skip;
    }
    // Comment / keep-alive line per the protocol
    if text.starts_with(':') {
        return LineOutcome::Skip;
    }
    let Some(rest) = text.strip_prefix(DATA_PREFIX) else {
        return LineOutcome::Skip;
    };
    let payload = rest.trim();
    if payload == DONE_SENTINEL {
        return LineOutcome::Done;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(value) => {
            let delta = value["choices"]
                .get(0)
                .and_then(|c| c["delta"]["content"].as_str());
            match delta {
                Some(content) if !content.is_empty() => {
                    LineOutcome::Delta(content.to_string())
                }
                // A payload without the content field is not an error
                _ => LineOutcome::Skip,
            }
        }
        Err(_) => LineOutcome::Incomplete,
    }
}
