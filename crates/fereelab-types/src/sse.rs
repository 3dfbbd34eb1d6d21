//! Incremental parser for chat-completion event streams.
//!
//! Upstream frames a streamed completion as newline-delimited
//! `data: {json}` lines and ends it with `data: [DONE]`. Network chunks do
//! not respect line or UTF-8 boundaries, so [`SseParser`] buffers partial
//! lines and partial code points between calls to [`SseParser::push`].
//!
//! Lines that are not `data:` lines (comments, `event:`, keep-alives) are
//! ignored; `data:` payloads that fail to parse are logged and skipped.
//! Everything after the `[DONE]` sentinel is discarded.

use serde::Deserialize;
use tracing::warn;

const DONE_SENTINEL: &str = "[DONE]";

/// One meaningful item extracted from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// An incremental piece of assistant text.
    Delta(String),
    /// Upstream reported an error inside the stream.
    Error(String),
    /// The `[DONE]` sentinel.
    Done,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default)]
pub struct SseParser {
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending: Vec<u8>,
    /// Text of the current, not yet terminated line.
    line: String,
    done: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one network chunk and return the events completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        if self.done {
            return Vec::new();
        }
        self.pending.extend_from_slice(chunk);
        let text = self.decode_pending();
        self.line.push_str(&text);

        let mut events = Vec::new();
        while let Some(pos) = self.line.find('\n') {
            let raw: String = self.line.drain(..=pos).collect();
            if let Some(event) = parse_line(raw.trim_end_matches(['\n', '\r'])) {
                let finished = event == SseEvent::Done;
                events.push(event);
                if finished {
                    self.finish_stream();
                    break;
                }
            }
        }
        events
    }

    /// Flush a final line that arrived without a trailing newline.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        if self.done {
            return Vec::new();
        }
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.line.push_str(&tail);
            self.pending.clear();
        }
        let rest = std::mem::take(&mut self.line);
        let events: Vec<SseEvent> = parse_line(rest.trim_end_matches('\r')).into_iter().collect();
        self.finish_stream();
        events
    }

    fn finish_stream(&mut self) {
        self.done = true;
        self.line.clear();
        self.pending.clear();
    }

    /// Decode as much of `pending` as forms complete UTF-8, replacing
    /// invalid sequences and keeping an incomplete tail for the next chunk.
    fn decode_pending(&mut self) -> String {
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    out.push_str(s);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }
}

fn parse_line(line: &str) -> Option<SseEvent> {
    let payload = line.strip_prefix("data:")?;
    let payload = payload.strip_prefix(' ').unwrap_or(payload).trim();
    if payload.is_empty() {
        return None;
    }
    if payload == DONE_SENTINEL {
        return Some(SseEvent::Done);
    }

    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => {
            if let Some(err) = chunk.error {
                return Some(SseEvent::Error(
                    err.message.unwrap_or_else(|| "upstream stream error".to_owned()),
                ));
            }
            chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta)
                .and_then(|delta| delta.content)
                .filter(|content| !content.is_empty())
                .map(SseEvent::Delta)
        }
        Err(e) => {
            warn!(error = %e, data = %payload, "skipping malformed stream event");
            None
        }
    }
}

/// Concatenate every text delta in a complete stream body.
pub fn assemble(body: &[u8]) -> String {
    let mut parser = SseParser::new();
    let mut events = parser.push(body);
    events.extend(parser.finish());
    events
        .into_iter()
        .filter_map(|event| match event {
            SseEvent::Delta(text) => Some(text),
            _ => None,
        })
        .collect()
}
