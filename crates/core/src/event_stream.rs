//! Push-event stream parsing.
//!
//! The compute service reports progress as a line-oriented event stream:
//!
//! ```text
//! event: progress
//! data: {"generation": 3}
//!
//! event: done
//! data: {"fill_rate": 0.81,
//! data:  "placed_items": [...]}
//!
//! ```
//!
//! Every line is passed through to the subscriber untouched. Only the
//! `done` event is interpreted: its `data:` chunks are concatenated with
//! no separator and parsed as one JSON document.
//!
//! [`LineSplitter`] turns arbitrary byte chunks into whole lines and
//! [`EventStreamParser`] consumes those lines one at a time.

/// Name of the one event whose payload is interpreted.
pub const DONE_EVENT: &str = "done";

const EVENT_PREFIX: &str = "event:";
const DATA_PREFIX: &str = "data:";

// ---------------------------------------------------------------------------
// Line splitting
// ---------------------------------------------------------------------------

/// Reassembles newline-terminated lines from arbitrarily split byte chunks.
///
/// Splitting happens on raw bytes, so a multi-byte UTF-8 sequence that
/// straddles two chunks is decoded correctly once the line completes.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completes, without the
    /// trailing `\n` or `\r\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            self.pending.extend_from_slice(&rest[..pos]);
            lines.push(decode_line(&self.pending));
            self.pending.clear();
            rest = &rest[pos + 1..];
        }
        self.pending.extend_from_slice(rest);
        lines
    }

    /// Flush an unterminated final fragment at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = decode_line(&self.pending);
        self.pending.clear();
        Some(line)
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.trim_end_matches(['\r', '\n']).to_string()
}

/// Render a line the way it is forwarded to the subscriber.
pub fn forwarded_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + 1);
    out.push_str(line.trim_end_matches(['\r', '\n']));
    out.push('\n');
    out
}

// ---------------------------------------------------------------------------
// Event parsing
// ---------------------------------------------------------------------------

/// Final outcome of a `done` event.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalEvent {
    /// The accumulated payload parsed as JSON.
    Payload(serde_json::Value),
    /// The accumulated payload was not valid JSON. Carries the raw text
    /// and the parse error so the caller can log it.
    Malformed { raw: String, error: String },
}

/// What the caller should do after feeding a line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseStep {
    /// Keep reading.
    Continue,
    /// The `done` event ended; stop reading.
    Terminal(TerminalEvent),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Mode {
    #[default]
    Scanning,
    Accumulating,
    Finished,
}

/// Line-at-a-time state machine for the push-event stream.
#[derive(Debug, Default)]
pub struct EventStreamParser {
    mode: Mode,
    buffer: String,
}

impl EventStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a `done` event has been seen (whether or not it finished).
    pub fn saw_done(&self) -> bool {
        self.mode != Mode::Scanning
    }

    /// Feed one line (with or without its line terminator).
    ///
    /// After a [`ParseStep::Terminal`] has been returned, further lines
    /// are ignored and yield [`ParseStep::Continue`].
    pub fn push_line(&mut self, line: &str) -> ParseStep {
        let line = line.trim_end_matches(['\r', '\n']);
        match self.mode {
            Mode::Finished => ParseStep::Continue,
            Mode::Scanning => {
                if is_done_event(line) {
                    self.mode = Mode::Accumulating;
                    self.buffer.clear();
                }
                ParseStep::Continue
            }
            Mode::Accumulating => {
                if let Some(chunk) = data_chunk(line) {
                    self.buffer.push_str(chunk);
                    return ParseStep::Continue;
                }
                // A blank line closes the event; so does any other line.
                ParseStep::Terminal(self.complete())
            }
        }
    }

    /// Signal end of the underlying stream.
    ///
    /// Returns the terminal event if a `done` event was open, otherwise
    /// `None`: a stream that ends before any `done` event produced no
    /// structured result.
    pub fn finish(&mut self) -> Option<TerminalEvent> {
        match self.mode {
            Mode::Accumulating => Some(self.complete()),
            Mode::Scanning | Mode::Finished => None,
        }
    }

    fn complete(&mut self) -> TerminalEvent {
        self.mode = Mode::Finished;
        let raw = std::mem::take(&mut self.buffer);
        match serde_json::from_str(&raw) {
            Ok(value) => TerminalEvent::Payload(value),
            Err(e) => TerminalEvent::Malformed {
                raw,
                error: e.to_string(),
            },
        }
    }
}

fn is_done_event(line: &str) -> bool {
    line.strip_prefix(EVENT_PREFIX)
        .is_some_and(|name| name.trim() == DONE_EVENT)
}

/// The payload of a `data:` line, with the single optional space after
/// the colon removed.
fn data_chunk(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(DATA_PREFIX)?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}
