//! Stream relay engine.
//!
//! The backend answers a chat call with an event stream of `data: <payload>` lines.
//! [`RelayEngine`] reassembles lines across network chunks and runs them through a
//! small state machine:
//!
//! - `Reading`: default. `[DONE]` moves to `Done`; a JSON object with
//!   `"action":"error"` moves to `Errored`; a JSON object with a string `message`
//!   yields text; everything else (blank lines, other fields, malformed JSON) is ignored.
//! - `Done` / `Errored`: terminal, no further input is examined.
//!
//! Two drivers sit on top: [`collect_text`] (buffered) and [`forward_chunks`] (live).

use std::collections::VecDeque;
use std::fmt::Display;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::RelayError;
use crate::format::{format_chunk, format_error_frame};

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Reading,
    Done,
    Errored,
}

/// A decoded unit of the backend stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    Message(String),
    Error { status: Option<u64>, kind: Option<String> },
    Done,
}

/// Decode one line of the backend stream. `None` means the line carries nothing.
pub fn parse_line(line: &str) -> Option<BackendEvent> {
    let payload = line.strip_prefix(DATA_PREFIX)?;
    if payload == DONE_SENTINEL {
        return Some(BackendEvent::Done);
    }

    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, payload, "ignoring malformed backend frame");
            return None;
        }
    };

    if value.get("action").and_then(|a| a.as_str()) == Some("error") {
        return Some(BackendEvent::Error {
            status: value.get("status").and_then(status_code),
            kind: value
                .get("type")
                .and_then(|t| t.as_str())
                .map(str::to_string),
        });
    }

    value
        .get("message")
        .and_then(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .map(|m| BackendEvent::Message(m.to_string()))
}

/// Accept numeric statuses and numeric strings.
pub(crate) fn status_code(v: &Value) -> Option<u64> {
    v.as_u64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Line framing plus the `Reading -> Done | Errored` state machine.
#[derive(Debug)]
pub struct RelayEngine {
    state: RelayState,
    buf: BytesMut,
}

impl Default for RelayEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayEngine {
    pub fn new() -> Self {
        Self {
            state: RelayState::Reading,
            buf: BytesMut::new(),
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state != RelayState::Reading
    }

    /// Feed raw bytes and return the events of every line completed by them.
    /// Processing stops at the first terminal event.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<BackendEvent> {
        let mut events = Vec::new();
        if self.is_terminal() {
            return events;
        }
        self.buf.extend_from_slice(chunk);
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line = self.buf.split_to(pos + 1);
            if let Some(ev) = self.accept(&line) {
                events.push(ev);
                if self.is_terminal() {
                    self.buf.clear();
                    break;
                }
            }
        }
        events
    }

    /// Signal end of input; a trailing line without a newline is still processed.
    pub fn finish(&mut self) -> Vec<BackendEvent> {
        if self.is_terminal() || self.buf.is_empty() {
            self.buf.clear();
            return Vec::new();
        }
        let rest = self.buf.split();
        self.accept(&rest).into_iter().collect()
    }

    fn accept(&mut self, raw: &[u8]) -> Option<BackendEvent> {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            return None;
        }
        let event = parse_line(line)?;
        match event {
            BackendEvent::Done => self.state = RelayState::Done,
            BackendEvent::Error { .. } => self.state = RelayState::Errored,
            BackendEvent::Message(_) => {}
        }
        Some(event)
    }
}

/// Pulls [`BackendEvent`]s out of a byte stream, suspending on each read.
///
/// Transport failures and end of input both end the event sequence; the caller
/// can tell them apart from a proper finish through [`EventReader::state`].
pub struct EventReader<S> {
    body: S,
    engine: RelayEngine,
    pending: VecDeque<BackendEvent>,
    exhausted: bool,
}

impl<S, E> EventReader<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    pub fn new(body: S) -> Self {
        Self {
            body,
            engine: RelayEngine::new(),
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn state(&self) -> RelayState {
        self.engine.state()
    }

    pub async fn next_event(&mut self) -> Option<BackendEvent> {
        loop {
            if let Some(ev) = self.pending.pop_front() {
                return Some(ev);
            }
            if self.exhausted || self.engine.is_terminal() {
                return None;
            }
            match self.body.next().await {
                Some(Ok(bytes)) => self.pending.extend(self.engine.push(&bytes)),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "backend stream interrupted");
                    self.exhausted = true;
                }
                None => {
                    self.exhausted = true;
                    self.pending.extend(self.engine.finish());
                    if !self.engine.is_terminal() {
                        tracing::debug!("backend stream ended without [DONE]");
                    }
                }
            }
        }
    }
}

/// Buffered mode: drain the stream and return the concatenated message text.
///
/// A backend error frame discards the partial text and becomes the error. Early
/// end of stream or a transport failure returns whatever was collected so far.
pub async fn collect_text<S, E>(body: S) -> Result<String, RelayError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    let mut reader = EventReader::new(body);
    let mut text = String::new();
    while let Some(event) = reader.next_event().await {
        match event {
            BackendEvent::Message(m) => text.push_str(&m),
            BackendEvent::Done => break,
            BackendEvent::Error { status, kind } => {
                return Err(RelayError::from_frame(status, kind.as_deref()));
            }
        }
    }
    Ok(text)
}

/// Live mode: forward one SSE chunk per message, in arrival order.
///
/// `[DONE]` produces a terminal stop chunk; an error frame produces a single error
/// frame and nothing after it. If the receiver goes away (client disconnect) the
/// relay stops writing; the backend request is simply dropped.
pub async fn forward_chunks<S, E>(body: S, model: String, tx: mpsc::Sender<String>)
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    let mut reader = EventReader::new(body);
    while let Some(event) = reader.next_event().await {
        let frame = match event {
            BackendEvent::Message(m) => format_chunk(&m, false, &model),
            BackendEvent::Done => format_chunk("", true, &model),
            BackendEvent::Error { status, kind } => {
                let err = RelayError::from_frame(status, kind.as_deref());
                tracing::warn!(status = err.status().as_u16(), error = %err, "backend error mid-stream");
                format_error_frame(&err)
            }
        };
        if tx.send(frame).await.is_err() {
            tracing::debug!("client disconnected, stopping relay");
            return;
        }
    }
    tracing::debug!(state = ?reader.state(), "relay finished");
}
