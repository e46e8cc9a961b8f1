//! Server-Sent-Events client for the Wikimedia recent-change stream.
//!
//! The parser is incremental: it is fed raw body chunks as they arrive and
//! emits complete frames, so frames split across chunk boundaries are
//! reassembled transparently.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{AppError, AppResult};

/// One decoded SSE event. The payload is treated as opaque text; nothing
/// downstream inspects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub id: Option<String>,
    pub event: String,
    pub data: String,
}

/// A complete frame produced by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Event(SseEvent),
    Comment(String),
}

/// Incremental SSE wire-format decoder.
///
/// Lines are extracted from a byte buffer only once a terminating newline has
/// arrived, so multi-byte UTF-8 sequences split across chunks never tear.
#[derive(Debug, Default)]
pub struct SseParser {
    buf: Vec<u8>,
    data_lines: Vec<String>,
    event_type: Option<String>,
    last_id: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one body chunk, returning every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let mut line = String::from_utf8_lossy(&raw[..raw.len() - 1]).into_owned();
            if line.ends_with('\r') {
                line.pop();
            }
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }

        if let Some(comment) = line.strip_prefix(':') {
            return Some(SseFrame::Comment(
                comment.strip_prefix(' ').unwrap_or(comment).to_string(),
            ));
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data_lines.push(value.to_string()),
            "event" => self.event_type = Some(value.to_string()),
            // The id persists across events (SSE last-event-id semantics).
            "id" if !value.contains('\0') => self.last_id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event_type = self.event_type.take();
        if self.data_lines.is_empty() {
            return None;
        }
        let data = self.data_lines.join("\n");
        self.data_lines.clear();
        Some(SseFrame::Event(SseEvent {
            id: self.last_id.clone(),
            event: event_type.unwrap_or_else(|| "message".to_string()),
            data,
        }))
    }
}

/// Long-lived streaming HTTP client over the event-source endpoint.
pub struct SseClient {
    http: reqwest::Client,
    url: String,
}

impl SseClient {
    pub fn new(url: &str) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::StreamConnect(e.to_string()))?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }

    /// Open the streaming connection. The returned [`EventStream`] yields
    /// decoded events until the server ends the stream.
    pub async fn connect(&self) -> AppResult<EventStream> {
        let response = self
            .http
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| AppError::StreamConnect(e.to_string()))?
            .error_for_status()
            .map_err(|e| AppError::StreamConnect(e.to_string()))?;

        debug!(url = %self.url, "event stream opened");

        Ok(EventStream {
            body: Box::pin(response.bytes_stream()),
            parser: SseParser::new(),
        })
    }
}

/// An open streaming connection being decoded frame by frame.
pub struct EventStream {
    body: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    parser: SseParser,
}

impl EventStream {
    /// Forward every decoded event into `tx`.
    ///
    /// Returns `Ok(())` when the server ends the stream or the receiving side
    /// of the channel is gone (session teardown); transport failures surface
    /// as errors so the session state machine can decide on a reconnect.
    pub async fn forward(mut self, tx: mpsc::Sender<SseEvent>) -> AppResult<()> {
        while let Some(chunk) = self.body.next().await {
            let chunk = chunk.map_err(|e| AppError::StreamTransport(e.to_string()))?;
            for frame in self.parser.push(&chunk) {
                match frame {
                    SseFrame::Event(event) => {
                        if tx.send(event).await.is_err() {
                            debug!("event channel closed, ending stream read");
                            return Ok(());
                        }
                    }
                    SseFrame::Comment(comment) => {
                        trace!(comment = %comment, "stream comment");
                    }
                }
            }
        }

        debug!("event stream ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(frames: Vec<SseFrame>) -> Vec<SseEvent> {
        frames
            .into_iter()
            .filter_map(|f| match f {
                SseFrame::Event(e) => Some(e),
                SseFrame::Comment(_) => None,
            })
            .collect()
    }

    #[test]
    fn parses_single_data_event() {
        let mut parser = SseParser::new();
        let got = events(parser.push(b"data: {\"type\":\"edit\",\"title\":\"Test\"}\n\n"));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].data, r#"{"type":"edit","title":"Test"}"#);
        assert_eq!(got[0].event, "message");
    }

    #[test]
    fn joins_multi_line_data_with_newline() {
        let mut parser = SseParser::new();
        let got = events(parser.push(b"data: first\ndata: second\n\n"));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].data, "first\nsecond");
    }

    #[test]
    fn reassembles_frames_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"data: par").is_empty());
        assert!(parser.push(b"tial pay").is_empty());
        let got = events(parser.push(b"load\n\n"));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].data, "partial payload");
    }

    #[test]
    fn handles_crlf_line_endings() {
        let mut parser = SseParser::new();
        let got = events(parser.push(b"data: hello\r\n\r\n"));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].data, "hello");
    }

    #[test]
    fn comments_are_surfaced_but_not_events() {
        let mut parser = SseParser::new();
        let frames = parser.push(b": keep-alive\ndata: x\n\n");
        assert_eq!(frames[0], SseFrame::Comment("keep-alive".into()));
        assert_eq!(events(frames).len(), 1);
    }

    #[test]
    fn event_id_persists_across_events() {
        let mut parser = SseParser::new();
        let first = events(parser.push(b"id: 42\ndata: a\n\n"));
        assert_eq!(first[0].id.as_deref(), Some("42"));
        let second = events(parser.push(b"data: b\n\n"));
        assert_eq!(second[0].id.as_deref(), Some("42"));
    }

    #[test]
    fn named_event_type_is_carried() {
        let mut parser = SseParser::new();
        let got = events(parser.push(b"event: recentchange\ndata: x\n\n"));
        assert_eq!(got[0].event, "recentchange");
        // The type does not stick to the next event.
        let next = events(parser.push(b"data: y\n\n"));
        assert_eq!(next[0].event, "message");
    }

    #[test]
    fn blank_line_without_data_emits_nothing() {
        let mut parser = SseParser::new();
        assert!(events(parser.push(b"\n\n\n")).is_empty());
    }

    #[test]
    fn multibyte_utf8_survives_chunk_splits() {
        let mut parser = SseParser::new();
        let payload = "data: caf\u{e9} \u{1f4dd}\n\n".as_bytes();
        // Split inside the multi-byte sequence.
        let mid = payload.len() - 4;
        assert!(parser.push(&payload[..mid]).is_empty());
        let got = events(parser.push(&payload[mid..]));
        assert_eq!(got[0].data, "caf\u{e9} \u{1f4dd}");
    }
}
