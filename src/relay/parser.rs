//! Pure event-stream parser.
//!
//! Implements the minimal line grammar the controller speaks: `data:`
//! lines accumulate a payload, `event:` names it, a blank line dispatches
//! the accumulated payload as one JSON-decoded frame, and a leading colon
//! is a comment. No I/O here; the relay feeds bytes in and gets frames
//! out, which keeps the grammar testable without a connection.

use bridge_events::{event_names, EventFrame};
use tracing::debug;

/// Line-level parser state: the name and payload of the frame being
/// accumulated.
#[derive(Debug, Default)]
pub struct EventStreamParser {
    event_name: Option<String>,
    data: String,
}

impl EventStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one line (no trailing newline). Returns a frame when the
    /// line completes one; malformed payloads are dropped silently.
    pub fn push_line(&mut self, line: &str) -> Option<EventFrame> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            // comment / keep-alive
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(value);
            }
            "event" => self.event_name = Some(value.to_string()),
            // id/retry and anything else the controller may add
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<EventFrame> {
        let name = self
            .event_name
            .take()
            .unwrap_or_else(|| event_names::MESSAGE.to_string());
        let data = std::mem::take(&mut self.data);

        if data.is_empty() {
            return None;
        }
        match serde_json::from_str(&data) {
            Ok(payload) => Some(EventFrame::new(name, payload)),
            Err(e) => {
                debug!("dropping malformed {} frame: {}", name, e);
                None
            }
        }
    }
}

/// Byte-level decoder: buffers partial lines across network chunks and
/// runs complete lines through the parser.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    parser: EventStreamParser,
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk, returning every frame it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<EventFrame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            if let Some(frame) = self.parser.push_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed_str(decoder: &mut FrameDecoder, s: &str) -> Vec<EventFrame> {
        decoder.feed(s.as_bytes())
    }

    #[test]
    fn named_event_dispatches_on_blank_line() {
        let mut d = FrameDecoder::new();
        let frames = feed_str(
            &mut d,
            "event: now\ndata: {\"title\":\"X\",\"state\":\"playing\"}\n\n",
        );
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_name, "now");
        assert_eq!(frames[0].payload["title"], json!("X"));
    }

    #[test]
    fn unnamed_event_defaults_to_message() {
        let mut d = FrameDecoder::new();
        let frames = feed_str(&mut d, "data: {\"a\":1}\n\n");
        assert_eq!(frames[0].event_name, "message");
    }

    #[test]
    fn malformed_json_is_dropped_and_stream_continues() {
        let mut d = FrameDecoder::new();
        let frames = feed_str(&mut d, "data: {not json}\n\n");
        assert!(frames.is_empty());

        // The parser state was reset; the next frame parses cleanly
        let frames = feed_str(&mut d, "event: now\ndata: {\"title\":\"Y\"}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_name, "now");
    }

    #[test]
    fn comments_and_unknown_fields_are_ignored() {
        let mut d = FrameDecoder::new();
        let frames = feed_str(
            &mut d,
            ": keep-alive\nid: 7\nretry: 500\nevent: master_volume\ndata: 42\n\n",
        );
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, json!(42));
    }

    #[test]
    fn multi_line_data_is_joined_with_newlines() {
        let mut d = FrameDecoder::new();
        // JSON spread over two data lines still decodes
        let frames = feed_str(&mut d, "data: {\"a\":\ndata: 1}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, json!({"a": 1}));
    }

    #[test]
    fn blank_line_without_data_dispatches_nothing() {
        let mut d = FrameDecoder::new();
        assert!(feed_str(&mut d, "event: now\n\n").is_empty());
        assert!(feed_str(&mut d, "\n\n\n").is_empty());
    }

    #[test]
    fn frames_survive_arbitrary_chunk_boundaries() {
        let mut d = FrameDecoder::new();
        let wire = "event: now\ndata: {\"title\":\"Split\"}\n\nevent: master_volume\ndata: 10\n\n";
        let mut frames = Vec::new();
        for chunk in wire.as_bytes().chunks(7) {
            frames.extend(d.feed(chunk));
        }
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event_name, "now");
        assert_eq!(frames[1].event_name, "master_volume");
    }

    #[test]
    fn crlf_lines_are_handled() {
        let mut d = FrameDecoder::new();
        let frames = feed_str(&mut d, "event: now\r\ndata: {\"title\":\"Z\"}\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload["title"], json!("Z"));
    }
}
