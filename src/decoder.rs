//! Line reassembly and event decoding for both server channels.
//!
//! Streaming HTTP responses arrive as arbitrary byte chunks whose boundaries
//! need not align with logical records; [`LineBuffer`] reassembles complete
//! newline-terminated lines (and whole UTF-8 sequences) before anything is
//! decoded. [`decode_line`] then normalizes a single line — either a
//! `data: {...}` stream record or a bare `{"type": ...}` socket message —
//! into a [`GameEvent`].
//!
//! Malformed lines never abort a stream: the transport framing guarantees a
//! later line may repair it, so a bad line decodes to `None` and is logged.

use tracing::{debug, warn};

use crate::event::{CompletionMeta, GameEvent};
use crate::protocol::{ServerMessage, StreamRecord};

/// Prefix marking a payload line on the stream channel.
const DATA_PREFIX: &str = "data: ";

// ── Line reassembly ─────────────────────────────────────────────────

/// Reassembles newline-terminated lines from arbitrary byte chunks.
///
/// A line is only yielded once its `\n` terminator has been buffered, so a
/// record split across network reads (even mid-codepoint) is never decoded
/// early. Carriage returns before the terminator are stripped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw chunk to the buffer.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete line, without its terminator.
    ///
    /// Bytes are converted lossily: the backend only emits UTF-8, so
    /// replacement characters indicate corruption we choose to survive.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop(); // the \n itself
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Number of buffered bytes not yet forming a complete line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drop any buffered partial line. Called at stream EOF: a fragment is
    /// usable only once newline-terminated, and the backend terminates every
    /// record, so leftovers mean the stream was cut mid-record.
    pub fn discard_partial(&mut self) {
        if !self.buf.is_empty() {
            warn!(
                bytes = self.buf.len(),
                "discarding partial line at end of stream"
            );
            self.buf.clear();
        }
    }
}

// ── Event decoding ──────────────────────────────────────────────────

/// Decode one complete line into a [`GameEvent`].
///
/// Returns `None` for lines that carry no event: blank keep-alive lines,
/// lines without a recognized framing, heartbeat responses, and malformed
/// payloads (which are logged, not raised).
pub fn decode_line(line: &str) -> Option<GameEvent> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(payload) = trimmed.strip_prefix(DATA_PREFIX) {
        return decode_stream_record(payload);
    }

    // Socket frames are bare JSON objects tagged with a `type` field.
    if trimmed.starts_with('{') {
        match serde_json::from_str::<ServerMessage>(trimmed) {
            Ok(msg) => return GameEvent::from_server(msg),
            Err(e) => {
                warn!("failed to decode server message: {e} — raw: {trimmed}");
                return None;
            }
        }
    }

    debug!("ignoring unrecognized line: {trimmed}");
    None
}

fn decode_stream_record(payload: &str) -> Option<GameEvent> {
    let record = match serde_json::from_str::<StreamRecord>(payload) {
        Ok(record) => record,
        Err(e) => {
            warn!("failed to decode stream record: {e} — raw: {payload}");
            return None;
        }
    };

    if let Some(message) = record.error.clone() {
        return Some(GameEvent::ServerError { message });
    }
    if let Some(content) = record.chunk.clone() {
        return Some(GameEvent::Fragment { content });
    }
    if record.done == Some(true) {
        return Some(GameEvent::Completed {
            meta: CompletionMeta::from(&record),
        });
    }

    debug!("stream record carries no chunk, done, or error — ignoring");
    None
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    // ── LineBuffer ──────────────────────────────────────────────────

    #[test]
    fn line_buffer_yields_nothing_without_terminator() {
        let mut buf = LineBuffer::new();
        buf.push(b"data: {\"chunk\": \"par");
        assert!(buf.next_line().is_none());
        assert!(buf.pending() > 0);
    }

    #[test]
    fn line_buffer_reassembles_split_lines() {
        let mut buf = LineBuffer::new();
        buf.push(b"data: {\"chunk\"");
        buf.push(b": \"hi\"}\ndata: ");
        assert_eq!(buf.next_line().unwrap(), "data: {\"chunk\": \"hi\"}");
        assert!(buf.next_line().is_none());
        buf.push(b"{\"done\": true}\n");
        assert_eq!(buf.next_line().unwrap(), "data: {\"done\": true}");
    }

    #[test]
    fn line_buffer_handles_split_utf8_sequence() {
        // "héllo" with the é split across two chunks.
        let bytes = "data: {\"chunk\": \"héllo\"}\n".as_bytes();
        let mut buf = LineBuffer::new();
        buf.push(&bytes[..18]);
        assert!(buf.next_line().is_none());
        buf.push(&bytes[18..]);
        assert_eq!(buf.next_line().unwrap(), "data: {\"chunk\": \"héllo\"}");
    }

    #[test]
    fn line_buffer_strips_carriage_return() {
        let mut buf = LineBuffer::new();
        buf.push(b"hello\r\nworld\n");
        assert_eq!(buf.next_line().unwrap(), "hello");
        assert_eq!(buf.next_line().unwrap(), "world");
    }

    #[test]
    fn discard_partial_clears_leftovers() {
        let mut buf = LineBuffer::new();
        buf.push(b"never termin");
        buf.discard_partial();
        assert_eq!(buf.pending(), 0);
    }

    // ── decode_line ─────────────────────────────────────────────────

    #[test]
    fn decodes_chunk_to_fragment() {
        let event = decode_line(r#"data: {"chunk": "Once"}"#).unwrap();
        assert!(matches!(event, GameEvent::Fragment { content } if content == "Once"));
    }

    #[test]
    fn decodes_done_with_session_id() {
        let event = decode_line(r#"data: {"done": true, "session_id": "abc-123"}"#).unwrap();
        match event {
            GameEvent::Completed { meta } => {
                assert_eq!(meta.session_id.as_deref(), Some("abc-123"));
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn decodes_counters_on_done() {
        let event =
            decode_line(r#"data: {"done": true, "question_count": 3, "max_questions": 8}"#)
                .unwrap();
        match event {
            GameEvent::Completed { meta } => {
                assert_eq!(meta.question_count, Some(3));
                assert_eq!(meta.max_questions, Some(8));
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn decodes_error_record() {
        let event = decode_line(r#"data: {"error": "model unavailable"}"#).unwrap();
        assert!(
            matches!(event, GameEvent::ServerError { message } if message == "model unavailable")
        );
    }

    #[test]
    fn unprefixed_line_is_ignored() {
        assert!(decode_line(": keep-alive comment").is_none());
        assert!(decode_line("event: message").is_none());
        assert!(decode_line("").is_none());
    }

    #[test]
    fn malformed_json_is_swallowed() {
        assert!(decode_line("data: {not json").is_none());
        assert!(decode_line("{broken").is_none());
    }

    #[test]
    fn decodes_socket_error_message() {
        let event = decode_line(r#"{"type": "error", "message": "방을 찾을 수 없습니다"}"#).unwrap();
        assert!(matches!(event, GameEvent::ServerError { .. }));
    }

    #[test]
    fn heartbeat_response_produces_no_event() {
        assert!(decode_line(r#"{"type": "heartbeat_response"}"#).is_none());
    }

    #[test]
    fn decodes_room_created_to_session_ack() {
        let line = r#"{"type": "room_created", "room_id": "ROOM42", "room_info": {"players": {"player-1": {"name": "Alice", "is_host": true, "is_online": true}}}}"#;
        match decode_line(line).unwrap() {
            GameEvent::SessionAck { snapshot } => {
                assert_eq!(snapshot.room_id.as_deref(), Some("ROOM42"));
                assert_eq!(snapshot.room.unwrap().players.len(), 1);
            }
            other => panic!("expected SessionAck, got {other:?}"),
        }
    }
}
