#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for Story Arcade Client integration tests.
//!
//! Provides a scripted [`MockTransport`] and helper functions for
//! constructing the JSON lines the backend emits on both channels.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use story_arcade_client::protocol::{PlayerInfo, RoomInfo, ServerMessage, StoryTurn};
use story_arcade_client::{StoryArcadeError, Transport};

// ── MockTransport ───────────────────────────────────────────────────

/// A scripted mock transport for integration testing.
///
/// Scripted server lines are consumed in order by `recv()`.
/// All messages sent by the client are recorded in `sent`.
pub struct MockTransport {
    /// Scripted server lines (consumed in order by `recv`).
    incoming: VecDeque<Option<Result<String, StoryArcadeError>>>,
    /// Recorded outgoing messages from the client.
    pub sent: Arc<StdMutex<Vec<String>>>,
    /// Whether `close()` has been called.
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a new mock transport with the given scripted incoming lines.
    ///
    /// Returns the transport plus shared handles for inspecting sent messages
    /// and whether close was called.
    pub fn new(
        incoming: Vec<Option<Result<String, StoryArcadeError>>>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), StoryArcadeError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, StoryArcadeError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // No more scripted lines — hang forever so the transport loop
            // stays alive until shutdown is called.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), StoryArcadeError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── Room fixture builders ───────────────────────────────────────────

/// Build a [`RoomInfo`] with the given `(id, name, is_host)` players and
/// turn pointer.
pub fn room_info(
    room_id: &str,
    players: &[(&str, &str, bool)],
    current_turn: Option<&str>,
) -> RoomInfo {
    let mut map = BTreeMap::new();
    for (id, name, is_host) in players {
        map.insert(
            id.to_string(),
            PlayerInfo {
                name: name.to_string(),
                is_host: *is_host,
                is_online: true,
            },
        );
    }
    RoomInfo {
        room_id: Some(room_id.into()),
        players: map,
        current_turn: current_turn.map(String::from),
        game_settings: None,
    }
}

pub fn story_turn(player: &str, text: &str, timestamp: i64) -> StoryTurn {
    StoryTurn {
        player: player.into(),
        text: text.into(),
        timestamp,
    }
}

// ── JSON helper functions ───────────────────────────────────────────

/// Returns the JSON line for a `room_created` server message.
pub fn room_created_json(room_id: &str, host_id: &str, host_name: &str) -> String {
    serde_json::to_string(&ServerMessage::RoomCreated {
        room_id: room_id.into(),
        room_info: room_info(room_id, &[(host_id, host_name, true)], None),
    })
    .expect("room_created_json serialization")
}

/// Returns the JSON line for a `room_joined` server message.
pub fn room_joined_json(room_id: &str, players: &[(&str, &str, bool)]) -> String {
    serde_json::to_string(&ServerMessage::RoomJoined {
        room_id: Some(room_id.into()),
        room_info: room_info(room_id, players, None),
    })
    .expect("room_joined_json serialization")
}

/// Returns the JSON line for a `player_joined` server message.
pub fn player_joined_json(
    room_id: &str,
    joined_id: &str,
    players: &[(&str, &str, bool)],
) -> String {
    serde_json::to_string(&ServerMessage::PlayerJoined {
        player_id: Some(joined_id.into()),
        room_info: room_info(room_id, players, None),
    })
    .expect("player_joined_json serialization")
}

/// Returns the JSON line for a `game_started` server message.
pub fn game_started_json(
    room_id: &str,
    players: &[(&str, &str, bool)],
    first_turn: &str,
    story: Vec<StoryTurn>,
) -> String {
    serde_json::to_string(&ServerMessage::GameStarted {
        room_info: room_info(room_id, players, Some(first_turn)),
        story_content: story,
    })
    .expect("game_started_json serialization")
}

/// Returns the JSON line for a `turn_submitted` server message.
pub fn turn_submitted_json(
    room_id: &str,
    players: &[(&str, &str, bool)],
    next_turn: &str,
    story: Vec<StoryTurn>,
) -> String {
    serde_json::to_string(&ServerMessage::TurnSubmitted {
        room_info: room_info(room_id, players, Some(next_turn)),
        story_content: story,
    })
    .expect("turn_submitted_json serialization")
}

/// Returns the JSON line for an `ai_turn_completed` server message.
pub fn ai_turn_completed_json(
    room_id: &str,
    players: &[(&str, &str, bool)],
    next_turn: &str,
    story: Vec<StoryTurn>,
) -> String {
    serde_json::to_string(&ServerMessage::AiTurnCompleted {
        room_info: room_info(room_id, players, Some(next_turn)),
        story_content: story,
    })
    .expect("ai_turn_completed_json serialization")
}

/// Returns the JSON line for a `room_info` server message.
pub fn room_info_json(
    room_id: &str,
    players: &[(&str, &str, bool)],
    current_turn: Option<&str>,
) -> String {
    serde_json::to_string(&ServerMessage::RoomInfo {
        room_info: room_info(room_id, players, current_turn),
    })
    .expect("room_info_json serialization")
}

/// Returns the JSON line for a `heartbeat_response` server message.
pub fn heartbeat_response_json() -> String {
    serde_json::to_string(&ServerMessage::HeartbeatResponse)
        .expect("heartbeat_response_json serialization")
}

/// Returns the JSON line for a server `error` message.
pub fn error_json(message: &str) -> String {
    serde_json::to_string(&ServerMessage::Error {
        message: message.into(),
    })
    .expect("error_json serialization")
}

// ── Stream channel lines ────────────────────────────────────────────

/// Returns a `data:` line carrying a text fragment.
pub fn chunk_line(content: &str) -> String {
    format!(
        "data: {}",
        serde_json::json!({ "chunk": content })
    )
}

/// Returns a `data:` line marking stream completion.
pub fn done_line() -> String {
    r#"data: {"done": true}"#.to_string()
}

/// Returns a `data:` completion line carrying a freshly minted session id.
pub fn done_line_with_session(session_id: &str) -> String {
    format!(
        "data: {}",
        serde_json::json!({ "done": true, "session_id": session_id })
    )
}

/// Returns a `data:` completion line carrying question counters.
pub fn done_line_with_counters(question_count: u32, max_questions: u32) -> String {
    format!(
        "data: {}",
        serde_json::json!({
            "done": true,
            "question_count": question_count,
            "max_questions": max_questions
        })
    )
}

/// Returns a `data:` line carrying a stream-level error.
pub fn stream_error_line(message: &str) -> String {
    format!("data: {}", serde_json::json!({ "error": message }))
}
