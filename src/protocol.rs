//! Wire-compatible protocol types for the Story Arcade backend.
//!
//! Every type in this module produces the same JSON the backend emits or
//! accepts. Two channels share these shapes:
//!
//! - the WebSocket room channel (cooperative story), internally tagged with a
//!   `type` field,
//! - the HTTP endpoints whose responses stream `data: {...}` lines
//!   ([`StreamRecord`]) or return a single JSON payload ([`CaseData`],
//!   [`AccusationResult`]).
//!
//! The schema is owned by the backend; optional fields default rather than
//! fail so older/newer servers keep decoding.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Shared structs ──────────────────────────────────────────────────

/// Mode-specific configuration chosen at setup time. All values are opaque
/// strings interpreted by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSettings {
    pub genre: String,
    pub model: String,
}

impl GameSettings {
    pub fn new(genre: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            genre: genre.into(),
            model: model.into(),
        }
    }
}

/// A participant entry inside a room snapshot, keyed by player id in
/// [`RoomInfo::players`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerInfo {
    pub name: String,
    pub is_host: bool,
    pub is_online: bool,
}

/// One finished contribution to a cooperative story.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoryTurn {
    /// Display name of the contributor, or the sentinel `"AI"`.
    pub player: String,
    pub text: String,
    /// Unix timestamp in milliseconds, assigned by the server.
    pub timestamp: i64,
}

/// Server-authoritative room snapshot. Pushed wholesale with most room
/// messages; clients must total-replace their mirrored copy, never merge.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoomInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    /// Player id → player info. A `BTreeMap` keeps iteration order stable.
    #[serde(default)]
    pub players: BTreeMap<String, PlayerInfo>,
    /// Player id of whoever may act next, once the game has started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_turn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_settings: Option<GameSettings>,
}

// ── Socket channel messages ─────────────────────────────────────────

/// Message types sent from client to server over the room WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create a new room and become its host (MUST be the first message).
    CreateRoom {
        player_name: String,
        game_settings: GameSettings,
    },
    /// Join an existing room by id (MUST be the first message).
    JoinRoom {
        player_name: String,
        room_id: String,
    },
    /// Host-only: start the cooperative game.
    StartGame,
    /// Contribute the next story turn.
    SubmitTurn { text: String },
    /// Leave the current room.
    LeaveRoom,
    /// Request a fresh room snapshot.
    GetRoomInfo,
    /// Keep-alive.
    Heartbeat,
}

/// Message types pushed from server to client over the room WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Room created; the requester is now host.
    RoomCreated { room_id: String, room_info: RoomInfo },
    /// Successfully joined a room.
    RoomJoined {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        room_info: RoomInfo,
    },
    /// Another player joined.
    PlayerJoined {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<String>,
        room_info: RoomInfo,
    },
    /// A player left voluntarily.
    PlayerLeft {
        player_id: String,
        room_info: RoomInfo,
    },
    /// A player's connection dropped.
    PlayerDisconnected {
        player_id: String,
        room_info: RoomInfo,
    },
    /// The host started the game; first turn is assigned.
    GameStarted {
        room_info: RoomInfo,
        story_content: Vec<StoryTurn>,
    },
    /// A human turn was accepted; the turn pointer advanced.
    TurnSubmitted {
        room_info: RoomInfo,
        story_content: Vec<StoryTurn>,
    },
    /// The AI finished its turn; the turn pointer advanced.
    AiTurnCompleted {
        room_info: RoomInfo,
        story_content: Vec<StoryTurn>,
    },
    /// Response to [`ClientMessage::GetRoomInfo`].
    RoomInfo { room_info: RoomInfo },
    /// Response to [`ClientMessage::Heartbeat`].
    HeartbeatResponse,
    /// Application-level error (room not found, not your turn, ...).
    Error { message: String },
}

// ── Stream channel framing ──────────────────────────────────────────

/// Payload of one `data: {...}` line on a streaming HTTP response.
///
/// The backend multiplexes several concerns onto this record: a `chunk`
/// field carries a text fragment, a `done` field marks stream completion,
/// and the remaining fields are side-channel metadata that may accompany
/// either. Unknown fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StreamRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_questions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_clue: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_clues_found: Option<u32>,
}

// ── HTTP request payloads ───────────────────────────────────────────

/// Body for `POST /api/games/story/start/stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartStoryRequest {
    pub genre: String,
    pub model: String,
}

/// Body for `POST /api/games/story/continue/stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinueStoryRequest {
    pub session_id: String,
    /// Index of a presented choice, if one was picked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice: Option<u32>,
    /// Free-text action, if the player typed their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_action: Option<String>,
}

/// Body for `POST /api/games/mystery/create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMysteryRequest {
    pub difficulty: String,
    pub model: String,
}

/// Body for `POST /api/games/mystery/question/stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskQuestionRequest {
    pub session_id: String,
    pub question: String,
}

/// Body for `POST /api/games/mystery/accuse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakeAccusationRequest {
    pub session_id: String,
    pub accused_name: String,
    pub reasoning: String,
}

/// One prior exchange sent with a chat request so the backend has context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatHistoryItem {
    /// `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
}

/// Parameters for `GET /api/chat/stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatHistoryItem>,
    pub model: String,
}

// ── HTTP response payloads ──────────────────────────────────────────

/// A suspect in a generated mystery case. The backend strips the culprit
/// flag before sending, so only presentable fields appear here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Suspect {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alibi: Option<String>,
}

/// Response to `POST /api/games/mystery/create`: the playable case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseData {
    pub session_id: String,
    pub case_title: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub victim: String,
    #[serde(default)]
    pub suspects: Vec<Suspect>,
    pub max_questions: u32,
    #[serde(default)]
    pub difficulty: String,
}

/// Response to `POST /api/games/mystery/accuse`: the terminal judgment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccusationResult {
    pub correct: bool,
    #[serde(default)]
    pub explanation: String,
    /// Revealed culprit name, when the server discloses it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub culprit: Option<String>,
    /// Bonus points for clues uncovered during questioning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clue_bonus: Option<u32>,
}
