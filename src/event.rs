//! The normalized event union consumed by the session state machine.
//!
//! Both channels funnel into [`GameEvent`]: the decoder turns `data:` stream
//! lines into fragment/completion events, and [`ServerMessage`]s from the
//! room socket convert via `From`. The state machine therefore has exactly
//! one transition pathway regardless of transport.

use crate::protocol::{AccusationResult, RoomInfo, ServerMessage, StoryTurn, StreamRecord};

/// A wholesale replacement of the client's mirror of server-owned state.
///
/// Snapshots are idempotent full replacements, never deltas: the participant
/// set, the turn pointer, and (when present) the story transcript each
/// overwrite whatever the client held before.
#[derive(Debug, Clone, Default)]
pub struct RoomSnapshot {
    pub room_id: Option<String>,
    /// Room payload, present when the wire message carried `room_info`.
    /// `Some` with an empty roster means the room really is empty and the
    /// mirrored participant set must be replaced, not kept.
    pub room: Option<RoomInfo>,
    /// Full story content, present on turn-advancing messages.
    pub story: Option<Vec<StoryTurn>>,
}

impl RoomSnapshot {
    fn from_room(room: RoomInfo) -> Self {
        Self {
            room_id: room.room_id.clone(),
            room: Some(room),
            story: None,
        }
    }

    fn with_story(room: RoomInfo, story: Vec<StoryTurn>) -> Self {
        Self {
            room_id: room.room_id.clone(),
            room: Some(room),
            story: Some(story),
        }
    }
}

/// Metadata attached to a stream completion marker.
#[derive(Debug, Clone, Default)]
pub struct CompletionMeta {
    /// Session identifier minted by the server on a start stream.
    pub session_id: Option<String>,
    pub question_count: Option<u32>,
    pub max_questions: Option<u32>,
    pub new_clue: Option<serde_json::Value>,
    pub total_clues_found: Option<u32>,
}

impl CompletionMeta {
    pub fn is_empty(&self) -> bool {
        self.session_id.is_none()
            && self.question_count.is_none()
            && self.max_questions.is_none()
            && self.new_clue.is_none()
            && self.total_clues_found.is_none()
    }
}

impl From<&StreamRecord> for CompletionMeta {
    fn from(record: &StreamRecord) -> Self {
        Self {
            session_id: record.session_id.clone(),
            question_count: record.question_count,
            max_questions: record.max_questions,
            new_clue: record.new_clue.clone(),
            total_clues_found: record.total_clues_found,
        }
    }
}

/// Events delivered to the session state machine and to client consumers.
#[derive(Debug, Clone)]
pub enum GameEvent {
    /// Synthetic event emitted once when the transport loop starts.
    Connected,
    /// The server acknowledged room creation or joining; the session may
    /// move to its waiting phase.
    SessionAck { snapshot: RoomSnapshot },
    /// The game began; the session becomes active.
    ActivityBegan { snapshot: RoomSnapshot },
    /// A server-pushed state replacement with no phase implication.
    Snapshot { snapshot: RoomSnapshot },
    /// An incremental piece of generated text for the in-progress entry.
    Fragment { content: String },
    /// The current stream finished; the in-progress entry is final.
    Completed { meta: CompletionMeta },
    /// Terminal judgment of an accusation or story conclusion.
    Judgment(AccusationResult),
    /// Application-level error reported by the server.
    ServerError { message: String },
    /// The transport ended. Always the last event on a connection.
    Disconnected { reason: Option<String> },
}

impl GameEvent {
    /// Convert a socket message into a session event.
    ///
    /// Returns `None` for messages with no session-relevant state
    /// (heartbeat responses).
    pub fn from_server(msg: ServerMessage) -> Option<Self> {
        let event = match msg {
            ServerMessage::RoomCreated { room_id, room_info } => GameEvent::SessionAck {
                snapshot: RoomSnapshot {
                    room_id: Some(room_id),
                    room: Some(room_info),
                    story: None,
                },
            },
            ServerMessage::RoomJoined { room_id, room_info } => GameEvent::SessionAck {
                snapshot: RoomSnapshot {
                    room_id: room_id.or_else(|| room_info.room_id.clone()),
                    room: Some(room_info),
                    story: None,
                },
            },
            ServerMessage::PlayerJoined { room_info, .. }
            | ServerMessage::PlayerLeft { room_info, .. }
            | ServerMessage::PlayerDisconnected { room_info, .. }
            | ServerMessage::RoomInfo { room_info } => GameEvent::Snapshot {
                snapshot: RoomSnapshot::from_room(room_info),
            },
            ServerMessage::GameStarted {
                room_info,
                story_content,
            } => GameEvent::ActivityBegan {
                snapshot: RoomSnapshot::with_story(room_info, story_content),
            },
            ServerMessage::TurnSubmitted {
                room_info,
                story_content,
            }
            | ServerMessage::AiTurnCompleted {
                room_info,
                story_content,
            } => GameEvent::Snapshot {
                snapshot: RoomSnapshot::with_story(room_info, story_content),
            },
            ServerMessage::HeartbeatResponse => return None,
            ServerMessage::Error { message } => GameEvent::ServerError { message },
        };
        Some(event)
    }
}
