#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Protocol serialization tests for the Story Arcade Client.
//!
//! Verifies the snake_case `type` tagging of socket messages, decoding of
//! JSON fixtures matching real backend output, and the defaulting rules that
//! keep older/newer servers decodable.

use story_arcade_client::protocol::{
    AccusationResult, CaseData, ChatRequest, ClientMessage, ContinueStoryRequest, GameSettings,
    ServerMessage, StreamRecord,
};

/// Serialize `val` to JSON, then deserialize back to `T` and return it.
fn round_trip<T: serde::Serialize + serde::de::DeserializeOwned>(val: &T) -> T {
    let json = serde_json::to_string(val).expect("serialize");
    serde_json::from_str(&json).expect("deserialize")
}

// ════════════════════════════════════════════════════════════════════
// ClientMessage wire shape
// ════════════════════════════════════════════════════════════════════

#[test]
fn client_message_create_room_wire_shape() {
    let msg = ClientMessage::CreateRoom {
        player_name: "Alice".into(),
        game_settings: GameSettings::new("fantasy", "openai-gpt3.5"),
    };
    let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["type"], "create_room");
    assert_eq!(json["player_name"], "Alice");
    assert_eq!(json["game_settings"]["genre"], "fantasy");
    assert_eq!(json["game_settings"]["model"], "openai-gpt3.5");
}

#[test]
fn client_message_join_room_wire_shape() {
    let msg = ClientMessage::JoinRoom {
        player_name: "Bob".into(),
        room_id: "ROOM42".into(),
    };
    let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["type"], "join_room");
    assert_eq!(json["room_id"], "ROOM42");
}

#[test]
fn client_message_unit_variants_carry_only_type() {
    for (msg, tag) in [
        (ClientMessage::StartGame, "start_game"),
        (ClientMessage::LeaveRoom, "leave_room"),
        (ClientMessage::GetRoomInfo, "get_room_info"),
        (ClientMessage::Heartbeat, "heartbeat"),
    ] {
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], tag);
        assert_eq!(json.as_object().unwrap().len(), 1, "unexpected fields for {tag}");
    }
}

#[test]
fn client_message_submit_turn_round_trip() {
    let msg = ClientMessage::SubmitTurn {
        text: "The gate creaked open.".into(),
    };
    let deser = round_trip(&msg);
    if let ClientMessage::SubmitTurn { text } = deser {
        assert_eq!(text, "The gate creaked open.");
    } else {
        panic!("expected SubmitTurn variant");
    }
}

// ════════════════════════════════════════════════════════════════════
// ServerMessage fixtures (real backend output shapes)
// ════════════════════════════════════════════════════════════════════

#[test]
fn server_message_room_created_fixture() {
    let fixture = r#"{
        "type": "room_created",
        "room_id": "A1B2C3",
        "room_info": {
            "room_id": "A1B2C3",
            "players": {
                "player-1": {"name": "Alice", "is_host": true, "is_online": true}
            },
            "current_turn": null,
            "game_settings": {"genre": "fantasy", "model": "openai-gpt3.5"}
        }
    }"#;
    let msg: ServerMessage = serde_json::from_str(fixture).unwrap();
    if let ServerMessage::RoomCreated { room_id, room_info } = msg {
        assert_eq!(room_id, "A1B2C3");
        assert_eq!(room_info.players.len(), 1);
        assert!(room_info.players["player-1"].is_host);
        assert!(room_info.current_turn.is_none());
        assert_eq!(room_info.game_settings.unwrap().genre, "fantasy");
    } else {
        panic!("expected RoomCreated variant");
    }
}

#[test]
fn server_message_game_started_fixture() {
    let fixture = r#"{
        "type": "game_started",
        "room_info": {
            "players": {
                "player-1": {"name": "Alice", "is_host": true, "is_online": true},
                "player-2": {"name": "Bob", "is_host": false, "is_online": true}
            },
            "current_turn": "player-1"
        },
        "story_content": [
            {"player": "AI", "text": "It was a dark night.", "timestamp": 1723351200000}
        ]
    }"#;
    let msg: ServerMessage = serde_json::from_str(fixture).unwrap();
    if let ServerMessage::GameStarted {
        room_info,
        story_content,
    } = msg
    {
        assert_eq!(room_info.current_turn.as_deref(), Some("player-1"));
        assert_eq!(story_content.len(), 1);
        assert_eq!(story_content[0].player, "AI");
        assert_eq!(story_content[0].timestamp, 1723351200000);
    } else {
        panic!("expected GameStarted variant");
    }
}

#[test]
fn server_message_player_disconnected_fixture() {
    let fixture = r#"{
        "type": "player_disconnected",
        "player_id": "player-2",
        "room_info": {
            "players": {
                "player-1": {"name": "Alice", "is_host": true, "is_online": true},
                "player-2": {"name": "Bob", "is_host": false, "is_online": false}
            }
        }
    }"#;
    let msg: ServerMessage = serde_json::from_str(fixture).unwrap();
    if let ServerMessage::PlayerDisconnected { player_id, room_info } = msg {
        assert_eq!(player_id, "player-2");
        assert!(!room_info.players["player-2"].is_online);
    } else {
        panic!("expected PlayerDisconnected variant");
    }
}

#[test]
fn server_message_error_fixture_with_non_ascii_text() {
    let fixture = r#"{"type": "error", "message": "방을 찾을 수 없습니다"}"#;
    let msg: ServerMessage = serde_json::from_str(fixture).unwrap();
    if let ServerMessage::Error { message } = msg {
        assert_eq!(message, "방을 찾을 수 없습니다");
    } else {
        panic!("expected Error variant");
    }
}

#[test]
fn server_message_heartbeat_response_fixture() {
    let msg: ServerMessage = serde_json::from_str(r#"{"type": "heartbeat_response"}"#).unwrap();
    assert!(matches!(msg, ServerMessage::HeartbeatResponse));
}

#[test]
fn room_info_defaults_when_fields_missing() {
    let fixture = r#"{"type": "room_info", "room_info": {}}"#;
    let msg: ServerMessage = serde_json::from_str(fixture).unwrap();
    if let ServerMessage::RoomInfo { room_info } = msg {
        assert!(room_info.room_id.is_none());
        assert!(room_info.players.is_empty());
        assert!(room_info.current_turn.is_none());
        assert!(room_info.game_settings.is_none());
    } else {
        panic!("expected RoomInfo variant");
    }
}

// ════════════════════════════════════════════════════════════════════
// Stream records
// ════════════════════════════════════════════════════════════════════

#[test]
fn stream_record_chunk_fixture() {
    let record: StreamRecord = serde_json::from_str(r#"{"chunk": "Once upon"}"#).unwrap();
    assert_eq!(record.chunk.as_deref(), Some("Once upon"));
    assert!(record.done.is_none());
    assert!(record.error.is_none());
}

#[test]
fn stream_record_done_with_metadata_fixture() {
    let fixture = r#"{
        "done": true,
        "session_id": "mystery-42",
        "question_count": 3,
        "max_questions": 8,
        "new_clue": {"description": "a torn ticket stub"},
        "total_clues_found": 2
    }"#;
    let record: StreamRecord = serde_json::from_str(fixture).unwrap();
    assert_eq!(record.done, Some(true));
    assert_eq!(record.session_id.as_deref(), Some("mystery-42"));
    assert_eq!(record.question_count, Some(3));
    assert_eq!(record.max_questions, Some(8));
    assert_eq!(record.total_clues_found, Some(2));
    assert_eq!(record.new_clue.unwrap()["description"], "a torn ticket stub");
}

#[test]
fn stream_record_ignores_unknown_fields() {
    let record: StreamRecord =
        serde_json::from_str(r#"{"chunk": "x", "brand_new_field": 7}"#).unwrap();
    assert_eq!(record.chunk.as_deref(), Some("x"));
}

// ════════════════════════════════════════════════════════════════════
// HTTP payloads
// ════════════════════════════════════════════════════════════════════

#[test]
fn continue_story_request_omits_absent_fields() {
    let request = ContinueStoryRequest {
        session_id: "story-1".into(),
        choice: Some(2),
        custom_action: None,
    };
    let json: serde_json::Value = serde_json::to_value(&request).unwrap();
    assert_eq!(json["choice"], 2);
    assert!(
        json.get("custom_action").is_none(),
        "absent custom_action must be omitted, not null"
    );
}

#[test]
fn chat_request_round_trip_keeps_history_order() {
    let request = ChatRequest {
        message: "and then?".into(),
        history: vec![
            story_arcade_client::protocol::ChatHistoryItem {
                role: "user".into(),
                content: "tell me a story".into(),
            },
            story_arcade_client::protocol::ChatHistoryItem {
                role: "assistant".into(),
                content: "once upon a time".into(),
            },
        ],
        model: "openai-gpt3.5".into(),
    };
    let deser = round_trip(&request);
    assert_eq!(deser.history.len(), 2);
    assert_eq!(deser.history[0].role, "user");
    assert_eq!(deser.history[1].content, "once upon a time");
}

#[test]
fn case_data_fixture_with_suspects() {
    let fixture = r#"{
        "session_id": "mystery-42",
        "case_title": "The Vanished Violin",
        "location": "concert hall",
        "victim": "first chair",
        "suspects": [
            {"name": "The Conductor", "description": "ambitious", "alibi": "on stage"},
            {"name": "The Usher", "description": "quiet"}
        ],
        "max_questions": 8,
        "difficulty": "normal"
    }"#;
    let case: CaseData = serde_json::from_str(fixture).unwrap();
    assert_eq!(case.suspects.len(), 2);
    assert_eq!(case.suspects[0].alibi.as_deref(), Some("on stage"));
    assert!(case.suspects[1].alibi.is_none());
    assert_eq!(case.max_questions, 8);
}

#[test]
fn accusation_result_fixture_defaults() {
    // A terse server reply: only the verdict.
    let result: AccusationResult = serde_json::from_str(r#"{"correct": true}"#).unwrap();
    assert!(result.correct);
    assert!(result.explanation.is_empty());
    assert!(result.culprit.is_none());
    assert!(result.clue_bonus.is_none());

    let result: AccusationResult = serde_json::from_str(
        r#"{"correct": false, "explanation": "wrong suspect", "culprit": "The Usher", "clue_bonus": 50}"#,
    )
    .unwrap();
    assert!(!result.correct);
    assert_eq!(result.culprit.as_deref(), Some("The Usher"));
    assert_eq!(result.clue_bonus, Some(50));
}
