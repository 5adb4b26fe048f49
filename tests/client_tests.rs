#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for the client handle: scripted room conversations are
//! replayed through a mock transport and consumed both as raw events and
//! through a [`Session`] fed from the event channel.

mod common;

use std::time::Duration;

use common::*;
use story_arcade_client::client::{Handshake, StoryArcadeClient, StoryArcadeConfig};
use story_arcade_client::event::GameEvent;
use story_arcade_client::protocol::{ClientMessage, GameSettings};
use story_arcade_client::session::{GameMode, Phase, Session, SessionConfig};

fn settings() -> GameSettings {
    GameSettings::new("fantasy", "openai-gpt3.5")
}

#[tokio::test]
async fn full_room_lifecycle_reaches_session_active() {
    let mut session = Session::new(GameMode::CooperativeStory, SessionConfig::default());
    let handshake_msg = session.create_room("Alice").unwrap();
    let alice = session.local_participant().unwrap().to_string();
    let handshake = match handshake_msg {
        ClientMessage::CreateRoom {
            player_name,
            game_settings,
        } => Handshake::create_room(player_name, game_settings),
        other => panic!("expected CreateRoom, got {other:?}"),
    };

    let (transport, sent, _closed) = MockTransport::new(vec![
        Some(Ok(room_created_json("ROOM42", &alice, "Alice"))),
        Some(Ok(game_started_json(
            "ROOM42",
            &[(&alice, "Alice", true)],
            &alice,
            vec![story_turn("AI", "The fog lifted.", 1)],
        ))),
    ]);

    let (mut client, mut events) =
        StoryArcadeClient::start(transport, handshake, StoryArcadeConfig::new());

    // Drive the session straight off the event channel, the way an
    // application loop would.
    for _ in 0..3 {
        let event = events.recv().await.unwrap();
        session.apply(event);
    }

    assert_eq!(session.phase(), Phase::Active);
    assert!(session.is_my_turn());
    assert_eq!(session.transcript().len(), 1);
    assert_eq!(client.current_room_id().await.as_deref(), Some("ROOM42"));

    // The handshake went out first.
    {
        let messages = sent.lock().unwrap();
        let first: ClientMessage = serde_json::from_str(&messages[0]).unwrap();
        assert!(matches!(first, ClientMessage::CreateRoom { .. }));
    }

    client.shutdown().await;
}

#[tokio::test]
async fn turn_round_trip_through_client_and_session() {
    let mut session = Session::new(GameMode::CooperativeStory, SessionConfig::default());
    session.create_room("Alice").unwrap();
    let alice = session.local_participant().unwrap().to_string();

    let (transport, sent, _closed) = MockTransport::new(vec![
        Some(Ok(room_created_json("ROOM42", &alice, "Alice"))),
        Some(Ok(game_started_json(
            "ROOM42",
            &[(&alice, "Alice", true)],
            &alice,
            vec![],
        ))),
        Some(Ok(turn_submitted_json(
            "ROOM42",
            &[(&alice, "Alice", true)],
            "AI",
            vec![story_turn("Alice", "She opened the door.", 1)],
        ))),
    ]);

    let handshake = Handshake::create_room("Alice", settings());
    let (mut client, mut events) =
        StoryArcadeClient::start(transport, handshake, StoryArcadeConfig::new());

    // Connected, SessionAck, ActivityBegan.
    for _ in 0..3 {
        session.apply(events.recv().await.unwrap());
    }
    assert!(session.is_my_turn());

    // Validate locally, then hand the text to the client.
    let msg = session.submit_turn("She opened the door.").unwrap();
    if let ClientMessage::SubmitTurn { text } = msg {
        client.submit_turn(text).unwrap();
    }

    // The acceptance snapshot moves the pointer away.
    session.apply(events.recv().await.unwrap());
    assert!(!session.is_my_turn());
    assert_eq!(
        session.transcript().entries()[0].text(),
        "She opened the door."
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    {
        let messages = sent.lock().unwrap();
        let last: ClientMessage = serde_json::from_str(messages.last().unwrap()).unwrap();
        assert!(matches!(last, ClientMessage::SubmitTurn { .. }));
    }

    client.shutdown().await;
}

#[tokio::test]
async fn server_error_is_forwarded_as_event() {
    let (transport, _sent, _closed) =
        MockTransport::new(vec![Some(Ok(error_json("room is full")))]);

    let handshake = Handshake::join_room("Bob", "ROOM42");
    let (mut client, mut events) =
        StoryArcadeClient::start(transport, handshake, StoryArcadeConfig::new());

    let _ = events.recv().await; // Connected
    let event = events.recv().await.unwrap();
    match event {
        GameEvent::ServerError { message } => assert_eq!(message, "room is full"),
        other => panic!("expected ServerError, got {other:?}"),
    }

    client.shutdown().await;
}

#[tokio::test]
async fn clean_close_ends_event_stream_after_disconnected() {
    let (transport, _sent, _closed) = MockTransport::new(vec![
        Some(Ok(room_created_json("ROOM42", "player-a", "Alice"))),
        None,
    ]);

    let handshake = Handshake::create_room("Alice", settings());
    let (mut client, mut events) =
        StoryArcadeClient::start(transport, handshake, StoryArcadeConfig::new());

    let _ = events.recv().await; // Connected
    let _ = events.recv().await; // SessionAck
    let event = events.recv().await.unwrap();
    assert!(matches!(event, GameEvent::Disconnected { reason: None }));

    // The loop has exited; the channel closes.
    assert!(events.recv().await.is_none());
    assert!(!client.is_connected());

    client.shutdown().await;
}

#[tokio::test]
async fn heartbeats_are_absorbed_between_real_events() {
    let (transport, _sent, _closed) = MockTransport::new(vec![
        Some(Ok(heartbeat_response_json())),
        Some(Ok(heartbeat_response_json())),
        Some(Ok(room_created_json("ROOM42", "player-a", "Alice"))),
    ]);

    let handshake = Handshake::create_room("Alice", settings());
    let (mut client, mut events) =
        StoryArcadeClient::start(transport, handshake, StoryArcadeConfig::new());

    let _ = events.recv().await; // Connected
    let event = events.recv().await.unwrap();
    assert!(matches!(event, GameEvent::SessionAck { .. }));

    client.shutdown().await;
}

#[tokio::test]
async fn commands_after_disconnect_fail_fast() {
    let (transport, _sent, _closed) = MockTransport::new(vec![None]);

    let handshake = Handshake::create_room("Alice", settings());
    let (mut client, mut events) =
        StoryArcadeClient::start(transport, handshake, StoryArcadeConfig::new());

    let _ = events.recv().await; // Connected
    let _ = events.recv().await; // Disconnected

    assert!(client.start_game().is_err());
    assert!(client.submit_turn("late").is_err());
    assert!(client.leave_room().is_err());

    client.shutdown().await;
}
