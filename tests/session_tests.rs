#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! End-to-end state machine tests: raw backend lines are pushed through
//! [`decode_line`] and the resulting events through [`Session::apply`], the
//! same pipeline the transport loop drives.

mod common;

use common::*;
use story_arcade_client::decoder::decode_line;
use story_arcade_client::error::StoryArcadeError;
use story_arcade_client::event::GameEvent;
use story_arcade_client::protocol::{AccusationResult, CaseData, ClientMessage};
use story_arcade_client::session::{GameMode, Phase, Session, SessionConfig, StoryAction};

/// Feed one raw line through the decoder into the session.
fn feed(session: &mut Session, line: &str) {
    if let Some(event) = decode_line(line) {
        session.apply(event);
    }
}

fn mystery_case(session_id: &str, max_questions: u32) -> CaseData {
    CaseData {
        session_id: session_id.into(),
        case_title: "The Vanished Violin".into(),
        location: "concert hall".into(),
        victim: "first chair".into(),
        suspects: vec![],
        max_questions,
        difficulty: "normal".into(),
    }
}

// ── Streamed story sessions ─────────────────────────────────────────

#[test]
fn story_stream_accumulates_fragments_in_order() {
    let mut session = Session::new(GameMode::StoryAdventure, SessionConfig::default());
    session.start_story().unwrap();
    assert_eq!(session.phase(), Phase::Connecting);

    feed(&mut session, &chunk_line("Once"));
    feed(&mut session, &chunk_line(" upon"));
    feed(&mut session, &chunk_line(" a time"));
    feed(&mut session, &done_line_with_session("story-77"));

    assert_eq!(session.phase(), Phase::Active);
    assert_eq!(session.session_id(), Some("story-77"));
    assert_eq!(
        session.transcript().entries()[0].text(),
        "Once upon a time"
    );
    assert!(!session.transcript().is_streaming());
}

#[test]
fn unmarked_line_causes_no_transition() {
    let mut session = Session::new(GameMode::StoryAdventure, SessionConfig::default());
    session.start_story().unwrap();
    let phase_before = session.phase();
    let len_before = session.transcript().len();

    feed(&mut session, ": keep-alive");
    feed(&mut session, "event: message");
    feed(&mut session, "");

    assert_eq!(session.phase(), phase_before);
    assert_eq!(session.transcript().len(), len_before);
}

#[test]
fn continue_story_appends_custom_action_then_streams_reply() {
    let mut session = Session::new(GameMode::StoryAdventure, SessionConfig::default());
    session.start_story().unwrap();
    feed(&mut session, &chunk_line("You stand at a crossroads."));
    feed(&mut session, &done_line_with_session("story-1"));

    let request = session
        .continue_story(StoryAction::Custom("Take the left path".into()))
        .unwrap();
    assert_eq!(request.session_id, "story-1");
    assert_eq!(request.custom_action.as_deref(), Some("Take the left path"));
    assert!(request.choice.is_none());

    // Player entry plus the opened AI entry.
    assert_eq!(session.transcript().len(), 3);
    assert!(session.transcript().is_streaming());

    feed(&mut session, &chunk_line("The left path narrows."));
    feed(&mut session, &done_line());
    assert_eq!(
        session.transcript().entries()[2].text(),
        "The left path narrows."
    );
}

#[test]
fn choice_action_does_not_add_player_entry() {
    let mut session = Session::new(GameMode::StoryAdventure, SessionConfig::default());
    session.start_story().unwrap();
    feed(&mut session, &chunk_line("Choose."));
    feed(&mut session, &done_line_with_session("story-2"));
    let len_before = session.transcript().len();

    let request = session.continue_story(StoryAction::Choice(1)).unwrap();
    assert_eq!(request.choice, Some(1));
    // Only the opened AI entry was added.
    assert_eq!(session.transcript().len(), len_before + 1);
}

#[test]
fn mid_stream_error_retains_partial_text_and_stays_active() {
    let mut session = Session::new(GameMode::StoryAdventure, SessionConfig::default());
    session.start_story().unwrap();
    feed(&mut session, &chunk_line("The dragon"));
    feed(&mut session, &stream_error_line("upstream reset"));

    assert_eq!(session.phase(), Phase::Active);
    assert_eq!(session.transcript().entries()[0].text(), "The dragon");
    assert_eq!(session.last_error(), Some("upstream reset"));
    // The entry is closed so a retry can open a fresh one.
    assert!(!session.transcript().is_streaming());
}

#[test]
fn setup_time_stream_error_returns_to_setup() {
    let mut session = Session::new(GameMode::StoryAdventure, SessionConfig::default());
    session.start_story().unwrap();
    feed(&mut session, &stream_error_line("model unavailable"));

    assert_eq!(session.phase(), Phase::Setup);
    assert_eq!(session.last_error(), Some("model unavailable"));
    // The session can be started again after the failure.
    assert!(session.start_story().is_ok());
}

// ── Mystery sessions ────────────────────────────────────────────────

#[test]
fn question_counters_from_completion_drive_resolution() {
    let mut session = Session::new(GameMode::MysteryDetective, SessionConfig::default());
    session.create_case().unwrap();
    session.apply_case(&mystery_case("case-5", 8));

    session.ask_question("Who found the body?").unwrap();
    feed(&mut session, &chunk_line("The stage manager."));
    // Server-side counter says the budget is exhausted.
    feed(&mut session, &done_line_with_counters(8, 8));

    assert!(session.resolution_required());
    assert!(matches!(
        session.ask_question("Another?"),
        Err(StoryArcadeError::TurnBudgetExhausted { .. })
    ));
}

#[test]
fn failed_accusation_preserves_transcript() {
    let mut session = Session::new(GameMode::MysteryDetective, SessionConfig::default());
    session.create_case().unwrap();
    session.apply_case(&mystery_case("case-6", 8));

    session.ask_question("Was the door locked?").unwrap();
    feed(&mut session, &chunk_line("From the inside."));
    feed(&mut session, &done_line());
    let len_before = session.transcript().len();

    session.accuse("The conductor", "Only he had the key").unwrap();
    session.apply(GameEvent::Judgment(AccusationResult {
        correct: false,
        explanation: "The conductor was on stage the whole time.".into(),
        culprit: None,
        clue_bonus: None,
    }));

    assert_eq!(session.phase(), Phase::Failed);
    assert_eq!(session.transcript().len(), len_before);
    assert_eq!(
        session.outcome().unwrap().explanation,
        "The conductor was on stage the whole time."
    );
}

#[test]
fn time_attack_expiry_is_terminal_and_blocks_commands() {
    let mut session = Session::new(GameMode::TimeAttackMystery, SessionConfig::default());
    session.create_case().unwrap();
    session.apply_case(&mystery_case("case-7", 8));

    let limit = session.remaining_seconds().unwrap();
    for _ in 0..limit {
        session.tick();
    }
    assert_eq!(session.phase(), Phase::Failed);
    assert!(session.ask_question("Too late?").is_err());
    assert!(session.accuse("Anyone", "Desperation").is_err());
    // Further ticks must not move the phase again.
    session.tick();
    assert_eq!(session.phase(), Phase::Failed);
}

// ── Cooperative room sessions ───────────────────────────────────────

#[test]
fn cooperative_flow_from_create_to_turn() {
    let mut session = Session::new(GameMode::CooperativeStory, SessionConfig::default());
    let handshake = session.create_room("Alice").unwrap();
    assert!(matches!(handshake, ClientMessage::CreateRoom { .. }));
    let alice = session.local_participant().unwrap().to_string();

    feed(&mut session, &room_created_json("ROOM42", &alice, "Alice"));
    assert_eq!(session.phase(), Phase::Waiting);
    assert_eq!(session.session_id(), Some("ROOM42"));
    assert!(session.is_host());

    // Bob joins; the snapshot replaces the participant set.
    feed(
        &mut session,
        &player_joined_json(
            "ROOM42",
            "player-bob",
            &[(&alice, "Alice", true), ("player-bob", "Bob", false)],
        ),
    );
    assert_eq!(session.participants().len(), 2);
    assert_eq!(session.phase(), Phase::Waiting);

    assert!(session.start_game().is_ok());
    feed(
        &mut session,
        &game_started_json(
            "ROOM42",
            &[(&alice, "Alice", true), ("player-bob", "Bob", false)],
            &alice,
            vec![story_turn("AI", "A storm rolled in.", 1)],
        ),
    );
    assert_eq!(session.phase(), Phase::Active);
    assert!(session.is_my_turn());
    assert_eq!(session.transcript().len(), 1);

    let msg = session.submit_turn("Alice lit the lantern.").unwrap();
    assert!(matches!(msg, ClientMessage::SubmitTurn { .. }));

    // Server echoes the accepted turn and hands the pointer to Bob.
    feed(
        &mut session,
        &turn_submitted_json(
            "ROOM42",
            &[(&alice, "Alice", true), ("player-bob", "Bob", false)],
            "player-bob",
            vec![
                story_turn("AI", "A storm rolled in.", 1),
                story_turn("Alice", "Alice lit the lantern.", 2),
            ],
        ),
    );
    assert!(!session.is_my_turn());
    assert_eq!(session.transcript().len(), 2);
    assert_eq!(
        session.transcript().entries()[1].text(),
        "Alice lit the lantern."
    );
}

#[test]
fn guest_turn_ownership_follows_pointer() {
    let mut session = Session::new(GameMode::CooperativeStory, SessionConfig::default());
    session.join_room("Bob", "ROOM42").unwrap();
    let bob = session.local_participant().unwrap().to_string();

    feed(
        &mut session,
        &room_joined_json(
            "ROOM42",
            &[("player-alice", "Alice", true), (&bob, "Bob", false)],
        ),
    );
    assert_eq!(session.phase(), Phase::Waiting);
    assert!(!session.is_host());

    // Guests cannot start the game.
    assert!(matches!(
        session.start_game(),
        Err(StoryArcadeError::NotYourTurn)
    ));

    feed(
        &mut session,
        &game_started_json(
            "ROOM42",
            &[("player-alice", "Alice", true), (&bob, "Bob", false)],
            "player-alice",
            vec![],
        ),
    );
    assert_eq!(session.phase(), Phase::Active);
    assert!(!session.is_my_turn());

    // Not Bob's turn: no request, no transcript mutation.
    let len_before = session.transcript().len();
    assert!(matches!(
        session.submit_turn("Bob interjects"),
        Err(StoryArcadeError::NotYourTurn)
    ));
    assert_eq!(session.transcript().len(), len_before);

    feed(
        &mut session,
        &ai_turn_completed_json(
            "ROOM42",
            &[("player-alice", "Alice", true), (&bob, "Bob", false)],
            &bob,
            vec![
                story_turn("Alice", "The hall fell quiet.", 1),
                story_turn("AI", "Somewhere a clock struck twelve.", 2),
            ],
        ),
    );
    assert!(session.is_my_turn());
    assert!(session.submit_turn("Bob checked the time.").is_ok());
}

#[test]
fn empty_roster_snapshot_total_replaces_participants() {
    let mut session = Session::new(GameMode::CooperativeStory, SessionConfig::default());
    session.create_room("Alice").unwrap();
    let alice = session.local_participant().unwrap().to_string();
    feed(&mut session, &room_created_json("ROOM42", &alice, "Alice"));
    assert_eq!(session.participants().len(), 1);

    // The server pushes a snapshot with an empty roster: the room emptied
    // out, and the mirrored set must be replaced rather than kept.
    feed(&mut session, &room_info_json("ROOM42", &[], None));
    assert!(session.participants().is_empty());
    assert!(session.current_turn().is_none());
    assert!(!session.is_my_turn());
}

#[test]
fn join_error_returns_to_setup_with_message() {
    let mut session = Session::new(GameMode::CooperativeStory, SessionConfig::default());
    session.join_room("Bob", "NOPE99").unwrap();

    feed(&mut session, &error_json("room not found"));
    assert_eq!(session.phase(), Phase::Setup);
    assert_eq!(session.last_error(), Some("room not found"));
}

#[test]
fn disconnect_before_activity_returns_to_setup() {
    let mut session = Session::new(GameMode::CooperativeStory, SessionConfig::default());
    session.create_room("Alice").unwrap();
    let alice = session.local_participant().unwrap().to_string();
    feed(&mut session, &room_created_json("ROOM42", &alice, "Alice"));
    assert_eq!(session.phase(), Phase::Waiting);

    session.apply(GameEvent::Disconnected { reason: None });
    assert_eq!(session.phase(), Phase::Setup);
    assert!(session.last_error().is_some());
}

#[test]
fn disconnect_mid_game_flags_error_but_keeps_story() {
    let mut session = Session::new(GameMode::CooperativeStory, SessionConfig::default());
    session.create_room("Alice").unwrap();
    let alice = session.local_participant().unwrap().to_string();
    feed(&mut session, &room_created_json("ROOM42", &alice, "Alice"));
    feed(
        &mut session,
        &game_started_json(
            "ROOM42",
            &[(&alice, "Alice", true)],
            &alice,
            vec![story_turn("AI", "It began at dusk.", 1)],
        ),
    );

    session.apply(GameEvent::Disconnected {
        reason: Some("transport receive error: reset".into()),
    });
    assert_eq!(session.phase(), Phase::Active);
    assert_eq!(session.transcript().len(), 1);
    assert!(session.last_error().unwrap().contains("reset"));
}

#[test]
fn heartbeat_response_does_not_disturb_participants() {
    let mut session = Session::new(GameMode::CooperativeStory, SessionConfig::default());
    session.create_room("Alice").unwrap();
    let alice = session.local_participant().unwrap().to_string();
    feed(
        &mut session,
        &room_joined_json(
            "ROOM42",
            &[(&alice, "Alice", true), ("player-bob", "Bob", false)],
        ),
    );
    assert_eq!(session.participants().len(), 2);

    feed(&mut session, &heartbeat_response_json());
    assert_eq!(session.participants().len(), 2);
    assert_eq!(session.phase(), Phase::Waiting);
}

// ── Restart ─────────────────────────────────────────────────────────

#[test]
fn restart_after_terminal_phase_yields_fresh_session() {
    let mut session = Session::new(GameMode::MysteryDetective, SessionConfig::default());
    session.create_case().unwrap();
    session.apply_case(&mystery_case("case-8", 3));
    session.ask_question("Anything?").unwrap();
    feed(&mut session, &chunk_line("Nothing."));
    feed(&mut session, &done_line());
    session.apply(GameEvent::Judgment(AccusationResult {
        correct: true,
        explanation: "Spot on.".into(),
        culprit: Some("The usher".into()),
        clue_bonus: None,
    }));
    assert_eq!(session.phase(), Phase::Succeeded);
    let old_id = session.local_id();

    session.restart();
    assert_ne!(session.local_id(), old_id);
    assert_eq!(session.phase(), Phase::Setup);
    assert!(session.transcript().is_empty());
    assert!(session.outcome().is_none());
    assert!(session.session_id().is_none());
}
