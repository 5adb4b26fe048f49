//! # Cooperative Room Example
//!
//! Demonstrates a complete cooperative story lifecycle:
//!
//! 1. Connect to the backend's room WebSocket
//! 2. Create a room as host (or join one via `ROOM_ID`)
//! 3. React to room events through the session state machine
//! 4. Start the game and contribute a turn when the pointer lands on us
//! 5. Shut down gracefully on Ctrl+C or disconnect
//!
//! ## Running
//!
//! ```sh
//! # Start the Story Arcade backend on localhost:8000, then:
//! cargo run --example coop_room
//!
//! # Join an existing room instead of creating one:
//! ROOM_ID=A1B2C3 cargo run --example coop_room
//!
//! # Override the server URL:
//! STORY_ARCADE_URL=ws://my-server:8000/ws/coop-story cargo run --example coop_room
//! ```

use story_arcade_client::client::{Handshake, StoryArcadeClient, StoryArcadeConfig};
use story_arcade_client::session::{GameMode, Phase, Session, SessionConfig};
use story_arcade_client::{ClientMessage, GameEvent, WebSocketTransport};

/// Default server URL when `STORY_ARCADE_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:8000/ws/coop-story";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("STORY_ARCADE_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    tracing::info!("Connecting to {url}");

    // The session validates commands and mirrors server state; the client
    // shuttles messages. Create the room locally first so the session knows
    // its participant identity.
    let mut session = Session::new(GameMode::CooperativeStory, SessionConfig::default());
    let handshake = match std::env::var("ROOM_ID") {
        Ok(room_id) => match session.join_room("RustPlayer", &room_id)? {
            ClientMessage::JoinRoom {
                player_name,
                room_id,
            } => Handshake::join_room(player_name, room_id),
            _ => unreachable!("join_room produces a JoinRoom message"),
        },
        Err(_) => match session.create_room("RustPlayer")? {
            ClientMessage::CreateRoom {
                player_name,
                game_settings,
            } => Handshake::create_room(player_name, game_settings),
            _ => unreachable!("create_room produces a CreateRoom message"),
        },
    };

    // ── Connect ─────────────────────────────────────────────────────
    let transport = WebSocketTransport::connect(&url).await?;
    let (mut client, mut event_rx) =
        StoryArcadeClient::start(transport, handshake, StoryArcadeConfig::new());

    // ── Event loop ──────────────────────────────────────────────────
    // Use `tokio::select!` to listen for both server events and Ctrl+C.
    loop {
        tokio::select! {
            // Branch 1: Incoming event from the server (or transport layer).
            event = event_rx.recv() => {
                let Some(event) = event else {
                    // Channel closed — transport loop exited.
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                let disconnected = matches!(event, GameEvent::Disconnected { .. });
                session.apply(event);

                match session.phase() {
                    Phase::Waiting => {
                        tracing::info!(
                            "In room {:?} with {} participant(s)",
                            session.session_id(),
                            session.participants().len()
                        );
                        // As host, start as soon as the room exists. A real
                        // front end would wait for more players.
                        if session.is_host() {
                            if let Ok(msg) = session.start_game() {
                                if let ClientMessage::StartGame = msg {
                                    client.start_game()?;
                                }
                            }
                        }
                    }
                    Phase::Active if session.is_my_turn() => {
                        tracing::info!("Our turn! Contributing a line…");
                        let text = "The lantern flickered twice, then went out.";
                        if let Ok(ClientMessage::SubmitTurn { text }) = session.submit_turn(text) {
                            client.submit_turn(text)?;
                        }
                    }
                    Phase::Active => {
                        if let Some(entry) = session.transcript().entries().last() {
                            tracing::info!("Story so far ends with: {}", entry.text());
                        }
                    }
                    _ => {}
                }

                if disconnected {
                    tracing::info!("Disconnected, exiting");
                    break;
                }
            }

            // Branch 2: Ctrl+C — leave the room and shut down.
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, leaving room");
                let _ = client.leave_room();
                break;
            }
        }
    }

    client.shutdown().await;
    Ok(())
}
