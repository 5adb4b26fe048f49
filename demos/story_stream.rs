//! # Streamed Story Example
//!
//! Starts a solo story adventure over the streaming HTTP channel and prints
//! the narration as it arrives:
//!
//! 1. POST the start request; the response body is a `data: {...}` stream
//! 2. Feed each line through the decoder into the session state machine
//! 3. Print fragments as they land, then the completed opening scene
//!
//! ## Running
//!
//! ```sh
//! # Start the Story Arcade backend on localhost:8000, then:
//! cargo run --example story_stream
//!
//! # Override the server URL:
//! STORY_ARCADE_API=http://my-server:8000 cargo run --example story_stream
//! ```

use std::io::Write;

use story_arcade_client::decoder::decode_line;
use story_arcade_client::session::{GameMode, Phase, Session, SessionConfig};
use story_arcade_client::{GameEvent, SseTransport, Transport};

/// Default API base when `STORY_ARCADE_API` is not set.
const DEFAULT_API: &str = "http://localhost:8000";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let api = std::env::var("STORY_ARCADE_API").unwrap_or_else(|_| DEFAULT_API.to_string());
    let url = format!("{api}/api/games/story/start/stream");
    tracing::info!("Starting a story via {url}");

    let mut session = Session::new(GameMode::StoryAdventure, SessionConfig::default());
    let request = session.start_story()?;

    let http = reqwest::Client::new();
    let mut transport = SseTransport::post(&http, &url, &request).await?;

    while let Some(line) = transport.recv().await {
        let line = line?;
        let Some(event) = decode_line(&line) else {
            continue;
        };
        if let GameEvent::Fragment { content } = &event {
            print!("{content}");
            std::io::stdout().flush()?;
        }
        session.apply(event);
    }
    println!();

    match session.phase() {
        Phase::Active => {
            tracing::info!(
                session_id = ?session.session_id(),
                entries = session.transcript().len(),
                "opening scene complete"
            );
        }
        phase => {
            tracing::warn!(%phase, error = ?session.last_error(), "stream ended early");
        }
    }

    Ok(())
}
