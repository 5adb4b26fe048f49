//! # Story Arcade Client
//!
//! Transport-agnostic Rust client for the Story Arcade AI game backend.
//!
//! The backend exposes five game modes (chat, story adventure, mystery
//! detective, time-attack mystery, cooperative story) over two channels:
//! streaming HTTP responses carrying `data: {...}` lines, and a WebSocket
//! room protocol for cooperative play. This crate normalizes both into one
//! [`GameEvent`] stream and drives a single [`Session`] state machine over
//! it.
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`Transport`] trait for any backend
//! - **Wire-compatible** — all protocol types match the backend's JSON exactly
//! - **Two transports built-in** — `transport-websocket` (room channel) and
//!   `transport-sse` (streaming HTTP), both enabled by default
//! - **Event-driven** — one reducer handles every game mode
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use story_arcade_client::client::{Handshake, StoryArcadeClient, StoryArcadeConfig};
//! use story_arcade_client::protocol::GameSettings;
//! use story_arcade_client::session::{GameMode, Session, SessionConfig};
//! use story_arcade_client::WebSocketTransport;
//!
//! let transport = WebSocketTransport::connect("ws://localhost:8000/ws/coop-story").await?;
//! let mut session = Session::new(GameMode::CooperativeStory, SessionConfig::default());
//! let handshake = session.create_room("Alice")?;
//! // map the session's outbound message into the client handshake ...
//!
//! let (client, mut events) =
//!     StoryArcadeClient::start(transport, handshake, StoryArcadeConfig::new());
//! while let Some(event) = events.recv().await {
//!     session.apply(event);
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "tokio-runtime")]
pub mod client;
pub mod decoder;
pub mod error;
pub mod event;
pub mod minigames;
pub mod protocol;
pub mod session;
pub mod settings;
pub mod timer;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
#[cfg(feature = "tokio-runtime")]
pub use client::{Handshake, StoryArcadeClient, StoryArcadeConfig};
pub use error::StoryArcadeError;
pub use event::GameEvent;
pub use protocol::{ClientMessage, ServerMessage};
pub use session::{GameMode, Phase, Session, SessionConfig};
pub use transport::Transport;

#[cfg(feature = "transport-websocket")]
pub use transports::websocket::WebSocketTransport;

#[cfg(feature = "transport-sse")]
pub use transports::sse::SseTransport;
