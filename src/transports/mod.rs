//! Transport implementations for the Story Arcade backend.
//!
//! This module provides concrete [`Transport`](crate::Transport)
//! implementations behind feature gates. Enable the corresponding Cargo
//! feature to pull in a transport:
//!
//! | Feature               | Transport              | Channel                          |
//! |-----------------------|------------------------|----------------------------------|
//! | `transport-websocket` | [`WebSocketTransport`] | cooperative story room socket    |
//! | `transport-sse`       | [`SseTransport`]       | streaming HTTP (`data:` records) |
//!
//! # Example
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), story_arcade_client::StoryArcadeError> {
//! use story_arcade_client::{Transport, WebSocketTransport};
//!
//! let mut ws = WebSocketTransport::connect("ws://localhost:8000/ws/coop-story").await?;
//! ws.send(r#"{"type":"heartbeat"}"#.to_string()).await?;
//!
//! if let Some(Ok(line)) = ws.recv().await {
//!     println!("server said: {line}");
//! }
//!
//! ws.close().await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::WebSocketTransport;

#[cfg(feature = "transport-sse")]
pub mod sse;

#[cfg(feature = "transport-sse")]
pub use sse::SseTransport;
