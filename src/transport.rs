//! Transport abstraction over the backend's two channels.
//!
//! The [`Transport`] trait defines a bidirectional text message channel
//! between the client and the Story Arcade backend. Both channels carry
//! newline-delimited JSON text, so every transport implementation handles
//! framing internally: the room WebSocket yields one JSON object per frame,
//! the streaming HTTP channel yields one reassembled `data: {...}` line
//! per `recv`.
//!
//! # Connection Setup
//!
//! Connection setup is intentionally NOT part of this trait — different
//! transports have fundamentally different connection parameters (a WebSocket
//! URL versus an HTTP endpoint plus request body). Construct a connected
//! transport externally, then pass it to `StoryArcadeClient::start`.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use story_arcade_client::error::StoryArcadeError;
//! use story_arcade_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), StoryArcadeError> {
//!         // Send the JSON text message over your transport
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, StoryArcadeError>> {
//!         // Receive the next complete line
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), StoryArcadeError> {
//!         // Gracefully shut down the connection
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::StoryArcadeError;

/// A bidirectional text channel to the Story Arcade backend.
///
/// Implementors shuttle complete text lines between the client and server.
/// Each call to [`send`](Transport::send) transmits one serialized JSON
/// message. Each call to [`recv`](Transport::recv) returns one complete line,
/// never a partial record: line reassembly across network reads belongs to
/// the transport, decoding belongs to [`decode_line`](crate::decoder::decode_line).
///
/// # Object Safety
///
/// This trait is object-safe, so `Box<dyn Transport>` works for dynamic
/// dispatch. However, `StoryArcadeClient::start` accepts `impl Transport`
/// (monomorphized) for the common case.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is
/// used inside `tokio::select!`. If `recv` is cancelled before completion,
/// calling it again must not lose data. Channel-based implementations (e.g.,
/// wrapping `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// Half-duplex transports (the streaming HTTP channel) reject this after
    /// the opening request has been transmitted.
    ///
    /// # Errors
    ///
    /// Returns [`StoryArcadeError::TransportSend`] if the message could not
    /// be sent (e.g., connection broken, send not supported mid-stream).
    async fn send(&mut self, message: String) -> Result<(), StoryArcadeError>;

    /// Receive the next complete line from the server.
    ///
    /// Returns:
    /// - `Some(Ok(line))` — a complete line was received
    /// - `Some(Err(e))` — a transport error occurred (e.g., [`StoryArcadeError::TransportReceive`])
    /// - `None` — the connection was closed cleanly by the server
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<String, StoryArcadeError>>;

    /// Close the transport connection gracefully.
    ///
    /// After calling this method, subsequent calls to [`send`](Transport::send)
    /// and [`recv`](Transport::recv) may return errors or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), StoryArcadeError>;
}
