//! Error types for the Story Arcade client.

use thiserror::Error;

/// Errors that can occur when using the Story Arcade client.
#[derive(Debug, Error)]
pub enum StoryArcadeError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active connection, but the client is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// A submission was attempted while another participant holds the turn.
    #[error("it is not this participant's turn")]
    NotYourTurn,

    /// A submission with no content was rejected before any request was sent.
    #[error("submission is empty")]
    EmptySubmission,

    /// A submission exceeded the mode's input length bound.
    #[error("submission is {len} characters, limit is {max}")]
    SubmissionTooLong { len: usize, max: usize },

    /// The session's question/turn budget is exhausted; only resolution commands remain.
    #[error("turn budget of {max} reached; resolution required")]
    TurnBudgetExhausted { max: u32 },

    /// A command was issued in a phase that does not accept it.
    #[error("command requires phase {expected}")]
    WrongPhase { expected: &'static str },

    /// A submission was attempted while a previous stream is still open.
    #[error("a submission is still streaming")]
    SubmissionOutstanding,

    /// The server returned an error message.
    #[error("server error: {message}")]
    ServerError {
        /// Human-readable error message from the server.
        message: String,
    },

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An HTTP-level error occurred while opening or reading a stream.
    #[error("http error: {0}")]
    Http(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for Story Arcade client operations.
pub type Result<T> = std::result::Result<T, StoryArcadeError>;
