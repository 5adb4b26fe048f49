//! Streaming HTTP transport for the `data: {...}` endpoints, built on `reqwest`.
//!
//! This module provides [`SseTransport`], a [`Transport`] implementation for
//! the backend's streaming HTTP channel (chat, story adventure, mystery
//! question streams). One POST request opens the stream; the response body
//! then arrives as arbitrary byte chunks that [`LineBuffer`] reassembles into
//! complete `data: {...}` lines.
//!
//! The channel is half-duplex: the request body is the only client-to-server
//! payload, transmitted at open. [`send`](Transport::send) therefore always
//! fails once the stream is open — a new exchange means a new transport.
//!
//! # Feature gate
//!
//! This module is only available when the `transport-sse` feature is enabled
//! (it is enabled by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), story_arcade_client::StoryArcadeError> {
//! use story_arcade_client::protocol::StartStoryRequest;
//! use story_arcade_client::{SseTransport, Transport};
//!
//! let http = reqwest::Client::new();
//! let body = StartStoryRequest {
//!     genre: "fantasy".into(),
//!     model: "openai-gpt3.5".into(),
//! };
//! let mut transport =
//!     SseTransport::post(&http, "http://localhost:8000/api/games/story/start/stream", &body)
//!         .await?;
//!
//! while let Some(line) = transport.recv().await {
//!     println!("line: {}", line?);
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Serialize;

use crate::decoder::LineBuffer;
use crate::error::StoryArcadeError;
use crate::transport::Transport;

/// Boxed byte-chunk stream, the shape `reqwest` response bodies come in.
pub type ByteStream = BoxStream<'static, Result<Bytes, StoryArcadeError>>;

/// A [`Transport`] implementation over one streaming HTTP response.
///
/// Each `recv` returns one complete line from the response body, reassembled
/// across chunk boundaries by [`LineBuffer`]. At end of stream a buffered
/// partial line is discarded (the backend newline-terminates every record, so
/// a leftover means the stream was cut mid-record) and `recv` returns `None`.
///
/// # Cancel Safety
///
/// `recv` is cancel-safe: buffered bytes live in the [`LineBuffer`], and the
/// underlying chunk stream loses nothing when its `next` future is dropped
/// between items.
pub struct SseTransport {
    stream: Option<ByteStream>,
    lines: LineBuffer,
}

impl SseTransport {
    /// Open a stream by POSTing `body` as JSON to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoryArcadeError::Http`] if the request fails or the server
    /// responds with a non-success status.
    pub async fn post<B: Serialize + ?Sized>(
        client: &reqwest::Client,
        url: &str,
        body: &B,
    ) -> Result<Self, StoryArcadeError> {
        tracing::debug!(url = %url, "opening streaming HTTP request");

        let response = client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| StoryArcadeError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| StoryArcadeError::Http(e.to_string()))?;

        tracing::debug!(url = %url, status = %response.status(), "stream opened");
        Ok(Self::from_response(response))
    }

    /// Like [`post`](Self::post) but fails with [`StoryArcadeError::Timeout`]
    /// if the response headers do not arrive within the given duration. The
    /// body stream itself is not subject to the timeout.
    pub async fn post_with_timeout<B: Serialize + ?Sized>(
        client: &reqwest::Client,
        url: &str,
        body: &B,
        timeout: std::time::Duration,
    ) -> Result<Self, StoryArcadeError> {
        tokio::time::timeout(timeout, Self::post(client, url, body))
            .await
            .map_err(|_| StoryArcadeError::Timeout)?
    }

    /// Wrap an already-opened [`reqwest::Response`].
    ///
    /// Useful when the request needs headers or query parameters that
    /// [`post`](Self::post) does not expose.
    pub fn from_response(response: reqwest::Response) -> Self {
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| StoryArcadeError::Http(e.to_string())))
            .boxed();
        Self::from_stream(stream)
    }

    /// Construct directly from a byte-chunk stream (tests, adapters).
    pub fn from_stream(stream: ByteStream) -> Self {
        Self {
            stream: Some(stream),
            lines: LineBuffer::new(),
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn send(&mut self, _message: String) -> Result<(), StoryArcadeError> {
        // The request body went out at open; the channel has no further
        // client-to-server path.
        Err(StoryArcadeError::TransportSend(
            "streaming HTTP transport cannot send after the stream is open".into(),
        ))
    }

    async fn recv(&mut self) -> Option<Result<String, StoryArcadeError>> {
        loop {
            if let Some(line) = self.lines.next_line() {
                return Some(Ok(line));
            }
            let stream = self.stream.as_mut()?;
            match stream.next().await {
                Some(Ok(chunk)) => self.lines.push(&chunk),
                Some(Err(e)) => {
                    self.stream = None;
                    self.lines.discard_partial();
                    return Some(Err(e));
                }
                None => {
                    self.stream = None;
                    self.lines.discard_partial();
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), StoryArcadeError> {
        // Dropping the body stream aborts the HTTP request.
        self.stream = None;
        self.lines.discard_partial();
        Ok(())
    }
}

impl std::fmt::Debug for SseTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseTransport")
            .field("open", &self.stream.is_some())
            .field("pending_bytes", &self.lines.pending())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn scripted(chunks: Vec<Result<&'static str, StoryArcadeError>>) -> SseTransport {
        let stream = stream::iter(
            chunks
                .into_iter()
                .map(|chunk| chunk.map(|s| Bytes::from_static(s.as_bytes()))),
        )
        .boxed();
        SseTransport::from_stream(stream)
    }

    #[tokio::test]
    async fn recv_yields_lines_across_chunk_boundaries() {
        let mut transport = scripted(vec![
            Ok("data: {\"chunk\": \"On"),
            Ok("ce\"}\ndata: {\"done\""),
            Ok(": true}\n"),
        ]);

        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#"data: {"chunk": "Once"}"#
        );
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#"data: {"done": true}"#
        );
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_yields_multiple_lines_from_one_chunk() {
        let mut transport = scripted(vec![Ok(
            "data: {\"chunk\": \"a\"}\ndata: {\"chunk\": \"b\"}\n",
        )]);

        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#"data: {"chunk": "a"}"#
        );
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#"data: {"chunk": "b"}"#
        );
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn partial_line_at_eof_is_discarded() {
        let mut transport = scripted(vec![Ok("data: {\"chunk\": \"whole\"}\ndata: {\"chu")]);

        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#"data: {"chunk": "whole"}"#
        );
        // The trailing partial record must not surface.
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_surfaces_stream_error() {
        let mut transport = scripted(vec![
            Ok("data: {\"chunk\": \"a\"}\n"),
            Err(StoryArcadeError::Http("connection reset".into())),
        ]);

        assert!(transport.recv().await.unwrap().is_ok());
        let err = transport.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, StoryArcadeError::Http(_)));
        // The transport is finished after an error.
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_is_rejected() {
        let mut transport = scripted(vec![]);
        let err = transport.send("anything".into()).await.unwrap_err();
        assert!(matches!(err, StoryArcadeError::TransportSend(_)));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_ends_recv() {
        let mut transport = scripted(vec![Ok("data: {\"chunk\": \"a\"}\n")]);
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(transport.recv().await.is_none());
    }

    #[test]
    fn sse_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<SseTransport>();
    }
}
