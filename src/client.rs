//! Async client for the cooperative story room channel.
//!
//! [`StoryArcadeClient`] is a thin handle that communicates with a background
//! transport loop task via an unbounded MPSC channel. Events are emitted on a
//! bounded channel ([`tokio::sync::mpsc::Receiver<GameEvent>`]) returned from
//! [`StoryArcadeClient::start`].
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::connect("ws://localhost:8000/ws/coop-story").await?;
//! let config = StoryArcadeConfig::new();
//! let handshake = Handshake::create_room("Alice", GameSettings::new("fantasy", "openai-gpt3.5"));
//! let (client, mut events) = StoryArcadeClient::start(transport, handshake, config);
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         GameEvent::SessionAck { snapshot } => { /* … */ }
//!         GameEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};

use crate::decoder::decode_line;
use crate::error::{Result, StoryArcadeError};
use crate::event::GameEvent;
use crate::protocol::{ClientMessage, GameSettings};
use crate::transport::Transport;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`StoryArcadeClient`] connection.
///
/// All fields have defaults; construct via [`StoryArcadeConfig::new`] and
/// tune with the builder methods.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use story_arcade_client::client::StoryArcadeConfig;
///
/// let config = StoryArcadeConfig::new()
///     .with_event_channel_capacity(512)
///     .with_shutdown_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct StoryArcadeConfig {
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up with incoming server messages, events
    /// are dropped (with a warning logged) to avoid blocking the transport
    /// loop. The `Disconnected` event is always delivered regardless of
    /// capacity.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown.
    ///
    /// When [`StoryArcadeClient::shutdown`] is called, the background
    /// transport loop is given this much time to close the transport and emit
    /// a final `Disconnected` event. If the timeout expires the task is
    /// aborted.
    ///
    /// Defaults to **1 second**. A zero timeout aborts the transport loop
    /// immediately without waiting for graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl StoryArcadeConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    ///
    /// Defaults to **1 second**. A zero timeout aborts the transport loop
    /// immediately without waiting for graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for StoryArcadeConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── Handshake ───────────────────────────────────────────────────────

/// The opening message of a room connection.
///
/// The backend requires the first frame on the socket to either create a
/// room or join one; everything else is rejected until then. The handshake
/// is therefore supplied to [`StoryArcadeClient::start`] and queued before
/// any other command can be sent.
#[derive(Debug, Clone)]
pub enum Handshake {
    /// Create a new room and become its host.
    CreateRoom {
        player_name: String,
        game_settings: GameSettings,
    },
    /// Join an existing room by id.
    JoinRoom {
        player_name: String,
        room_id: String,
    },
}

impl Handshake {
    /// Handshake that creates a room with the given settings.
    pub fn create_room(player_name: impl Into<String>, game_settings: GameSettings) -> Self {
        Self::CreateRoom {
            player_name: player_name.into(),
            game_settings,
        }
    }

    /// Handshake that joins the room with the given id.
    pub fn join_room(player_name: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self::JoinRoom {
            player_name: player_name.into(),
            room_id: room_id.into(),
        }
    }

    fn into_message(self) -> ClientMessage {
        match self {
            Handshake::CreateRoom {
                player_name,
                game_settings,
            } => ClientMessage::CreateRoom {
                player_name,
                game_settings,
            },
            Handshake::JoinRoom {
                player_name,
                room_id,
            } => ClientMessage::JoinRoom {
                player_name,
                room_id,
            },
        }
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// Internal shared state between the client handle and the transport loop.
struct ClientState {
    connected: AtomicBool,
    room_id: Mutex<Option<String>>,
}

impl ClientState {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            room_id: Mutex::new(None),
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Async client handle for the cooperative story room channel.
///
/// Created via [`StoryArcadeClient::start`], which spawns a background
/// transport loop and returns this handle together with an event receiver.
///
/// All public methods serialize a [`ClientMessage`] and send it to the
/// transport loop over an unbounded channel. They return immediately once
/// the message is queued (no round-trip await).
pub struct StoryArcadeClient {
    /// Sender half of the command channel to the transport loop.
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    /// Shared state updated by the transport loop.
    state: Arc<ClientState>,
    /// Handle to the background transport loop task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the transport loop to shut down gracefully.
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    /// Timeout for the graceful shutdown.
    shutdown_timeout: Duration,
}

impl StoryArcadeClient {
    /// Start the client transport loop and return a handle plus event receiver.
    ///
    /// The transport loop immediately sends the `handshake` message (room
    /// creation or join) before any other command.
    ///
    /// # Arguments
    ///
    /// * `transport` — A connected [`Transport`] implementation.
    /// * `handshake` — The mandatory opening message.
    /// * `config` — Channel capacity and shutdown tuning.
    ///
    /// # Returns
    ///
    /// A tuple of `(client_handle, event_receiver)`. The event receiver
    /// yields [`GameEvent`]s until the transport closes or the client shuts
    /// down.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        transport: impl Transport,
        handshake: Handshake,
        config: StoryArcadeConfig,
    ) -> (Self, mpsc::Receiver<GameEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<GameEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let state = Arc::new(ClientState::new());
        let loop_state = Arc::clone(&state);

        // Queue the handshake so the transport loop picks it up as the very
        // first outgoing message. This cannot fail: the channel was just
        // created.
        let _ = cmd_tx.send(handshake.into_message());

        let task = tokio::spawn(transport_loop(
            transport,
            cmd_rx,
            event_tx,
            loop_state,
            shutdown_rx,
        ));

        let client = Self {
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        (client, event_rx)
    }

    // ── Public API methods ──────────────────────────────────────────

    /// Host-only: start the cooperative game.
    ///
    /// # Errors
    ///
    /// Returns [`StoryArcadeError::NotConnected`] if the transport has closed.
    pub fn start_game(&self) -> Result<()> {
        self.send(ClientMessage::StartGame)
    }

    /// Contribute the next story turn.
    ///
    /// # Errors
    ///
    /// Returns [`StoryArcadeError::NotConnected`] if the transport has closed.
    pub fn submit_turn(&self, text: impl Into<String>) -> Result<()> {
        self.send(ClientMessage::SubmitTurn { text: text.into() })
    }

    /// Leave the current room.
    ///
    /// # Errors
    ///
    /// Returns [`StoryArcadeError::NotConnected`] if the transport has closed.
    pub fn leave_room(&self) -> Result<()> {
        self.send(ClientMessage::LeaveRoom)
    }

    /// Request a fresh room snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoryArcadeError::NotConnected`] if the transport has closed.
    pub fn request_room_info(&self) -> Result<()> {
        self.send(ClientMessage::GetRoomInfo)
    }

    /// Send a keep-alive heartbeat.
    ///
    /// # Errors
    ///
    /// Returns [`StoryArcadeError::NotConnected`] if the transport has closed.
    pub fn heartbeat(&self) -> Result<()> {
        self.send(ClientMessage::Heartbeat)
    }

    /// Shut down the client, closing the transport and stopping the background task.
    ///
    /// After calling this method, the event receiver will yield `None` once
    /// the transport loop exits.
    pub async fn shutdown(&mut self) {
        debug!("StoryArcadeClient: shutdown requested");

        // Signal the transport loop to shut down gracefully.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the transport loop with a timeout. If it doesn't exit in
        // time, abort it so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("transport loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("transport loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("transport loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` if the transport is believed to be connected.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Returns the current room id, once the server has acknowledged the
    /// handshake.
    pub async fn current_room_id(&self) -> Option<String> {
        self.state.room_id.lock().await.clone()
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Queue a `ClientMessage` to the transport loop.
    fn send(&self, msg: ClientMessage) -> Result<()> {
        if !self.state.connected.load(Ordering::Acquire) {
            return Err(StoryArcadeError::NotConnected);
        }
        self.cmd_tx
            .send(msg)
            .map_err(|_| StoryArcadeError::NotConnected)
    }
}

impl std::fmt::Debug for StoryArcadeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoryArcadeClient")
            .field("connected", &self.is_connected())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for StoryArcadeClient {
    fn drop(&mut self) {
        // `Drop` is synchronous so we cannot await a graceful shutdown.
        // The only safe action is to abort the spawned task, which causes
        // the transport loop future to be dropped immediately.  The
        // `shutdown_tx` oneshot is intentionally *not* sent here: sending
        // it would trigger a graceful path that calls async `transport.close()`,
        // but there is no executor context to drive it inside `Drop`.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Transport loop ──────────────────────────────────────────────────

/// Background transport loop that multiplexes send/receive via `tokio::select!`.
///
/// Exits when:
/// - The command channel closes (client handle dropped or shutdown called)
/// - The transport returns `None` (server closed connection)
/// - A transport error occurs
async fn transport_loop(
    mut transport: impl Transport,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    event_tx: mpsc::Sender<GameEvent>,
    state: Arc<ClientState>,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) {
    debug!("transport loop started");

    // Emit the synthetic Connected event before entering the select loop.
    emit_event(&event_tx, GameEvent::Connected).await;

    loop {
        tokio::select! {
            // Branch 1: outgoing command from the client handle
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(msg) => {
                        debug!("sending client message: {:?}", std::mem::discriminant(&msg));
                        match serde_json::to_string(&msg) {
                            Ok(json) => {
                                if let Err(e) = transport.send(json).await {
                                    error!("transport send error: {e}");
                                    emit_disconnected(
                                        &event_tx,
                                        &state,
                                        Some(format!("transport send error: {e}")),
                                    ).await;
                                    break;
                                }
                            }
                            Err(e) => {
                                error!("failed to serialize ClientMessage: {e}");
                                // Serialization errors are programming bugs; don't kill the loop.
                            }
                        }
                    }
                    // Command channel closed — client handle dropped.
                    None => {
                        debug!("command channel closed, shutting down transport loop");
                        let _ = transport.close().await;
                        emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                        break;
                    }
                }
            }

            // Branch 2: shutdown signal
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                break;
            }

            // Branch 3: incoming line from the server
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(line)) => {
                        // decode_line absorbs malformed lines and keep-alives;
                        // only session-relevant events reach the channel.
                        if let Some(event) = decode_line(&line) {
                            update_state(&state, &event).await;
                            emit_event(&event_tx, event).await;
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        emit_disconnected(
                            &event_tx,
                            &state,
                            Some(format!("transport receive error: {e}")),
                        ).await;
                        break;
                    }
                    // Transport closed cleanly.
                    None => {
                        debug!("transport closed by server");
                        emit_disconnected(&event_tx, &state, None).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("transport loop exited");
}

/// Update shared [`ClientState`] based on a decoded [`GameEvent`].
async fn update_state(state: &ClientState, event: &GameEvent) {
    match event {
        GameEvent::SessionAck { snapshot } => {
            if let Some(room_id) = &snapshot.room_id {
                *state.room_id.lock().await = Some(room_id.clone());
                debug!("state: in room {room_id}");
            }
        }
        GameEvent::Snapshot { snapshot } | GameEvent::ActivityBegan { snapshot } => {
            if let Some(room_id) = &snapshot.room_id {
                *state.room_id.lock().await = Some(room_id.clone());
            }
        }
        _ => {}
    }
}

/// Emit an event to the event channel. If the channel is full, log a warning
/// and drop the event to avoid blocking the transport loop.
async fn emit_event(event_tx: &mpsc::Sender<GameEvent>, event: GameEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit a [`Disconnected`](GameEvent::Disconnected) event and update state.
///
/// Uses `send().await` (blocking) instead of `try_send` because `Disconnected`
/// is always the last event on the channel and must never be silently dropped.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<GameEvent>,
    state: &ClientState,
    reason: Option<String>,
) {
    state.connected.store(false, Ordering::Release);
    *state.room_id.lock().await = None;
    let event = GameEvent::Disconnected { reason };
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use crate::protocol::{PlayerInfo, RoomInfo, ServerMessage};
    use async_trait::async_trait;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex as StdMutex;

    // ── Mock transport ──────────────────────────────────────────────

    /// A mock transport that records sent messages and replays scripted responses.
    struct MockTransport {
        /// Lines that `recv()` will yield in order.
        incoming: VecDeque<Option<std::result::Result<String, StoryArcadeError>>>,
        /// Recorded outgoing messages.
        sent: Arc<StdMutex<Vec<String>>>,
        /// Whether `close()` was called.
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<std::result::Result<String, StoryArcadeError>>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let transport = Self {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            };
            (transport, sent, closed)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), StoryArcadeError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, StoryArcadeError>> {
            if let Some(item) = self.incoming.pop_front() {
                // An explicit `None` entry signals a clean transport close;
                // `Some(result)` delivers the scripted line or error.
                item
            } else {
                // All scripted lines have been delivered — hang forever
                // so the transport loop stays alive until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), StoryArcadeError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn solo_room_info(room_id: &str) -> RoomInfo {
        let mut players = BTreeMap::new();
        players.insert(
            "player-1".to_string(),
            PlayerInfo {
                name: "Alice".into(),
                is_host: true,
                is_online: true,
            },
        );
        RoomInfo {
            room_id: Some(room_id.into()),
            players,
            current_turn: None,
            game_settings: None,
        }
    }

    fn room_created_json() -> String {
        serde_json::to_string(&ServerMessage::RoomCreated {
            room_id: "ROOM42".into(),
            room_info: solo_room_info("ROOM42"),
        })
        .unwrap()
    }

    fn heartbeat_response_json() -> String {
        serde_json::to_string(&ServerMessage::HeartbeatResponse).unwrap()
    }

    fn test_handshake() -> Handshake {
        Handshake::create_room("Alice", GameSettings::new("fantasy", "openai-gpt3.5"))
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn start_sends_handshake_first() {
        let (transport, sent, _closed) = MockTransport::new(vec![Some(Ok(room_created_json()))]);

        let (mut client, mut events) =
            StoryArcadeClient::start(transport, test_handshake(), StoryArcadeConfig::new());

        // First event should be Connected.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, GameEvent::Connected));

        // Wait for the SessionAck event.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, GameEvent::SessionAck { .. }));

        // The first sent message should be CreateRoom.
        {
            let messages = sent.lock().unwrap();
            assert!(!messages.is_empty());
            let first: ClientMessage = serde_json::from_str(&messages[0]).unwrap();
            if let ClientMessage::CreateRoom { player_name, .. } = first {
                assert_eq!(player_name, "Alice");
            } else {
                panic!("expected CreateRoom as first message, got {first:?}");
            }
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn join_handshake_sends_room_id() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);

        let handshake = Handshake::join_room("Bob", "ROOM42");
        let (mut client, mut events) =
            StoryArcadeClient::start(transport, handshake, StoryArcadeConfig::new());

        let _ = events.recv().await; // Connected
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            let first: ClientMessage = serde_json::from_str(&messages[0]).unwrap();
            if let ClientMessage::JoinRoom {
                player_name,
                room_id,
            } = first
            {
                assert_eq!(player_name, "Bob");
                assert_eq!(room_id, "ROOM42");
            } else {
                panic!("expected JoinRoom as first message, got {first:?}");
            }
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn state_updates_on_session_ack() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(room_created_json()))]);

        let (mut client, mut events) =
            StoryArcadeClient::start(transport, test_handshake(), StoryArcadeConfig::new());

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionAck

        assert!(client.is_connected());
        assert_eq!(client.current_room_id().await.as_deref(), Some("ROOM42"));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn heartbeat_response_is_not_forwarded() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(heartbeat_response_json())),
            Some(Ok(room_created_json())),
        ]);

        let (mut client, mut events) =
            StoryArcadeClient::start(transport, test_handshake(), StoryArcadeConfig::new());

        let _ = events.recv().await; // Connected
        // The heartbeat response is swallowed; the next event is SessionAck.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, GameEvent::SessionAck { .. }));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn submit_turn_sends_correct_message() {
        let (transport, sent, _closed) = MockTransport::new(vec![Some(Ok(room_created_json()))]);

        let (mut client, mut events) =
            StoryArcadeClient::start(transport, test_handshake(), StoryArcadeConfig::new());

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionAck

        client.submit_turn("The gate creaked open.").unwrap();

        // Give the loop a moment to process.
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            // Second message should be SubmitTurn (first was the handshake).
            assert!(messages.len() >= 2);
            let last: ClientMessage = serde_json::from_str(messages.last().unwrap()).unwrap();
            if let ClientMessage::SubmitTurn { text } = last {
                assert_eq!(text, "The gate creaked open.");
            } else {
                panic!("expected SubmitTurn message, got {last:?}");
            }
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn start_game_sends_message() {
        let (transport, sent, _closed) = MockTransport::new(vec![Some(Ok(room_created_json()))]);

        let (mut client, mut events) =
            StoryArcadeClient::start(transport, test_handshake(), StoryArcadeConfig::new());

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionAck
        client.start_game().unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            let last: ClientMessage = serde_json::from_str(messages.last().unwrap()).unwrap();
            assert!(matches!(last, ClientMessage::StartGame));
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn leave_room_sends_message() {
        let (transport, sent, _closed) = MockTransport::new(vec![Some(Ok(room_created_json()))]);

        let (mut client, mut events) =
            StoryArcadeClient::start(transport, test_handshake(), StoryArcadeConfig::new());

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionAck
        client.leave_room().unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            let last: ClientMessage = serde_json::from_str(messages.last().unwrap()).unwrap();
            assert!(matches!(last, ClientMessage::LeaveRoom));
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn heartbeat_sends_message() {
        let (transport, sent, _closed) = MockTransport::new(vec![Some(Ok(room_created_json()))]);

        let (mut client, mut events) =
            StoryArcadeClient::start(transport, test_handshake(), StoryArcadeConfig::new());

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionAck
        client.heartbeat().unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            let last: ClientMessage = serde_json::from_str(messages.last().unwrap()).unwrap();
            assert!(matches!(last, ClientMessage::Heartbeat));
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn disconnected_on_transport_close() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(room_created_json())),
            // Explicit None signals clean transport close.
            None,
        ]);

        let (mut client, mut events) =
            StoryArcadeClient::start(transport, test_handshake(), StoryArcadeConfig::new());

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionAck
        let event = events.recv().await.unwrap(); // Disconnected
        assert!(matches!(event, GameEvent::Disconnected { .. }));

        assert!(!client.is_connected());
        assert!(client.current_room_id().await.is_none());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn not_connected_error_after_shutdown() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(room_created_json()))]);

        let (mut client, mut events) =
            StoryArcadeClient::start(transport, test_handshake(), StoryArcadeConfig::new());

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionAck

        client.shutdown().await;

        let result = client.heartbeat();
        assert!(matches!(result, Err(StoryArcadeError::NotConnected)));
    }

    #[tokio::test]
    async fn transport_recv_error_emits_disconnected() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Err(
            StoryArcadeError::TransportReceive("boom".into()),
        ))]);

        let (mut client, mut events) =
            StoryArcadeClient::start(transport, test_handshake(), StoryArcadeConfig::new());

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert!(matches!(event, GameEvent::Disconnected { .. }));
        if let GameEvent::Disconnected { reason } = event {
            assert!(reason.unwrap().contains("boom"));
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_line_does_not_kill_loop() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok("{garbage".to_string())),
            Some(Ok(room_created_json())),
        ]);

        let (mut client, mut events) =
            StoryArcadeClient::start(transport, test_handshake(), StoryArcadeConfig::new());

        let _ = events.recv().await; // Connected
        // The garbage line is dropped; the room ack still arrives.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, GameEvent::SessionAck { .. }));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn connected_is_first_event() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(room_created_json()))]);

        let (mut client, mut events) =
            StoryArcadeClient::start(transport, test_handshake(), StoryArcadeConfig::new());

        let first = events.recv().await.unwrap();
        assert!(
            matches!(first, GameEvent::Connected),
            "expected Connected as first event, got {first:?}"
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_emits_disconnected() {
        let (transport, _sent, closed) = MockTransport::new(vec![Some(Ok(room_created_json()))]);

        let (mut client, mut events) =
            StoryArcadeClient::start(transport, test_handshake(), StoryArcadeConfig::new());

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionAck

        client.shutdown().await;

        // After shutdown, a Disconnected event should have been emitted.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, GameEvent::Disconnected { .. }));
        if let GameEvent::Disconnected { reason } = event {
            assert_eq!(reason.as_deref(), Some("client shut down"));
        }

        // The transport should have been closed.
        assert!(closed.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(room_created_json()))]);

        let (mut client, mut events) =
            StoryArcadeClient::start(transport, test_handshake(), StoryArcadeConfig::new());

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionAck

        client.shutdown().await;
        client.shutdown().await; // should not panic
    }

    #[tokio::test]
    async fn drop_without_explicit_shutdown() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(room_created_json()))]);

        let (client, mut events) =
            StoryArcadeClient::start(transport, test_handshake(), StoryArcadeConfig::new());

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionAck

        // Drop the client without calling shutdown.
        drop(client);

        // The transport loop should eventually exit; the event channel
        // will close. We just verify we don't hang or panic.
        while let Some(_event) = events.recv().await {}
    }

    #[tokio::test]
    async fn small_event_channel_capacity_triggers_backpressure() {
        // Use a capacity of 1 and send many snapshots — events should be dropped.
        let mut incoming: Vec<Option<std::result::Result<String, StoryArcadeError>>> = Vec::new();
        incoming.push(Some(Ok(room_created_json())));
        let room_info_json = serde_json::to_string(&ServerMessage::RoomInfo {
            room_info: solo_room_info("ROOM42"),
        })
        .unwrap();
        for _ in 0..20 {
            incoming.push(Some(Ok(room_info_json.clone())));
        }
        incoming.push(None);

        let (transport, _sent, _closed) = MockTransport::new(incoming);

        let config = StoryArcadeConfig::new().with_event_channel_capacity(1);
        let (mut client, mut events) =
            StoryArcadeClient::start(transport, test_handshake(), config);

        // Let the channel fill up and events get dropped.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut count = 0;
        while let Some(_event) = events.recv().await {
            count += 1;
        }
        // At minimum we get Connected (first try_send succeeds) and
        // Disconnected (always delivered via blocking send). Snapshots may
        // be dropped when the single-slot channel is full.
        assert!(count >= 2, "expected at least 2 events, got {count}");
        // But fewer than the total pushed (1 Connected + 1 ack + 20 snapshots + 1 Disconnected).
        assert!(
            count < 23,
            "expected backpressure to drop some events, but got all {count}"
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn event_channel_capacity_is_clamped_to_one() {
        let config = StoryArcadeConfig::new().with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[tokio::test]
    async fn config_defaults() {
        let config = StoryArcadeConfig::new();
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(room_created_json()))]);

        let (mut client, mut events) =
            StoryArcadeClient::start(transport, test_handshake(), StoryArcadeConfig::new());

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionAck

        let debug_str = format!("{:?}", client);
        assert!(debug_str.contains("StoryArcadeClient"));
        assert!(debug_str.contains("connected"));

        client.shutdown().await;
    }

    /// Transport that hangs forever in `close()` so shutdown timeout/abort
    /// can be tested.
    struct HangingCloseTransport {
        close_called: Arc<AtomicBool>,
        dropped: Arc<AtomicBool>,
    }

    impl HangingCloseTransport {
        fn new() -> (Self, Arc<AtomicBool>, Arc<AtomicBool>) {
            let close_called = Arc::new(AtomicBool::new(false));
            let dropped = Arc::new(AtomicBool::new(false));
            (
                Self {
                    close_called: Arc::clone(&close_called),
                    dropped: Arc::clone(&dropped),
                },
                close_called,
                dropped,
            )
        }
    }

    impl Drop for HangingCloseTransport {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::Release);
        }
    }

    #[async_trait]
    impl Transport for HangingCloseTransport {
        async fn send(&mut self, _message: String) -> std::result::Result<(), StoryArcadeError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, StoryArcadeError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), StoryArcadeError> {
            self.close_called.store(true, Ordering::Release);
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn shutdown_timeout_aborts_stuck_transport_task() {
        let (transport, close_called, dropped) = HangingCloseTransport::new();
        let config = StoryArcadeConfig::new().with_shutdown_timeout(Duration::from_millis(20));
        let (mut client, mut events) =
            StoryArcadeClient::start(transport, test_handshake(), config);

        // Drain Connected so the channel remains uncongested.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, GameEvent::Connected));

        client.shutdown().await;

        assert!(
            close_called.load(Ordering::Acquire),
            "transport.close() should have been attempted during graceful shutdown"
        );
        assert!(
            dropped.load(Ordering::Acquire),
            "timed-out shutdown should abort and drop the transport loop task"
        );
        assert!(!client.is_connected());
    }
}
