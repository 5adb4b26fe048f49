//! Session state machine shared by every game screen.
//!
//! One play-through is one [`Session`]: a phase, a transcript, a turn
//! pointer, and an optional countdown. All five game modes run through the
//! same machine, parametrized by [`SessionRules`]; what differs per mode is
//! constants (input bounds, budgets, timers, scoring), not control flow.
//!
//! The machine is an event-sourced reducer. Server activity arrives as
//! [`GameEvent`]s through [`Session::apply`]; user commands validate locally,
//! mutate optimistic state, and return the outbound request for the caller
//! to transmit. Validation failures reject before any request is produced
//! and leave the session untouched. Transport and decode failures never
//! cross this boundary as errors — they arrive as events on the same
//! pathway.
//!
//! Fragments are concatenated strictly in arrival order. In-order,
//! non-interleaved delivery per connection is assumed (the transports
//! preserve it); the machine does not reorder or deduplicate.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, StoryArcadeError};
use crate::event::{CompletionMeta, GameEvent, RoomSnapshot};
use crate::protocol::{
    AccusationResult, AskQuestionRequest, CaseData, ChatRequest, ClientMessage,
    ContinueStoryRequest, CreateMysteryRequest, GameSettings, MakeAccusationRequest,
    StartStoryRequest, StoryTurn,
};
use crate::timer::{Countdown, TickOutcome, TimeoutPolicy};

/// Sentinel speaker for AI-authored transcript entries.
pub const AI_SPEAKER: &str = "AI";

/// Tuning constants carried over from the backend's counterpart enforcement.
/// These are deliberately configuration, not inferred semantics.
pub mod limits {
    /// Maximum characters in one cooperative story turn.
    pub const COOP_TURN_MAX_CHARS: usize = 200;
    /// Maximum characters in one chat or story-action submission.
    pub const CHAT_MAX_CHARS: usize = 1000;
    /// Seconds a cooperative participant has to take their turn.
    pub const COOP_TURN_SECONDS: u32 = 60;
    /// Total seconds for a time-attack mystery.
    pub const TIME_ATTACK_SECONDS: u32 = 300;
    /// Minimum human participants before the host may start.
    pub const MIN_PLAYERS_TO_START: usize = 1;
    /// Points for a correct accusation.
    pub const BASE_SOLVE_POINTS: u32 = 1000;
    /// Bonus points per second left on the clock.
    pub const TIME_BONUS_PER_SECOND: u32 = 10;
}

// ── Modes and rules ─────────────────────────────────────────────────

/// The five game screens, each a parametrization of the same machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameMode {
    Chat,
    StoryAdventure,
    MysteryDetective,
    TimeAttackMystery,
    CooperativeStory,
}

/// Per-mode constants. Produced by [`SessionRules::for_mode`]; exposed so
/// tests can build custom rule sets.
#[derive(Debug, Clone, Copy)]
pub struct SessionRules {
    /// Whether the session passes through `Waiting` for other participants.
    pub multi_participant: bool,
    /// Length bound on free-text submissions, in characters.
    pub input_max_chars: usize,
    /// Session-wide countdown, if the mode is timed.
    pub time_limit: Option<u32>,
    /// Per-turn countdown, reset each time the local participant gains the turn.
    pub turn_seconds: Option<u32>,
    pub timeout_policy: TimeoutPolicy,
    /// Question/turn budget known up front. `None` = server-provided.
    pub turn_budget: Option<u32>,
    /// Whether a terminal judgment is scored.
    pub scored: bool,
}

impl SessionRules {
    pub fn for_mode(mode: GameMode) -> Self {
        match mode {
            GameMode::Chat => Self {
                multi_participant: false,
                input_max_chars: limits::CHAT_MAX_CHARS,
                time_limit: None,
                turn_seconds: None,
                timeout_policy: TimeoutPolicy::FreezeAtZero,
                turn_budget: None,
                scored: false,
            },
            GameMode::StoryAdventure => Self {
                multi_participant: false,
                input_max_chars: limits::CHAT_MAX_CHARS,
                time_limit: None,
                turn_seconds: None,
                timeout_policy: TimeoutPolicy::FreezeAtZero,
                turn_budget: None,
                scored: false,
            },
            GameMode::MysteryDetective => Self {
                multi_participant: false,
                input_max_chars: limits::CHAT_MAX_CHARS,
                time_limit: None,
                turn_seconds: None,
                timeout_policy: TimeoutPolicy::FreezeAtZero,
                turn_budget: None, // from CaseData
                scored: false,
            },
            GameMode::TimeAttackMystery => Self {
                multi_participant: false,
                input_max_chars: limits::CHAT_MAX_CHARS,
                time_limit: Some(limits::TIME_ATTACK_SECONDS),
                turn_seconds: None,
                timeout_policy: TimeoutPolicy::FailOnExpiry,
                turn_budget: None, // from CaseData
                scored: true,
            },
            GameMode::CooperativeStory => Self {
                multi_participant: true,
                input_max_chars: limits::COOP_TURN_MAX_CHARS,
                time_limit: None,
                turn_seconds: Some(limits::COOP_TURN_SECONDS),
                timeout_policy: TimeoutPolicy::FreezeAtZero,
                turn_budget: None,
                scored: false,
            },
        }
    }
}

/// Setup-time configuration; all values are opaque to the client.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub genre: String,
    pub difficulty: String,
    pub model: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            genre: "fantasy".into(),
            difficulty: "normal".into(),
            model: "openai-gpt3.5".into(),
        }
    }
}

// ── Phases ──────────────────────────────────────────────────────────

/// Lifecycle phases. Monotonic within one session; `restart` allocates a
/// logically new session rather than walking backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Connecting,
    Waiting,
    Active,
    Succeeded,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Setup => "setup",
            Phase::Connecting => "connecting",
            Phase::Waiting => "waiting",
            Phase::Active => "active",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

// ── Transcript ──────────────────────────────────────────────────────

/// One element of the ordered transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEntry {
    /// Narrative contribution (story/cooperative variants).
    Turn {
        speaker: String,
        text: String,
        /// Unix milliseconds. Zero for locally synthesized entries that the
        /// server will re-timestamp.
        timestamp: i64,
    },
    /// Question/answer pair (mystery variants).
    Exchange { question: String, answer: String },
}

impl TranscriptEntry {
    /// The growable text of this entry.
    pub fn text(&self) -> &str {
        match self {
            TranscriptEntry::Turn { text, .. } => text,
            TranscriptEntry::Exchange { answer, .. } => answer,
        }
    }

    fn append(&mut self, fragment: &str) {
        match self {
            TranscriptEntry::Turn { text, .. } => text.push_str(fragment),
            TranscriptEntry::Exchange { answer, .. } => answer.push_str(fragment),
        }
    }
}

/// Ordered, append-only record of session content.
///
/// At most one entry — always the newest — may be in progress. Fragments
/// append to it; a completion marker finalizes it.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    in_progress: bool,
}

impl Transcript {
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the newest entry is still receiving fragments.
    pub fn is_streaming(&self) -> bool {
        self.in_progress
    }

    fn begin_turn(&mut self, speaker: impl Into<String>) {
        self.finalize();
        self.entries.push(TranscriptEntry::Turn {
            speaker: speaker.into(),
            text: String::new(),
            timestamp: now_millis(),
        });
        self.in_progress = true;
    }

    fn begin_exchange(&mut self, question: impl Into<String>) {
        self.finalize();
        self.entries.push(TranscriptEntry::Exchange {
            question: question.into(),
            answer: String::new(),
        });
        self.in_progress = true;
    }

    fn push_complete(&mut self, entry: TranscriptEntry) {
        self.finalize();
        self.entries.push(entry);
    }

    fn append(&mut self, fragment: &str) {
        if !self.in_progress {
            // Defensive: a fragment with no opened entry starts an AI turn.
            debug!("fragment arrived with no in-progress entry; opening one");
            self.begin_turn(AI_SPEAKER);
        }
        if let Some(last) = self.entries.last_mut() {
            last.append(fragment);
        }
    }

    fn finalize(&mut self) {
        self.in_progress = false;
    }

    fn replace_all(&mut self, turns: Vec<StoryTurn>) {
        self.entries = turns
            .into_iter()
            .map(|turn| TranscriptEntry::Turn {
                speaker: turn.player,
                text: turn.text,
                timestamp: turn.timestamp,
            })
            .collect();
        self.in_progress = false;
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

// ── Participants ────────────────────────────────────────────────────

/// Client-side mirror of one room participant. The set is
/// server-authoritative; see [`Session::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub is_host: bool,
    pub is_online: bool,
}

/// Terminal result of a scored session.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub correct: bool,
    pub explanation: String,
    pub culprit: Option<String>,
    pub clue_bonus: u32,
    pub time_bonus: u32,
    pub total_score: u32,
}

// ── Session ─────────────────────────────────────────────────────────

/// One play-through of one game mode. See the module docs.
#[derive(Debug, Clone)]
pub struct Session {
    /// Locally allocated identity; fresh on every construction and restart.
    local_id: Uuid,
    /// Server-assigned session or room identifier, once known.
    remote_id: Option<String>,
    mode: GameMode,
    rules: SessionRules,
    config: SessionConfig,
    phase: Phase,
    transcript: Transcript,
    participants: Vec<Participant>,
    /// Local participant id (cooperative mode), allocated on create/join.
    local_participant: Option<String>,
    current_turn: Option<String>,
    my_turn: bool,
    turns_taken: u32,
    turn_budget: Option<u32>,
    /// Sub-mode of `Active`: free-text submissions are closed, only the
    /// terminal-judgment command remains.
    resolution_required: bool,
    countdown: Option<Countdown>,
    last_error: Option<String>,
    outcome: Option<SessionOutcome>,
}

impl Session {
    pub fn new(mode: GameMode, config: SessionConfig) -> Self {
        let rules = SessionRules::for_mode(mode);
        Self::with_rules(mode, config, rules)
    }

    /// Construct with explicit rules (tests and bespoke variants).
    pub fn with_rules(mode: GameMode, config: SessionConfig, rules: SessionRules) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            remote_id: None,
            mode,
            rules,
            config,
            phase: Phase::Setup,
            transcript: Transcript::default(),
            participants: Vec::new(),
            local_participant: None,
            current_turn: None,
            my_turn: false,
            turns_taken: 0,
            turn_budget: rules.turn_budget,
            resolution_required: false,
            countdown: None,
            last_error: None,
            outcome: None,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn local_id(&self) -> Uuid {
        self.local_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn local_participant(&self) -> Option<&str> {
        self.local_participant.as_deref()
    }

    pub fn current_turn(&self) -> Option<&str> {
        self.current_turn.as_deref()
    }

    /// Whether the local participant may act. Recomputed only when a
    /// snapshot or completion carries a turn pointer; no other path toggles
    /// it, which keeps partial updates from leaving it stale.
    pub fn is_my_turn(&self) -> bool {
        self.my_turn
    }

    pub fn is_host(&self) -> bool {
        match (&self.local_participant, &self.participants) {
            (Some(local), participants) => participants
                .iter()
                .any(|p| p.is_host && &p.id == local),
            _ => false,
        }
    }

    pub fn turns_taken(&self) -> u32 {
        self.turns_taken
    }

    pub fn turn_budget(&self) -> Option<u32> {
        self.turn_budget
    }

    pub fn resolution_required(&self) -> bool {
        self.resolution_required
    }

    pub fn remaining_seconds(&self) -> Option<u32> {
        self.countdown.map(|c| c.remaining())
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Start a story-adventure session. `Setup → Connecting`.
    pub fn start_story(&mut self) -> Result<StartStoryRequest> {
        self.require_phase(Phase::Setup, "setup")?;
        self.phase = Phase::Connecting;
        self.last_error = None;
        Ok(StartStoryRequest {
            genre: self.config.genre.clone(),
            model: self.config.model.clone(),
        })
    }

    /// Request a new mystery case. `Setup → Connecting`.
    pub fn create_case(&mut self) -> Result<CreateMysteryRequest> {
        self.require_phase(Phase::Setup, "setup")?;
        self.phase = Phase::Connecting;
        self.last_error = None;
        Ok(CreateMysteryRequest {
            difficulty: self.config.difficulty.clone(),
            model: self.config.model.clone(),
        })
    }

    /// Create a cooperative room as host. Allocates the local participant
    /// id and returns the opening handshake message. `Setup → Connecting`.
    pub fn create_room(&mut self, player_name: &str) -> Result<ClientMessage> {
        self.require_phase(Phase::Setup, "setup")?;
        let name = player_name.trim();
        if name.is_empty() {
            return Err(StoryArcadeError::EmptySubmission);
        }
        self.local_participant = Some(new_player_id());
        self.phase = Phase::Connecting;
        self.last_error = None;
        Ok(ClientMessage::CreateRoom {
            player_name: name.to_string(),
            game_settings: GameSettings::new(&self.config.genre, &self.config.model),
        })
    }

    /// Join an existing cooperative room. `Setup → Connecting`.
    pub fn join_room(&mut self, player_name: &str, room_id: &str) -> Result<ClientMessage> {
        self.require_phase(Phase::Setup, "setup")?;
        let name = player_name.trim();
        let room = room_id.trim();
        if name.is_empty() || room.is_empty() {
            return Err(StoryArcadeError::EmptySubmission);
        }
        self.local_participant = Some(new_player_id());
        self.phase = Phase::Connecting;
        self.last_error = None;
        Ok(ClientMessage::JoinRoom {
            player_name: name.to_string(),
            room_id: room.to_string(),
        })
    }

    /// Host command: begin the cooperative game from the waiting room.
    pub fn start_game(&self) -> Result<ClientMessage> {
        if self.phase != Phase::Waiting {
            return Err(StoryArcadeError::WrongPhase { expected: "waiting" });
        }
        if !self.is_host() {
            return Err(StoryArcadeError::NotYourTurn);
        }
        if self.participants.len() < limits::MIN_PLAYERS_TO_START {
            return Err(StoryArcadeError::WrongPhase { expected: "waiting" });
        }
        Ok(ClientMessage::StartGame)
    }

    /// Submit a cooperative story turn. Local no-op unless it is the local
    /// participant's turn and the text passes validation.
    pub fn submit_turn(&mut self, text: &str) -> Result<ClientMessage> {
        self.require_phase(Phase::Active, "active")?;
        if !self.my_turn {
            return Err(StoryArcadeError::NotYourTurn);
        }
        let text = self.validate_input(text)?;
        self.turns_taken += 1;
        Ok(ClientMessage::SubmitTurn { text })
    }

    /// Advance a story adventure with a choice or a custom action.
    pub fn continue_story(&mut self, action: StoryAction) -> Result<ContinueStoryRequest> {
        self.require_phase(Phase::Active, "active")?;
        if self.transcript.is_streaming() {
            return Err(StoryArcadeError::SubmissionOutstanding);
        }
        let session_id = self.require_remote_id()?;
        let (choice, custom_action) = match action {
            StoryAction::Choice(index) => (Some(index), None),
            StoryAction::Custom(text) => {
                let text = self.validate_input(&text)?;
                self.transcript.push_complete(TranscriptEntry::Turn {
                    speaker: self.local_speaker(),
                    text: text.clone(),
                    timestamp: now_millis(),
                });
                (None, Some(text))
            }
        };
        self.turns_taken += 1;
        self.transcript.begin_turn(AI_SPEAKER);
        Ok(ContinueStoryRequest {
            session_id,
            choice,
            custom_action,
        })
    }

    /// Ask the mystery witness a question. Opens an in-progress
    /// question/answer exchange that incoming fragments fill.
    pub fn ask_question(&mut self, question: &str) -> Result<AskQuestionRequest> {
        self.require_phase(Phase::Active, "active")?;
        if self.resolution_required {
            return Err(StoryArcadeError::TurnBudgetExhausted {
                max: self.turn_budget.unwrap_or(self.turns_taken),
            });
        }
        if self.transcript.is_streaming() {
            return Err(StoryArcadeError::SubmissionOutstanding);
        }
        let session_id = self.require_remote_id()?;
        let question = self.validate_input(question)?;
        self.turns_taken += 1;
        self.check_budget();
        self.transcript.begin_exchange(question.clone());
        Ok(AskQuestionRequest {
            session_id,
            question,
        })
    }

    /// Send a chat message. The first message activates the session.
    pub fn send_chat(&mut self, message: &str) -> Result<ChatRequest> {
        if !matches!(self.phase, Phase::Setup | Phase::Active) {
            return Err(StoryArcadeError::WrongPhase { expected: "active" });
        }
        if self.transcript.is_streaming() {
            return Err(StoryArcadeError::SubmissionOutstanding);
        }
        let message = self.validate_input(message)?;
        let history = self
            .transcript
            .entries()
            .iter()
            .filter_map(|entry| match entry {
                TranscriptEntry::Turn { speaker, text, .. } => {
                    Some(crate::protocol::ChatHistoryItem {
                        role: if speaker == AI_SPEAKER {
                            "assistant".into()
                        } else {
                            "user".into()
                        },
                        content: text.clone(),
                    })
                }
                TranscriptEntry::Exchange { .. } => None,
            })
            .collect();
        self.phase = Phase::Active;
        self.transcript.push_complete(TranscriptEntry::Turn {
            speaker: self.local_speaker(),
            text: message.clone(),
            timestamp: now_millis(),
        });
        self.transcript.begin_turn(AI_SPEAKER);
        Ok(ChatRequest {
            message,
            history,
            model: self.config.model.clone(),
        })
    }

    /// Accuse a suspect. Available in `Active`, including the
    /// resolution-required sub-mode.
    pub fn accuse(&mut self, accused_name: &str, reasoning: &str) -> Result<MakeAccusationRequest> {
        self.require_phase(Phase::Active, "active")?;
        let accused = accused_name.trim();
        let reasoning = reasoning.trim();
        if accused.is_empty() || reasoning.is_empty() {
            return Err(StoryArcadeError::EmptySubmission);
        }
        let session_id = self.require_remote_id()?;
        Ok(MakeAccusationRequest {
            session_id,
            accused_name: accused.to_string(),
            reasoning: reasoning.to_string(),
        })
    }

    /// Discard this session and return to a fresh `Setup` with a new local
    /// identifier and an empty transcript. Mode and configuration persist.
    pub fn restart(&mut self) {
        *self = Session::with_rules(self.mode, self.config.clone(), self.rules);
    }

    // ── Event reduction ─────────────────────────────────────────────

    /// Apply one decoded event. The single transition pathway for all
    /// server-originated activity, including errors.
    pub fn apply(&mut self, event: GameEvent) {
        match event {
            GameEvent::Connected => {
                debug!(session = %self.local_id, "transport connected");
            }
            GameEvent::SessionAck { snapshot } => {
                self.absorb_snapshot(snapshot);
                if self.phase == Phase::Connecting {
                    self.phase = if self.rules.multi_participant {
                        Phase::Waiting
                    } else {
                        Phase::Active
                    };
                    if self.phase == Phase::Active {
                        self.arm_countdown();
                    }
                }
            }
            GameEvent::ActivityBegan { snapshot } => {
                self.absorb_snapshot(snapshot);
                if matches!(self.phase, Phase::Connecting | Phase::Waiting) {
                    self.phase = Phase::Active;
                    self.arm_countdown();
                }
            }
            GameEvent::Snapshot { snapshot } => {
                self.absorb_snapshot(snapshot);
            }
            GameEvent::Fragment { content } => {
                if self.phase == Phase::Connecting {
                    // Start streams deliver content before their completion
                    // marker; the session is playable as soon as text flows.
                    self.phase = Phase::Active;
                    self.arm_countdown();
                }
                if self.phase == Phase::Active {
                    self.transcript.append(&content);
                } else {
                    debug!(phase = %self.phase, "dropping fragment outside active phase");
                }
            }
            GameEvent::Completed { meta } => {
                self.transcript.finalize();
                if self.phase == Phase::Connecting {
                    self.phase = Phase::Active;
                    self.arm_countdown();
                }
                self.absorb_completion(meta);
            }
            GameEvent::Judgment(result) => {
                self.resolve(result);
            }
            GameEvent::ServerError { message } => {
                self.fail_soft(message);
            }
            GameEvent::Disconnected { reason } => {
                if self.phase.is_terminal() {
                    return;
                }
                let message =
                    reason.unwrap_or_else(|| "connection closed".to_string());
                self.fail_soft(message);
            }
        }
    }

    /// Absorb a non-streamed case payload: the session becomes active and
    /// adopts the server's identifiers and question budget.
    pub fn apply_case(&mut self, case: &CaseData) {
        if matches!(self.phase, Phase::Connecting | Phase::Setup) {
            self.phase = Phase::Active;
            self.arm_countdown();
        }
        self.remote_id = Some(case.session_id.clone());
        self.turn_budget = Some(case.max_questions);
        self.resolution_required = false;
    }

    /// Advance the countdown by one wall-clock second.
    ///
    /// Only ticks while the session is in a phase that owns the timer
    /// (`Active`, or `Waiting` for per-turn countdown variants). Under
    /// [`TimeoutPolicy::FailOnExpiry`] the zero-crossing tick forces the
    /// session into `Failed` — exactly at that tick, never earlier.
    pub fn tick(&mut self) {
        let ticking_phase = matches!(self.phase, Phase::Active)
            || (self.rules.turn_seconds.is_some() && self.phase == Phase::Waiting);
        if !ticking_phase {
            return;
        }
        // Per-turn countdowns only run while it is the local turn.
        if self.rules.turn_seconds.is_some() && !self.my_turn {
            return;
        }
        let Some(countdown) = self.countdown.as_mut() else {
            return;
        };
        if countdown.tick() == TickOutcome::Expired {
            warn!(session = %self.local_id, "countdown expired");
            self.phase = Phase::Failed;
            if self.rules.scored && self.outcome.is_none() {
                self.outcome = Some(SessionOutcome {
                    correct: false,
                    explanation: String::new(),
                    culprit: None,
                    clue_bonus: 0,
                    time_bonus: 0,
                    total_score: 0,
                });
            }
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    fn absorb_snapshot(&mut self, snapshot: RoomSnapshot) {
        if let Some(room_id) = snapshot.room_id {
            self.remote_id = Some(room_id);
        }
        // Participant set and turn pointer are server-authoritative:
        // total-replace whenever a room payload was pushed, never merge.
        // An empty roster replaces too; it means the room emptied out.
        if let Some(room) = snapshot.room {
            self.participants = room
                .players
                .into_iter()
                .map(|(id, info)| Participant {
                    id,
                    name: info.name,
                    is_host: info.is_host,
                    is_online: info.is_online,
                })
                .collect();
            let turn_changed = room.current_turn != self.current_turn;
            self.current_turn = room.current_turn;
            self.recompute_turn_ownership();
            if turn_changed && self.my_turn {
                // Fresh turn, fresh clock.
                if let Some(seconds) = self.rules.turn_seconds {
                    self.countdown = Some(Countdown::new(seconds, self.rules.timeout_policy));
                }
            }
        }
        if let Some(story) = snapshot.story {
            self.transcript.replace_all(story);
        }
    }

    fn absorb_completion(&mut self, meta: CompletionMeta) {
        if let Some(session_id) = meta.session_id {
            self.remote_id = Some(session_id);
        }
        if let Some(count) = meta.question_count {
            self.turns_taken = count;
        }
        if let Some(max) = meta.max_questions {
            self.turn_budget = Some(max);
        }
        self.check_budget();
    }

    fn resolve(&mut self, result: AccusationResult) {
        self.transcript.finalize();
        self.phase = if result.correct {
            Phase::Succeeded
        } else {
            Phase::Failed
        };
        let (time_bonus, total_score) = if self.rules.scored {
            let remaining = self.remaining_seconds().unwrap_or(0);
            let base = if result.correct {
                limits::BASE_SOLVE_POINTS
            } else {
                0
            };
            let time_bonus = remaining * limits::TIME_BONUS_PER_SECOND;
            let clue_bonus = result.clue_bonus.unwrap_or(0);
            (time_bonus, base + time_bonus + clue_bonus)
        } else {
            (0, 0)
        };
        self.outcome = Some(SessionOutcome {
            correct: result.correct,
            explanation: result.explanation,
            culprit: result.culprit,
            clue_bonus: result.clue_bonus.unwrap_or(0),
            time_bonus,
            total_score,
        });
    }

    /// Non-fatal failure handling: before activity begins the session drops
    /// back to `Setup`; mid-session the error is surfaced inline and
    /// already-received transcript text is retained.
    fn fail_soft(&mut self, message: String) {
        warn!(session = %self.local_id, error = %message, "server-reported error");
        self.transcript.finalize();
        self.last_error = Some(message);
        if matches!(self.phase, Phase::Connecting | Phase::Waiting | Phase::Setup) {
            self.phase = Phase::Setup;
        }
    }

    fn recompute_turn_ownership(&mut self) {
        self.my_turn = match (&self.current_turn, &self.local_participant) {
            (Some(turn), Some(local)) => turn == local,
            _ => false,
        };
    }

    fn check_budget(&mut self) {
        if let Some(max) = self.turn_budget {
            if self.turns_taken >= max {
                self.resolution_required = true;
            }
        }
    }

    fn arm_countdown(&mut self) {
        if self.countdown.is_some() {
            return;
        }
        if let Some(limit) = self.rules.time_limit {
            self.countdown = Some(Countdown::new(limit, self.rules.timeout_policy));
        } else if let Some(seconds) = self.rules.turn_seconds {
            self.countdown = Some(Countdown::new(seconds, self.rules.timeout_policy));
        }
    }

    fn require_phase(&self, phase: Phase, name: &'static str) -> Result<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(StoryArcadeError::WrongPhase { expected: name })
        }
    }

    fn require_remote_id(&self) -> Result<String> {
        self.remote_id
            .clone()
            .ok_or(StoryArcadeError::WrongPhase { expected: "active" })
    }

    fn validate_input(&self, text: &str) -> Result<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(StoryArcadeError::EmptySubmission);
        }
        let len = trimmed.chars().count();
        if len > self.rules.input_max_chars {
            return Err(StoryArcadeError::SubmissionTooLong {
                len,
                max: self.rules.input_max_chars,
            });
        }
        Ok(trimmed.to_string())
    }

    fn local_speaker(&self) -> String {
        self.local_participant
            .as_ref()
            .and_then(|id| {
                self.participants
                    .iter()
                    .find(|p| &p.id == id)
                    .map(|p| p.name.clone())
            })
            .unwrap_or_else(|| "player".to_string())
    }
}

/// How a story-adventure turn is advanced.
#[derive(Debug, Clone)]
pub enum StoryAction {
    /// Index of one of the presented choices.
    Choice(u32),
    /// Free-text action typed by the player.
    Custom(String),
}

fn new_player_id() -> String {
    format!("player-{}", Uuid::new_v4().simple())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::{PlayerInfo, RoomInfo};
    use std::collections::BTreeMap;

    fn fragment(content: &str) -> GameEvent {
        GameEvent::Fragment {
            content: content.into(),
        }
    }

    fn completed() -> GameEvent {
        GameEvent::Completed {
            meta: CompletionMeta::default(),
        }
    }

    fn snapshot_with_turn(players: &[(&str, &str, bool)], turn: Option<&str>) -> GameEvent {
        let mut map = BTreeMap::new();
        for (id, name, is_host) in players {
            map.insert(
                id.to_string(),
                PlayerInfo {
                    name: name.to_string(),
                    is_host: *is_host,
                    is_online: true,
                },
            );
        }
        GameEvent::Snapshot {
            snapshot: RoomSnapshot {
                room_id: None,
                room: Some(RoomInfo {
                    room_id: None,
                    players: map,
                    current_turn: turn.map(String::from),
                    game_settings: None,
                }),
                story: None,
            },
        }
    }

    #[test]
    fn fragments_concatenate_in_arrival_order() {
        let mut session = Session::new(GameMode::StoryAdventure, SessionConfig::default());
        session.start_story().unwrap();
        session.apply(fragment("Once"));
        session.apply(fragment(" upon"));
        session.apply(fragment(" a time"));
        session.apply(completed());
        assert_eq!(session.phase(), Phase::Active);
        assert_eq!(session.transcript().entries()[0].text(), "Once upon a time");
        assert!(!session.transcript().is_streaming());
    }

    #[test]
    fn start_story_requires_setup_phase() {
        let mut session = Session::new(GameMode::StoryAdventure, SessionConfig::default());
        session.start_story().unwrap();
        assert!(matches!(
            session.start_story(),
            Err(StoryArcadeError::WrongPhase { .. })
        ));
    }

    #[test]
    fn completion_captures_session_id() {
        let mut session = Session::new(GameMode::StoryAdventure, SessionConfig::default());
        session.start_story().unwrap();
        session.apply(fragment("text"));
        session.apply(GameEvent::Completed {
            meta: CompletionMeta {
                session_id: Some("sess-9".into()),
                ..CompletionMeta::default()
            },
        });
        assert_eq!(session.session_id(), Some("sess-9"));
    }

    #[test]
    fn turn_ownership_follows_snapshot_only() {
        let mut session = Session::new(GameMode::CooperativeStory, SessionConfig::default());
        session.create_room("Alice").unwrap();
        let local = session.local_participant().unwrap().to_string();

        // Turn pointer names someone else.
        session.apply(snapshot_with_turn(
            &[(&local, "Alice", true), ("player-b", "Bob", false)],
            Some("player-b"),
        ));
        assert!(!session.is_my_turn());

        // Turn pointer names the local participant.
        session.apply(snapshot_with_turn(
            &[(&local, "Alice", true), ("player-b", "Bob", false)],
            Some(&local),
        ));
        assert!(session.is_my_turn());
    }

    #[test]
    fn submit_turn_rejected_when_not_my_turn() {
        let mut session = Session::new(GameMode::CooperativeStory, SessionConfig::default());
        session.create_room("Alice").unwrap();
        let local = session.local_participant().unwrap().to_string();
        session.apply(GameEvent::SessionAck {
            snapshot: RoomSnapshot::default(),
        });
        session.apply(GameEvent::ActivityBegan {
            snapshot: RoomSnapshot::default(),
        });
        session.apply(snapshot_with_turn(
            &[(&local, "Alice", true), ("player-b", "Bob", false)],
            Some("player-b"),
        ));
        let before = session.transcript().len();
        assert!(matches!(
            session.submit_turn("my contribution"),
            Err(StoryArcadeError::NotYourTurn)
        ));
        assert_eq!(session.transcript().len(), before);
        assert_eq!(session.turns_taken(), 0);
    }

    #[test]
    fn submit_turn_enforces_length_bound() {
        let mut session = Session::new(GameMode::CooperativeStory, SessionConfig::default());
        session.create_room("Alice").unwrap();
        let local = session.local_participant().unwrap().to_string();
        session.apply(GameEvent::ActivityBegan {
            snapshot: RoomSnapshot::default(),
        });
        session.apply(snapshot_with_turn(&[(&local, "Alice", true)], Some(&local)));

        let too_long = "x".repeat(limits::COOP_TURN_MAX_CHARS + 1);
        assert!(matches!(
            session.submit_turn(&too_long),
            Err(StoryArcadeError::SubmissionTooLong { .. })
        ));
        assert!(matches!(
            session.submit_turn("   "),
            Err(StoryArcadeError::EmptySubmission)
        ));
        assert!(session.submit_turn("Then the dragon woke.").is_ok());
    }

    #[test]
    fn restart_allocates_fresh_identity_and_empty_transcript() {
        let mut session = Session::new(GameMode::StoryAdventure, SessionConfig::default());
        session.start_story().unwrap();
        session.apply(fragment("hello"));
        session.apply(completed());
        let old_id = session.local_id();

        session.restart();
        assert_ne!(session.local_id(), old_id);
        assert_eq!(session.phase(), Phase::Setup);
        assert!(session.transcript().is_empty());
        assert!(session.session_id().is_none());
    }

    #[test]
    fn question_budget_forces_resolution_submode() {
        let mut session = Session::new(GameMode::MysteryDetective, SessionConfig::default());
        session.create_case().unwrap();
        session.apply_case(&CaseData {
            session_id: "case-1".into(),
            case_title: "The Missing Manuscript".into(),
            location: "library".into(),
            victim: "archivist".into(),
            suspects: vec![],
            max_questions: 2,
            difficulty: "easy".into(),
        });

        session.ask_question("Where were you?").unwrap();
        session.apply(fragment("In the atrium."));
        session.apply(completed());
        session.ask_question("Who saw you?").unwrap();
        session.apply(fragment("No one."));
        session.apply(completed());

        assert!(session.resolution_required());
        assert!(matches!(
            session.ask_question("One more?"),
            Err(StoryArcadeError::TurnBudgetExhausted { .. })
        ));
        // The terminal-judgment command is still available.
        assert!(session.accuse("Prof. Hale", "The torn page").is_ok());
        assert_eq!(session.phase(), Phase::Active);
    }

    #[test]
    fn judgment_resolves_phase_and_keeps_transcript() {
        let mut session = Session::new(GameMode::MysteryDetective, SessionConfig::default());
        session.create_case().unwrap();
        session.apply_case(&CaseData {
            session_id: "case-2".into(),
            case_title: "t".into(),
            location: String::new(),
            victim: String::new(),
            suspects: vec![],
            max_questions: 8,
            difficulty: String::new(),
        });
        session.ask_question("Anything odd?").unwrap();
        session.apply(fragment("A broken clock."));
        session.apply(completed());
        let transcript_len = session.transcript().len();

        session.apply(GameEvent::Judgment(AccusationResult {
            correct: false,
            explanation: "The butler had an alibi.".into(),
            culprit: None,
            clue_bonus: None,
        }));
        assert_eq!(session.phase(), Phase::Failed);
        assert_eq!(session.transcript().len(), transcript_len);
        assert_eq!(
            session.outcome().unwrap().explanation,
            "The butler had an alibi."
        );
    }

    #[test]
    fn time_attack_scores_judgment() {
        let mut session = Session::new(GameMode::TimeAttackMystery, SessionConfig::default());
        session.create_case().unwrap();
        session.apply_case(&CaseData {
            session_id: "case-3".into(),
            case_title: "t".into(),
            location: String::new(),
            victim: String::new(),
            suspects: vec![],
            max_questions: 8,
            difficulty: String::new(),
        });
        // Burn 5 seconds off the clock.
        for _ in 0..5 {
            session.tick();
        }
        let remaining = session.remaining_seconds().unwrap();

        session.apply(GameEvent::Judgment(AccusationResult {
            correct: true,
            explanation: "Well reasoned.".into(),
            culprit: Some("Dr. Voss".into()),
            clue_bonus: Some(50),
        }));
        let outcome = session.outcome().unwrap();
        assert_eq!(session.phase(), Phase::Succeeded);
        assert_eq!(outcome.time_bonus, remaining * limits::TIME_BONUS_PER_SECOND);
        assert_eq!(
            outcome.total_score,
            limits::BASE_SOLVE_POINTS + outcome.time_bonus + 50
        );
    }

    #[test]
    fn timer_expiry_fails_timed_variant_exactly_at_zero() {
        let config = SessionConfig::default();
        let mut rules = SessionRules::for_mode(GameMode::TimeAttackMystery);
        rules.time_limit = Some(3);
        let mut session = Session::with_rules(GameMode::TimeAttackMystery, config, rules);
        session.create_case().unwrap();
        session.apply_case(&CaseData {
            session_id: "case-4".into(),
            case_title: "t".into(),
            location: String::new(),
            victim: String::new(),
            suspects: vec![],
            max_questions: 8,
            difficulty: String::new(),
        });

        session.tick();
        assert_eq!(session.phase(), Phase::Active);
        session.tick();
        assert_eq!(session.phase(), Phase::Active);
        session.tick();
        assert_eq!(session.phase(), Phase::Failed);
    }

    #[test]
    fn setup_error_returns_to_setup() {
        let mut session = Session::new(GameMode::CooperativeStory, SessionConfig::default());
        session.join_room("Bob", "NOPE42").unwrap();
        assert_eq!(session.phase(), Phase::Connecting);
        session.apply(GameEvent::ServerError {
            message: "room not found".into(),
        });
        assert_eq!(session.phase(), Phase::Setup);
        assert_eq!(session.last_error(), Some("room not found"));
    }

    #[test]
    fn mid_session_error_retains_transcript() {
        let mut session = Session::new(GameMode::StoryAdventure, SessionConfig::default());
        session.start_story().unwrap();
        session.apply(fragment("The bridge was"));
        session.apply(GameEvent::ServerError {
            message: "stream reset".into(),
        });
        assert_eq!(session.phase(), Phase::Active);
        assert_eq!(session.transcript().entries()[0].text(), "The bridge was");
        assert_eq!(session.last_error(), Some("stream reset"));
        assert!(!session.transcript().is_streaming());
    }

    #[test]
    fn start_game_gated_on_host_and_waiting() {
        let mut session = Session::new(GameMode::CooperativeStory, SessionConfig::default());
        session.create_room("Alice").unwrap();
        let local = session.local_participant().unwrap().to_string();
        assert!(matches!(
            session.start_game(),
            Err(StoryArcadeError::WrongPhase { .. })
        ));

        session.apply(GameEvent::SessionAck {
            snapshot: RoomSnapshot::default(),
        });
        assert_eq!(session.phase(), Phase::Waiting);
        session.apply(snapshot_with_turn(&[(&local, "Alice", true)], None));
        assert!(session.start_game().is_ok());
    }

    #[test]
    fn snapshot_total_replaces_participants_and_story() {
        let mut session = Session::new(GameMode::CooperativeStory, SessionConfig::default());
        session.create_room("Alice").unwrap();
        let local = session.local_participant().unwrap().to_string();
        session.apply(snapshot_with_turn(
            &[(&local, "Alice", true), ("player-b", "Bob", false)],
            None,
        ));
        assert_eq!(session.participants().len(), 2);

        // Bob leaves; the new snapshot is authoritative.
        session.apply(snapshot_with_turn(&[(&local, "Alice", true)], None));
        assert_eq!(session.participants().len(), 1);

        let story = vec![
            StoryTurn {
                player: "Alice".into(),
                text: "The gate creaked open.".into(),
                timestamp: 1,
            },
            StoryTurn {
                player: AI_SPEAKER.into(),
                text: "Beyond it, fog.".into(),
                timestamp: 2,
            },
        ];
        session.apply(GameEvent::Snapshot {
            snapshot: RoomSnapshot {
                room_id: None,
                room: None,
                story: Some(story),
            },
        });
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(session.transcript().entries()[1].text(), "Beyond it, fog.");
    }

    #[test]
    fn empty_roster_snapshot_replaces_participants() {
        let mut session = Session::new(GameMode::CooperativeStory, SessionConfig::default());
        session.create_room("Alice").unwrap();
        let local = session.local_participant().unwrap().to_string();
        session.apply(snapshot_with_turn(
            &[(&local, "Alice", true), ("player-b", "Bob", false)],
            Some(&local),
        ));
        assert_eq!(session.participants().len(), 2);
        assert!(session.is_my_turn());

        // Everyone left; the pushed roster is empty, not absent.
        session.apply(snapshot_with_turn(&[], None));
        assert!(session.participants().is_empty());
        assert!(session.current_turn().is_none());
        assert!(!session.is_my_turn());
    }

    #[test]
    fn chat_first_message_activates_and_builds_history() {
        let mut session = Session::new(GameMode::Chat, SessionConfig::default());
        let request = session.send_chat("Hello there").unwrap();
        assert!(request.history.is_empty());
        assert_eq!(session.phase(), Phase::Active);
        session.apply(fragment("Hi! How can I help?"));
        session.apply(completed());

        let request = session.send_chat("Tell me a joke").unwrap();
        assert_eq!(request.history.len(), 2);
        assert_eq!(request.history[0].role, "user");
        assert_eq!(request.history[1].role, "assistant");
    }

    #[test]
    fn chat_rejects_while_stream_outstanding() {
        let mut session = Session::new(GameMode::Chat, SessionConfig::default());
        session.send_chat("First").unwrap();
        assert!(matches!(
            session.send_chat("Second"),
            Err(StoryArcadeError::SubmissionOutstanding)
        ));
    }
}
