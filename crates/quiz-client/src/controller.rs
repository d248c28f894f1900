//! Session facade: the single externally-visible handle for one quiz
//! session.
//!
//! [`SessionController`] owns exactly one [`Connection`], one
//! [`SessionState`], the countdown timer, and the answer slot, and is
//! the only place any of them is mutated. Frontends call the verbs,
//! pump events with [`recv`](SessionController::recv) /
//! [`try_recv`](SessionController::try_recv), and drive timers with
//! [`tick`](SessionController::tick) — typically from one
//! `tokio::select!` loop.
//!
//! Ownership rule: construct one controller per game view and pass it
//! by reference to every consumer. The constructing owner calls
//! [`close`](SessionController::close) on teardown; observers never do.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use quiz_core::answer::{AnswerSlot, AnswerTrigger, RetryOutcome, RetryPolicy};
use quiz_core::protocol::{ClientMessage, QuestionSpec};
use quiz_core::session::{
    ActiveQuestion, ConnectionStatus, Phase, SessionEvent, SessionState, StateChanged,
};
use quiz_core::timer::Countdown;

use crate::connection::{ConnEvent, Connection, ReconnectPolicy};
use crate::ws_transport::WsConnector;

/// Environment variable naming the quiz server endpoint.
pub const SERVER_URL_ENV: &str = "QUIZ_SERVER_URL";

/// Facade-level errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no server endpoint configured (set {SERVER_URL_ENV})")]
    MissingEndpoint,
}

/// What to submit when the question timer expires with nothing selected.
///
/// The choice is deliberately configuration, not a constant: with an
/// elimination format the "free" guess is a game-design decision the
/// host application owns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FallbackAnswer {
    /// Submit the question's first option.
    #[default]
    FirstOption,
    /// Submit a fixed value.
    Fixed(String),
    /// Submit nothing; let the server eliminate us for silence.
    Disabled,
}

impl FallbackAnswer {
    fn resolve(&self, question: Option<&ActiveQuestion>) -> Option<String> {
        match self {
            FallbackAnswer::FirstOption => question.and_then(|q| q.options.first().cloned()),
            FallbackAnswer::Fixed(value) => Some(value.clone()),
            FallbackAnswer::Disabled => None,
        }
    }
}

/// Session tunables. Defaults are the production values.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: String,
    pub reconnect: ReconnectPolicy,
    pub answer_retry: RetryPolicy,
    pub fallback_answer: FallbackAnswer,
}

impl SessionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectPolicy::default(),
            answer_retry: RetryPolicy::default(),
            fallback_answer: FallbackAnswer::default(),
        }
    }

    /// Read the endpoint from `QUIZ_SERVER_URL`.
    pub fn from_env() -> Result<Self, SessionError> {
        std::env::var(SERVER_URL_ENV)
            .map(Self::new)
            .map_err(|_| SessionError::MissingEndpoint)
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_answer_retry(mut self, policy: RetryPolicy) -> Self {
        self.answer_retry = policy;
        self
    }

    pub fn with_fallback_answer(mut self, fallback: FallbackAnswer) -> Self {
        self.fallback_answer = fallback;
        self
    }
}

/// Outcome of pumping one event.
#[derive(Debug)]
pub enum SessionUpdate {
    /// An event was applied; the flags describe what changed.
    Updated(StateChanged),
    /// A malformed frame was dropped (non-fatal, state untouched).
    ProtocolError(String),
    /// No event was available (`try_recv` only).
    Empty,
    /// The connection supervisor has shut down.
    Closed,
}

/// The single handle for one quiz session.
pub struct SessionController {
    conn: Connection,
    state: SessionState,
    countdown: Countdown,
    answer: AnswerSlot,
    config: SessionConfig,
}

impl SessionController {
    /// Open a WebSocket connection to `config.url` and wrap it.
    pub fn connect(config: SessionConfig) -> Self {
        let conn = Connection::open_with(WsConnector::new(&config.url), config.reconnect);
        Self::with_connection(config, conn)
    }

    /// Wrap an already-opened [`Connection`] (alternative transports).
    pub fn with_connection(config: SessionConfig, conn: Connection) -> Self {
        Self {
            conn,
            state: SessionState::new(),
            countdown: Countdown::new(),
            answer: AnswerSlot::new(config.answer_retry),
            config,
        }
    }

    /// The current state snapshot.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Time left on the active countdown (pre-game or question).
    pub fn time_remaining(&self, now: Instant) -> Duration {
        self.countdown.remaining(now)
    }

    /// Display seconds left, rounded up.
    pub fn time_remaining_secs(&self, now: Instant) -> u64 {
        self.countdown.remaining_secs(now)
    }

    // ------------------------------------------------------------------
    // Verbs
    // ------------------------------------------------------------------

    /// Create a room and join it as creator. Inputs are assumed
    /// pre-validated by the frontend (see `quiz_core::protocol`
    /// validators).
    pub fn create_room(&self, player_name: impl Into<String>, entry_fee: f64, max_players: u32) {
        self.conn.send(ClientMessage::CreateRoom {
            player_name: player_name.into(),
            entry_fee,
            max_players,
        });
    }

    /// Join an existing room.
    pub fn join_room(&self, player_name: impl Into<String>, room_id: impl Into<String>) {
        self.conn.send(ClientMessage::JoinRoom {
            player_name: player_name.into(),
            room_id: room_id.into(),
        });
    }

    /// Leave the room. The local reset happens first and always wins
    /// over any in-flight server event; the `LEAVE_ROOM` send is
    /// best-effort.
    pub fn leave_room(&mut self) -> StateChanged {
        self.answer.reset();
        self.countdown.stop();
        let changed = self.state.apply(&SessionEvent::LeaveRoom);
        self.conn.send(ClientMessage::LeaveRoom);
        changed
    }

    /// Ask the server to start the game, optionally injecting a
    /// host-supplied question bank.
    pub fn start_game(&self, questions: Option<Vec<QuestionSpec>>) {
        self.conn.send(ClientMessage::StartGame { questions });
    }

    /// Record the UI's current selection without submitting it. Used by
    /// the time-up path as the preferred fallback value.
    pub fn select_answer(&mut self, value: impl Into<String>) {
        self.state.selected_answer = Some(value.into());
    }

    /// Submit an answer for the current question. Returns `true` if
    /// this proposal was accepted (first for the question) and handed
    /// to the transport; later proposals are dropped regardless of
    /// trigger or value.
    pub fn submit_answer(&mut self, value: impl Into<String>, trigger: AnswerTrigger) -> bool {
        let value = value.into();
        self.state.selected_answer = Some(value.clone());
        self.accept_answer(value, trigger)
    }

    /// Manual reconnect after the automatic attempts gave up. No-op
    /// while connected or connecting.
    pub fn reconnect(&self) {
        self.conn.reconnect();
    }

    /// Dismiss the current transient error.
    pub fn clear_error(&mut self) {
        self.state.error = None;
    }

    /// Tear the session down. Owner-only; observers never call this.
    pub fn close(&self) {
        self.conn.close();
    }

    // ------------------------------------------------------------------
    // Event pump
    // ------------------------------------------------------------------

    /// Await and apply the next connection event.
    pub async fn recv(&mut self) -> SessionUpdate {
        match self.conn.events.recv().await {
            Some(event) => self.apply_conn_event(event, Instant::now()),
            None => self.mark_closed(),
        }
    }

    /// Apply one connection event if available (non-blocking).
    pub fn try_recv(&mut self) -> SessionUpdate {
        use tokio::sync::mpsc::error::TryRecvError;
        match self.conn.events.try_recv() {
            Ok(event) => self.apply_conn_event(event, Instant::now()),
            Err(TryRecvError::Empty) => SessionUpdate::Empty,
            Err(TryRecvError::Disconnected) => self.mark_closed(),
        }
    }

    /// Advance timers and due answer retries. Call periodically (the
    /// CLI uses a 250 ms cadence); correctness does not depend on the
    /// cadence because remaining time derives from the wall clock.
    pub fn tick(&mut self, now: Instant) -> StateChanged {
        let mut changed = StateChanged::default();

        if self.countdown.tick(now) {
            match self.state.phase {
                Phase::Starting => {
                    let c = self.state.apply(&SessionEvent::CountdownElapsed);
                    self.sync_timers(c, now);
                    changed.merge(c);
                }
                Phase::Playing => self.time_up(&mut changed),
                Phase::Lobby | Phase::Finished => {}
            }
        }

        if let Some(value) = self.answer.retry_due(now) {
            debug!("retrying answer send");
            self.conn.send(ClientMessage::PlayerAnswer { answer: value });
        }

        changed
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn apply_conn_event(&mut self, event: ConnEvent, now: Instant) -> SessionUpdate {
        match event {
            ConnEvent::Message(msg) => {
                let changed = self.state.apply(&SessionEvent::Server(msg));
                self.sync_timers(changed, now);
                SessionUpdate::Updated(changed)
            }
            ConnEvent::Status(status) => {
                let changed = self.state.apply(&SessionEvent::ConnectionChanged(status));
                SessionUpdate::Updated(changed)
            }
            ConnEvent::SendFailed(msg) => {
                let mut changed = StateChanged::default();
                match msg {
                    ClientMessage::PlayerAnswer { .. } => {
                        match self.answer.mark_send_failed(now) {
                            Some(RetryOutcome::Scheduled { .. }) => {
                                debug!("answer send failed, retry scheduled");
                            }
                            Some(RetryOutcome::GaveUp) => {
                                self.state.error =
                                    Some("Answer could not be sent".to_string());
                                changed.error = true;
                            }
                            None => {}
                        }
                    }
                    // Heartbeats failing is connectivity noise the
                    // status events already cover.
                    ClientMessage::Ping => {}
                    _ => {
                        self.state.error = Some("Not connected".to_string());
                        changed.error = true;
                    }
                }
                SessionUpdate::Updated(changed)
            }
            ConnEvent::ProtocolError(raw) => SessionUpdate::ProtocolError(raw),
        }
    }

    fn mark_closed(&mut self) -> SessionUpdate {
        self.state
            .apply(&SessionEvent::ConnectionChanged(ConnectionStatus::Disconnected));
        SessionUpdate::Closed
    }

    /// Re-arm or clear the countdown and reset the answer slot based on
    /// what the reducer reported.
    fn sync_timers(&mut self, changed: StateChanged, now: Instant) {
        if changed.question {
            // New question (or question cleared): fresh answer slot.
            self.answer.reset();
        }
        if changed.timer {
            match self.state.phase {
                Phase::Starting => {
                    self.countdown
                        .start(Duration::from_secs(u64::from(self.state.countdown)), now);
                }
                Phase::Playing => match &self.state.question {
                    Some(q) => {
                        self.countdown
                            .start(Duration::from_secs(u64::from(q.time_limit)), now);
                    }
                    // Playing with no question yet (GAME_STARTED with a
                    // zero countdown): nothing to time until the first
                    // NEXT_QUESTION.
                    None => self.countdown.stop(),
                },
                Phase::Lobby | Phase::Finished => self.countdown.stop(),
            }
        }
    }

    /// The question timer expired. If no answer was accepted yet, fall
    /// back to the current selection, else the configured fallback.
    fn time_up(&mut self, changed: &mut StateChanged) {
        changed.timer = true;
        if self.answer.answered() {
            // An accepted value whose retries were all spent gets one
            // last transmission attempt at expiry. Still the same
            // value, so the one-answer-per-question guarantee holds.
            if self.answer.gave_up()
                && let Some(pending) = self.answer.pending()
            {
                let answer = pending.value.clone();
                debug!(%answer, "time up, final attempt for undelivered answer");
                self.conn.send(ClientMessage::PlayerAnswer { answer });
            }
            return;
        }
        let fallback = self
            .state
            .selected_answer
            .clone()
            .or_else(|| self.config.fallback_answer.resolve(self.state.question.as_ref()));
        if let Some(value) = fallback {
            debug!(%value, "time up, submitting fallback answer");
            self.accept_answer(value, AnswerTrigger::TimeUp);
        }
    }

    fn accept_answer(&mut self, value: String, trigger: AnswerTrigger) -> bool {
        match self.answer.propose(value, trigger) {
            Some(accepted) => {
                let accepted = accepted.to_string();
                self.state.sent_answer = Some(accepted.clone());
                self.conn.send(ClientMessage::PlayerAnswer { answer: accepted });
                true
            }
            None => false,
        }
    }
}
