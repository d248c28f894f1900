//! The session state machine.
//!
//! [`SessionState`] is the authoritative local view of one quiz session.
//! All mutation goes through [`SessionState::apply`], a reducer over
//! [`SessionEvent`]s: server messages, local verbs, and timer expiry.
//! The reducer touches no clocks and no I/O, so the transition table can
//! be exercised with synthetic event sequences alone — timers and the
//! transport are driven by the facade in `quiz-client`.

use crate::protocol::{Player, Room, ServerMessage};

/// Coarse-grained lifecycle stage of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Not in a match: no room, or a room still waiting for players.
    #[default]
    Lobby,
    /// Pre-game countdown running.
    Starting,
    /// A match is live.
    Playing,
    /// The match ended; exited only via an explicit leave.
    Finished,
}

/// Connectivity of the underlying transport, mirrored into the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Automatic reconnection in progress (`attempt` is 1-based).
    Reconnecting { attempt: u32 },
    /// Reconnection gave up; manual retry required.
    Failed,
}

/// The question currently posed. Ephemeral: lives from one
/// `NEXT_QUESTION` to the next (or to `GAME_OVER`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveQuestion {
    pub number: u32,
    pub prompt: String,
    pub options: Vec<String>,
    /// Seconds allowed for this question.
    pub time_limit: u32,
    /// Players still alive when the question was posed.
    pub alive_players: u32,
}

/// An elimination notice for the current question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Elimination {
    pub player_id: String,
    pub player_name: String,
    pub question_number: u32,
    pub remaining_players: u32,
}

/// Final results carried by `GAME_OVER`.
#[derive(Debug, Clone, PartialEq)]
pub struct GameResults {
    pub winner: Option<Player>,
    pub final_stats: Vec<Player>,
    pub prize_pool: f64,
}

/// Events the reducer consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A parsed inbound frame, applied in arrival order.
    Server(ServerMessage),
    /// The local pre-game countdown reached zero.
    CountdownElapsed,
    /// The user left the room. Always wins over in-flight server events.
    LeaveRoom,
    /// The connection manager changed state.
    ConnectionChanged(ConnectionStatus),
}

/// Which aspects of the state an event modified.
///
/// The facade inspects these flags to decide what to rearm (timers,
/// answer slot) and frontends use them to decide what to re-render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateChanged {
    pub phase: bool,
    pub room: bool,
    pub question: bool,
    /// The timer must be re-armed or cleared.
    pub timer: bool,
    pub elimination: bool,
    pub error: bool,
    pub connection: bool,
}

impl StateChanged {
    /// Returns `true` if any flag is set.
    pub fn any(self) -> bool {
        self.phase
            || self.room
            || self.question
            || self.timer
            || self.elimination
            || self.error
            || self.connection
    }

    /// Fold another change set into this one.
    pub fn merge(&mut self, other: StateChanged) {
        self.phase |= other.phase;
        self.room |= other.room;
        self.question |= other.question;
        self.timer |= other.timer;
        self.elimination |= other.elimination;
        self.error |= other.error;
        self.connection |= other.connection;
    }
}

/// The local view of the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub phase: Phase,
    pub connection: ConnectionStatus,
    /// Replaced wholesale on each `ROOM_UPDATE`; never field-merged.
    pub room: Option<Room>,
    /// Our identity, as confirmed by the server.
    pub player_id: Option<String>,
    pub question: Option<ActiveQuestion>,
    /// Pre-game countdown length in seconds (meaningful while Starting).
    pub countdown: u32,
    pub elimination: Option<Elimination>,
    pub results: Option<GameResults>,
    /// Transient, user-clearable error message.
    pub error: Option<String>,
    /// Answer the UI currently has selected (not yet necessarily sent).
    pub selected_answer: Option<String>,
    /// Answer value handed to the transport for this question, if any.
    pub sent_answer: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether we are the room's creator.
    pub fn is_creator(&self) -> bool {
        match (&self.room, &self.player_id) {
            (Some(room), Some(id)) => room.creator_id == *id,
            _ => false,
        }
    }

    /// Our own player entry in the current room, if any.
    pub fn our_player(&self) -> Option<&Player> {
        let id = self.player_id.as_deref()?;
        self.room.as_ref()?.players.iter().find(|p| p.id == id)
    }

    /// Apply one event and report what changed.
    pub fn apply(&mut self, event: &SessionEvent) -> StateChanged {
        let mut changed = StateChanged::default();

        match event {
            SessionEvent::Server(msg) => self.apply_server(msg, &mut changed),

            SessionEvent::CountdownElapsed => {
                // Only meaningful while the pre-game countdown runs; a
                // stale expiry after a phase change is ignored.
                if self.phase == Phase::Starting {
                    self.phase = Phase::Playing;
                    self.countdown = 0;
                    changed.phase = true;
                    changed.timer = true;
                }
            }

            SessionEvent::LeaveRoom => {
                // Full reset to lobby; only connectivity survives.
                let connection = self.connection;
                *self = Self { connection, ..Self::default() };
                changed = StateChanged {
                    phase: true,
                    room: true,
                    question: true,
                    timer: true,
                    elimination: true,
                    error: true,
                    connection: false,
                };
            }

            SessionEvent::ConnectionChanged(status) => {
                if self.connection != *status {
                    self.connection = *status;
                    changed.connection = true;
                }
            }
        }

        changed
    }

    fn apply_server(&mut self, msg: &ServerMessage, changed: &mut StateChanged) {
        match msg {
            ServerMessage::RoomUpdate { room, player_id } => {
                if let Some(id) = player_id {
                    self.player_id = Some(id.clone());
                }
                // Room metadata legitimately updates mid-game (prize
                // pool, eliminations propagating into the player list);
                // a snapshot is never a lobby signal, so the phase is
                // left alone. Only an explicit leave, or never having
                // had a room, puts us in the lobby.
                self.room = room.clone();
                changed.room = true;
            }

            ServerMessage::GameStarted { countdown, .. } => {
                if *countdown > 0 {
                    self.phase = Phase::Starting;
                    self.countdown = *countdown;
                } else {
                    self.phase = Phase::Playing;
                    self.countdown = 0;
                }
                self.results = None;
                self.clear_error_on_progress(changed);
                changed.phase = true;
                changed.timer = true;
            }

            ServerMessage::NextQuestion {
                question_number,
                question,
                options,
                time_limit,
                alive_players,
            } => {
                if self.phase == Phase::Finished {
                    return;
                }
                // Arrival of a question always means the match is live,
                // even if GAME_STARTED was missed during a reconnect.
                self.phase = Phase::Playing;
                self.countdown = 0;
                self.question = Some(ActiveQuestion {
                    number: *question_number,
                    prompt: question.clone(),
                    options: options.clone(),
                    time_limit: *time_limit,
                    alive_players: *alive_players,
                });
                self.elimination = None;
                self.selected_answer = None;
                self.sent_answer = None;
                self.clear_error_on_progress(changed);
                changed.phase = true;
                changed.question = true;
                changed.timer = true;
                changed.elimination = true;
            }

            ServerMessage::PlayerEliminated {
                player_id,
                player_name,
                question_number,
                remaining_players,
            } => {
                self.elimination = Some(Elimination {
                    player_id: player_id.clone(),
                    player_name: player_name.clone(),
                    question_number: *question_number,
                    remaining_players: *remaining_players,
                });
                changed.elimination = true;
            }

            ServerMessage::GameOver { winner, final_stats, prize_pool } => {
                self.phase = Phase::Finished;
                self.question = None;
                self.countdown = 0;
                self.results = Some(GameResults {
                    winner: winner.clone(),
                    final_stats: final_stats.clone().unwrap_or_default(),
                    prize_pool: *prize_pool,
                });
                self.clear_error_on_progress(changed);
                changed.phase = true;
                changed.question = true;
                changed.timer = true;
            }

            ServerMessage::Error { message } => {
                self.error = Some(message.clone());
                changed.error = true;
            }

            // Heartbeat replies are consumed by the connection layer;
            // one reaching the reducer is a no-op.
            ServerMessage::Pong => {}
        }
    }

    /// Transient errors clear automatically on the next successful
    /// state-changing event.
    fn clear_error_on_progress(&mut self, changed: &mut StateChanged) {
        if self.error.take().is_some() {
            changed.error = true;
        }
    }
}
