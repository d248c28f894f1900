//! Wire protocol for the quiz server.
//!
//! Every frame is a JSON envelope `{"type": ..., "data": ...}` where
//! `data` is omitted for payload-free messages. The enums below map onto
//! that envelope via serde's adjacent tagging.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a room as reported by the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoomState {
    Waiting,
    Starting,
    Playing,
    Finished,
}

/// A participant in a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub eliminated: bool,
    /// Question number on which the player was eliminated, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eliminated_at: Option<u64>,
    #[serde(default)]
    pub score: u32,
}

/// Server-held room snapshot. Replaced wholesale on every `ROOM_UPDATE`;
/// the client never merges individual fields across snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub creator_id: String,
    /// Insertion order is join order.
    pub players: Vec<Player>,
    pub max_players: u32,
    pub prize_pool: f64,
    pub state: RoomState,
}

/// A question supplied by the host application for `START_GAME`.
///
/// `correct_index` travels to the server only; the client never inspects
/// it (answer validation is server-authoritative).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSpec {
    pub question: String,
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_index: Option<usize>,
    /// Per-question time limit in seconds; the server applies its
    /// default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u32>,
}

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Create a new room and join it as the creator.
    CreateRoom {
        player_name: String,
        entry_fee: f64,
        max_players: u32,
    },

    /// Join an existing room by its 6-character id.
    JoinRoom { player_name: String, room_id: String },

    /// Leave the current room.
    LeaveRoom,

    /// Ask the server to start the game. `questions` optionally injects
    /// a host-supplied question bank; `None` uses the server's own.
    StartGame {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        questions: Option<Vec<QuestionSpec>>,
    },

    /// Submit an answer for the current question.
    PlayerAnswer { answer: String },

    /// Heartbeat probe.
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// Full room snapshot. `room` is absent once the client is no longer
    /// in any room; `player_id` is present on the first update after a
    /// successful create/join and confirms our identity.
    RoomUpdate {
        #[serde(default)]
        room: Option<Room>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<String>,
    },

    /// The game is starting. `countdown` seconds of pre-game countdown
    /// follow; zero means questions begin immediately.
    GameStarted {
        countdown: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_questions: Option<u32>,
    },

    /// A new question was posed.
    NextQuestion {
        question_number: u32,
        question: String,
        options: Vec<String>,
        /// Seconds allowed for this question.
        time_limit: u32,
        /// Players still alive when the question was posed.
        alive_players: u32,
    },

    /// A player answered wrong (or not at all) and is out.
    PlayerEliminated {
        player_id: String,
        player_name: String,
        question_number: u32,
        remaining_players: u32,
    },

    /// The match ended.
    GameOver {
        #[serde(default)]
        winner: Option<Player>,
        #[serde(default)]
        final_stats: Option<Vec<Player>>,
        prize_pool: f64,
    },

    /// Application-level error (room full, not found, ...).
    Error { message: String },

    /// Heartbeat reply.
    Pong,
}

// ---------------------------------------------------------------------------
// Input validation
// ---------------------------------------------------------------------------

/// Room ids are exactly this many alphanumeric characters.
pub const ROOM_ID_LEN: usize = 6;

/// Allowed player name length range (inclusive).
pub const PLAYER_NAME_LEN: std::ops::RangeInclusive<usize> = 2..=20;

/// Allowed entry fee range (inclusive).
pub const ENTRY_FEE_RANGE: std::ops::RangeInclusive<f64> = 0.1..=10.0;

/// Validate a player display name (2–20 characters).
pub fn validate_player_name(name: &str) -> Result<(), String> {
    let len = name.chars().count();
    if !PLAYER_NAME_LEN.contains(&len) {
        return Err(format!(
            "Player name must be {}-{} characters",
            PLAYER_NAME_LEN.start(),
            PLAYER_NAME_LEN.end()
        ));
    }
    Ok(())
}

/// Validate a room entry fee (0.1–10).
pub fn validate_entry_fee(fee: f64) -> Result<(), String> {
    if !fee.is_finite() || !ENTRY_FEE_RANGE.contains(&fee) {
        return Err(format!(
            "Entry fee must be between {} and {}",
            ENTRY_FEE_RANGE.start(),
            ENTRY_FEE_RANGE.end()
        ));
    }
    Ok(())
}

/// Validate a room id (exactly 6 alphanumeric characters).
pub fn validate_room_id(id: &str) -> Result<(), String> {
    if id.len() != ROOM_ID_LEN || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!("Room ID must be exactly {ROOM_ID_LEN} alphanumeric characters"));
    }
    Ok(())
}
