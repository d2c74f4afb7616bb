//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::grid::{Direction, Position};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Client finished loading and wants to play
    Ready,

    /// Heading change for the next tick
    SnakeMove { direction: DirectionPayload },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave the round without closing the socket
    Leave,
}

/// Raw `{x, y}` heading as sent by clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionPayload {
    pub x: i32,
    pub y: i32,
}

impl DirectionPayload {
    /// `None` unless the vector is one of the four unit directions
    pub fn to_direction(self) -> Option<Direction> {
        Direction::from_vector(self.x, self.y)
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMsg {
    /// Sent once after the socket is accepted
    Welcome {
        account_id: Uuid,
        channel_id: Uuid,
        server_time: u64,
    },

    PlayerJoined {
        account_id: Uuid,
        username: String,
        waiting: bool,
    },

    PlayerLeft {
        account_id: Uuid,
        username: String,
    },

    PlayerDied {
        account_id: Uuid,
        username: String,
    },

    /// Lobby countdown elapsed, round is live
    GameStarting { message: String },

    SpeedChanged {
        speed_level: u32,
        tick_rate: u64,
        game_time_seconds: u64,
    },

    GameFinished { winner: Option<FinishedWinner> },

    /// Full state snapshot
    GameState(GameStateView),

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },

    Error { code: String, message: String },
}

/// Round lifecycle as shown to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundStatus {
    Waiting,
    Playing,
    Finished,
}

/// Winner block of `game_finished`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedWinner {
    pub account_id: Uuid,
    pub username: String,
    pub score: u32,
    pub kills: u32,
    pub food_eaten: u32,
}

/// Winner block of the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotWinner {
    pub account_id: Uuid,
    pub username: String,
    pub score: u32,
    pub kills: u32,
    pub color: u32,
}

/// One player in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub account_id: Uuid,
    pub username: String,
    pub snake: Vec<Position>,
    pub color: u32,
    pub alive: bool,
    pub score: u32,
    pub food_eaten: u32,
    pub kills: u32,
    pub invincible: bool,
    /// Queued for the next round
    pub waiting: bool,
}

/// The `game_state` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateView {
    pub players: HashMap<Uuid, PlayerView>,
    pub food: Vec<Position>,
    pub speed_level: u32,
    pub current_tick_rate: u64,
    pub game_time_seconds: u64,
    pub status: RoundStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_time_left: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_over_time_left: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<SnapshotWinner>,
}
