//! Player snake entity and its mutation rules

use uuid::Uuid;

use super::grid::{Board, Direction, Position};

/// Colours handed out round-robin as players spawn
pub const PLAYER_COLORS: [u32; 15] = [
    0xff7444, 0xfff8de, 0xb7bdf7, 0x576a8f, 0xddaed3, 0x6f8f72, 0x9e3b3b, 0x574964, 0xe5ba41,
    0xd2dcb6, 0xfd7979, 0x6fa4af, 0x604652, 0xffdab3, 0x559e83,
];

/// Who a player is, independent of any round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerIdentity {
    pub account_id: Uuid,
    pub username: String,
    pub channel_id: Uuid,
}

/// Authoritative per-player state
#[derive(Debug, Clone)]
pub struct PlayerSnake {
    pub identity: PlayerIdentity,
    /// Head first
    pub snake: Vec<Position>,
    pub direction: Direction,
    pub next_direction: Option<Direction>,
    pub color: u32,
    pub alive: bool,
    pub score: u32,
    pub food_eaten: u32,
    pub kills: u32,
    pub growth_pending: u32,
    pub invincible: bool,
    pub invincibility_ends_at: Option<u64>,
    pub last_activity_at: u64,
}

/// Everything a killer takes from its victim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spoils {
    pub score: u32,
    pub food_eaten: u32,
}

impl PlayerSnake {
    pub fn spawn(
        identity: PlayerIdentity,
        body: Vec<Position>,
        color: u32,
        now_ms: u64,
        grace_ms: u64,
    ) -> Self {
        Self {
            identity,
            snake: body,
            direction: Direction::Right,
            next_direction: None,
            color,
            alive: true,
            score: 0,
            food_eaten: 0,
            kills: 0,
            growth_pending: 0,
            invincible: true,
            invincibility_ends_at: Some(now_ms + grace_ms),
            last_activity_at: now_ms,
        }
    }

    pub fn account_id(&self) -> Uuid {
        self.identity.account_id
    }

    pub fn head(&self) -> Option<Position> {
        self.snake.first().copied()
    }

    /// Buffer a heading for the next tick. Reversing the current heading is
    /// ignored; returns whether the input was accepted.
    pub fn queue_direction(&mut self, direction: Direction, now_ms: u64) -> bool {
        if direction == self.direction.opposite() {
            return false;
        }
        self.next_direction = Some(direction);
        self.last_activity_at = now_ms;
        true
    }

    /// Commit the buffered heading and return the cell the head moves into
    pub fn next_head(&mut self, board: &Board) -> Option<Position> {
        if let Some(next) = self.next_direction.take() {
            self.direction = next;
        }
        self.head().map(|head| board.wrap(head, self.direction))
    }

    /// Drop the grace window once its deadline has passed
    pub fn expire_invincibility(&mut self, now_ms: u64) -> bool {
        match self.invincibility_ends_at {
            Some(ends_at) if self.invincible && now_ms >= ends_at => {
                self.invincible = false;
                self.invincibility_ends_at = None;
                true
            }
            _ => false,
        }
    }

    /// Move onto `new_head`. Growth pending is consumed instead of dropping
    /// the tail.
    pub fn advance(&mut self, new_head: Position, ate_food: bool) {
        self.snake.insert(0, new_head);
        if ate_food {
            self.food_eaten += 1;
            self.score += 1;
            self.growth_pending += 1;
        }
        if self.growth_pending > 0 {
            self.growth_pending -= 1;
        } else {
            self.snake.pop();
        }
    }

    pub fn die(&mut self) -> Spoils {
        self.alive = false;
        Spoils {
            score: self.score,
            food_eaten: self.food_eaten,
        }
    }

    /// Give up score and food to a killer
    pub fn surrender(&mut self) {
        self.score = 0;
        self.food_eaten = 0;
    }

    /// Absorb a victim's score and food; the food also becomes growth.
    pub fn claim_kill(&mut self, spoils: Spoils) {
        self.kills += 1;
        self.score += spoils.score;
        self.food_eaten += spoils.food_eaten;
        self.growth_pending += spoils.food_eaten;
    }

    pub fn is_idle(&self, now_ms: u64, timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_activity_at) > timeout_ms
    }
}
