//! Round state machine: roster, lifecycle and per-tick simulation.
//!
//! `RoundState` is owned by exactly one task. Every handler runs to
//! completion, takes the current time as an argument and reports its side
//! effects as [`Effect`]s instead of talking to the network.

use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::util::time::whole_secs_between;
use crate::ws::protocol::{FinishedWinner, RoundStatus, ServerMsg};

use super::grid::{Board, Direction, Occupancy, Position};
use super::schedule::{Schedule, TimerKind};
use super::snake::{PlayerIdentity, PlayerSnake, PLAYER_COLORS};
use super::snapshot::SnapshotBuilder;

/// Lobby and cooldown re-broadcast period
pub const COUNTDOWN_PERIOD: Duration = Duration::from_secs(1);

/// Inbound events, already validated by the session layer
#[derive(Debug, Clone)]
pub enum RoundCommand {
    Join(PlayerIdentity),
    Leave { account_id: Uuid },
    ChangeDirection { account_id: Uuid, direction: Direction },
}

/// Side effects produced by a handler, executed by the gateway
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Deliver `msg` to each channel independently
    Broadcast { recipients: Vec<Uuid>, msg: ServerMsg },
    Disconnect { channel_id: Uuid, reason: String },
    GrantReward {
        channel_id: Uuid,
        account_id: Uuid,
        amount: u32,
        reason: String,
    },
}

/// Frozen copy of the winner taken when the round ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Winner {
    pub account_id: Uuid,
    pub username: String,
    pub score: u32,
    pub kills: u32,
    pub food_eaten: u32,
    pub color: u32,
}

impl From<&PlayerSnake> for Winner {
    fn from(player: &PlayerSnake) -> Self {
        Self {
            account_id: player.identity.account_id,
            username: player.identity.username.clone(),
            score: player.score,
            kills: player.kills,
            food_eaten: player.food_eaten,
            color: player.color,
        }
    }
}

/// Counts published for health checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundSummary {
    pub status: RoundStatus,
    pub active_players: usize,
    pub waiting_players: usize,
}

pub struct RoundState {
    pub(crate) config: GameConfig,
    pub(crate) board: Board,
    rng: ChaCha8Rng,
    pub(crate) status: RoundStatus,
    /// Players in the current (or next) round, in join order
    pub(crate) roster: Vec<PlayerSnake>,
    /// Players queued while a round is running
    pub(crate) waiting: Vec<PlayerSnake>,
    pub(crate) food: Vec<Position>,
    pub(crate) current_tick_rate: u64,
    pub(crate) speed_level: u32,
    pub(crate) started_at: u64,
    pub(crate) lobby_started_at: u64,
    pub(crate) finished_at: u64,
    pub(crate) cooldown_active: bool,
    pub(crate) winner: Option<Winner>,
    pub(crate) final_game_secs: u64,
    next_color: usize,
    schedule: Schedule,
    effects: Vec<Effect>,
}

impl RoundState {
    pub fn new(config: GameConfig, seed: u64) -> Self {
        let board = Board::new(config.board_width, config.board_height);
        let current_tick_rate = config.base_tick_rate_ms;
        Self {
            config,
            board,
            rng: ChaCha8Rng::seed_from_u64(seed),
            status: RoundStatus::Waiting,
            roster: Vec::new(),
            waiting: Vec::new(),
            food: Vec::new(),
            current_tick_rate,
            speed_level: 1,
            started_at: 0,
            lobby_started_at: 0,
            finished_at: 0,
            cooldown_active: false,
            winner: None,
            final_game_secs: 0,
            next_color: 0,
            schedule: Schedule::new(),
            effects: Vec::new(),
        }
    }

    pub fn status(&self) -> RoundStatus {
        self.status
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn summary(&self) -> RoundSummary {
        RoundSummary {
            status: self.status,
            active_players: self.roster.len(),
            waiting_players: self.waiting.len(),
        }
    }

    /// Take everything produced since the last drain
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Apply one inbound command
    pub fn handle(&mut self, command: RoundCommand, now_ms: u64) {
        match command {
            RoundCommand::Join(identity) => self.join(identity, now_ms),
            RoundCommand::Leave { account_id } => self.leave(account_id, now_ms),
            RoundCommand::ChangeDirection {
                account_id,
                direction,
            } => self.change_direction(account_id, direction, now_ms),
        }
    }

    /// React to a timer firing
    pub fn fire(&mut self, kind: TimerKind, now_ms: u64) {
        match kind {
            TimerKind::Simulation => self.on_simulation_tick(now_ms),
            TimerKind::SpeedRamp => self.on_speed_ramp(now_ms),
            TimerKind::Lobby => self.on_lobby_tick(now_ms),
            TimerKind::CooldownBroadcast => self.on_cooldown_tick(now_ms),
            TimerKind::CooldownEnd => self.on_cooldown_end(now_ms),
        }
    }

    // ------------------------------------------------------------------
    // Roster
    // ------------------------------------------------------------------

    fn is_tracked(&self, account_id: Uuid) -> bool {
        self.roster.iter().any(|p| p.account_id() == account_id)
            || self.waiting.iter().any(|p| p.account_id() == account_id)
    }

    pub fn join(&mut self, identity: PlayerIdentity, now_ms: u64) {
        if self.is_tracked(identity.account_id) {
            debug!(account_id = %identity.account_id, "Duplicate join ignored");
            return;
        }

        match self.status {
            RoundStatus::Playing => return self.queue_for_next_round(identity, now_ms),
            RoundStatus::Finished if self.cooldown_active => {
                return self.queue_for_next_round(identity, now_ms)
            }
            RoundStatus::Finished => {
                warn!("Join observed a lapsed cooldown, reopening lobby");
                self.roster.clear();
                self.reopen_lobby();
            }
            RoundStatus::Waiting => {}
        }

        let player = self.spawn_player(identity, now_ms);
        let (account_id, username) = (player.account_id(), player.identity.username.clone());
        self.roster.push(player);

        if !self.schedule.is_running(TimerKind::Lobby) {
            self.lobby_started_at = now_ms;
            self.schedule.start(TimerKind::Lobby, COUNTDOWN_PERIOD);
            info!(account_id = %account_id, "Lobby countdown started");
        }

        info!(
            account_id = %account_id,
            active_players = self.roster.len(),
            "Player joined lobby"
        );

        self.broadcast(ServerMsg::PlayerJoined {
            account_id,
            username,
            waiting: false,
        });
        self.broadcast_state(now_ms);
    }

    fn queue_for_next_round(&mut self, identity: PlayerIdentity, now_ms: u64) {
        let player = self.spawn_player(identity, now_ms);
        let (account_id, username) = (player.account_id(), player.identity.username.clone());
        self.waiting.push(player);

        info!(
            account_id = %account_id,
            waiting_players = self.waiting.len(),
            "Player queued for next round"
        );

        self.broadcast(ServerMsg::PlayerJoined {
            account_id,
            username,
            waiting: true,
        });
        self.broadcast_state(now_ms);
    }

    pub fn leave(&mut self, account_id: Uuid, now_ms: u64) {
        if let Some(idx) = self.roster.iter().position(|p| p.account_id() == account_id) {
            let player = self.roster.remove(idx);

            if self.roster.is_empty() && self.status == RoundStatus::Waiting {
                self.schedule.stop(TimerKind::Lobby);
                self.food.clear();
                info!("Lobby empty, countdown cancelled");
            }
            if self.status == RoundStatus::Playing {
                self.adjust_food();
            }

            info!(account_id = %account_id, "Player left round");
            self.broadcast(ServerMsg::PlayerLeft {
                account_id,
                username: player.identity.username,
            });

            self.check_round_end(now_ms);
        } else if let Some(idx) = self.waiting.iter().position(|p| p.account_id() == account_id) {
            let player = self.waiting.remove(idx);
            info!(account_id = %account_id, "Queued player left");
            self.broadcast(ServerMsg::PlayerLeft {
                account_id,
                username: player.identity.username,
            });
        }
    }

    pub fn change_direction(&mut self, account_id: Uuid, direction: Direction, now_ms: u64) {
        let Some(player) = self
            .roster
            .iter_mut()
            .find(|p| p.account_id() == account_id && p.alive)
        else {
            return;
        };

        if !player.queue_direction(direction, now_ms) {
            debug!(account_id = %account_id, ?direction, "Reversal ignored");
        }
    }

    // ------------------------------------------------------------------
    // Placement
    // ------------------------------------------------------------------

    fn spawn_player(&mut self, identity: PlayerIdentity, now_ms: u64) -> PlayerSnake {
        let occupancy = Occupancy::new(self.roster.iter().map(|p| p.snake.as_slice()), &self.food);
        let plan = occupancy.plan_spawn(
            &self.board,
            &mut self.rng,
            self.config.initial_snake_length,
            self.config.spawn_min_distance,
            self.config.spawn_attempts,
        );

        if plan.degraded {
            warn!(
                account_id = %identity.account_id,
                attempts = self.config.spawn_attempts,
                "No safe spawn found, placing at random"
            );
        }

        let color = PLAYER_COLORS[self.next_color % PLAYER_COLORS.len()];
        self.next_color += 1;

        PlayerSnake::spawn(identity, plan.body, color, now_ms, self.config.spawn_grace_ms)
    }

    fn random_free_position(&mut self) -> Position {
        let occupancy = Occupancy::new(self.roster.iter().map(|p| p.snake.as_slice()), &self.food);
        occupancy.random_free_position(&self.board, &mut self.rng, self.config.free_cell_attempts)
    }

    fn target_food_count(&self) -> usize {
        self.config.base_food_count + self.roster.len() * self.config.food_per_player
    }

    fn generate_food(&mut self) {
        self.food.clear();
        for _ in 0..self.target_food_count() {
            let pos = self.random_free_position();
            self.food.push(pos);
        }
    }

    fn adjust_food(&mut self) {
        let target = self.target_food_count();
        while self.food.len() < target {
            let pos = self.random_free_position();
            self.food.push(pos);
        }
        self.food.truncate(target);
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    fn on_lobby_tick(&mut self, now_ms: u64) {
        if self.status != RoundStatus::Waiting || self.roster.is_empty() {
            self.schedule.stop(TimerKind::Lobby);
            return;
        }

        if now_ms.saturating_sub(self.lobby_started_at) >= self.config.lobby_duration_ms {
            self.start_round(now_ms);
        } else {
            self.broadcast_state(now_ms);
        }
    }

    fn start_round(&mut self, now_ms: u64) {
        self.schedule.stop(TimerKind::Lobby);
        self.status = RoundStatus::Playing;
        self.started_at = now_ms;
        self.winner = None;
        self.final_game_secs = 0;
        self.finished_at = 0;
        self.current_tick_rate = self.config.base_tick_rate_ms;
        self.speed_level = 1;

        // Clear every body first so fresh spawns only avoid each other
        let identities: Vec<PlayerIdentity> =
            self.roster.drain(..).map(|p| p.identity).collect();
        for identity in identities {
            let player = self.spawn_player(identity, now_ms);
            self.roster.push(player);
        }
        self.generate_food();

        self.schedule.stop(TimerKind::Simulation);
        self.schedule
            .start(TimerKind::Simulation, self.config.tick_period());
        self.schedule.start(
            TimerKind::SpeedRamp,
            Duration::from_millis(self.config.speed_increase_interval_ms),
        );

        info!(
            players = self.roster.len(),
            food = self.food.len(),
            tick_rate = self.current_tick_rate,
            "Round started"
        );

        self.broadcast(ServerMsg::GameStarting {
            message: "Game is starting!".to_string(),
        });
        self.broadcast_state(now_ms);
    }

    fn check_round_end(&mut self, now_ms: u64) {
        if self.status != RoundStatus::Playing {
            return;
        }

        let total = self.roster.len();
        let alive: Vec<usize> = (0..total).filter(|&i| self.roster[i].alive).collect();

        if alive.is_empty() {
            return self.finish(None, now_ms);
        }
        if total >= 2 && alive.len() == 1 {
            return self.finish(Some(alive[0]), now_ms);
        }

        if now_ms.saturating_sub(self.started_at) >= self.config.round_time_limit_ms {
            let leader = self.leader();
            self.finish(leader, now_ms);
        }
    }

    /// Highest score, then most kills; earlier joiners win exact ties
    fn leader(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (idx, player) in self.roster.iter().enumerate() {
            best = match best {
                None => Some(idx),
                Some(current) => {
                    let leader = &self.roster[current];
                    if (player.score, player.kills) > (leader.score, leader.kills) {
                        Some(idx)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        best
    }

    fn finish(&mut self, winner_idx: Option<usize>, now_ms: u64) {
        self.status = RoundStatus::Finished;
        self.cooldown_active = true;
        self.finished_at = now_ms;
        self.final_game_secs = whole_secs_between(self.started_at, now_ms);
        self.winner = winner_idx.map(|idx| Winner::from(&self.roster[idx]));

        self.schedule.stop(TimerKind::Simulation);
        self.schedule.stop(TimerKind::SpeedRamp);

        for player in &self.roster {
            if player.score > 0 {
                self.effects.push(Effect::GrantReward {
                    channel_id: player.identity.channel_id,
                    account_id: player.account_id(),
                    amount: player.score,
                    reason: format!("Snake game: {} credits", player.score),
                });
            }
        }

        if let Some(idx) = winner_idx {
            let winner = &self.roster[idx];
            let bonus = (winner.score as f64 * self.config.winner_bonus).floor() as u32;
            if bonus > 0 {
                self.effects.push(Effect::GrantReward {
                    channel_id: winner.identity.channel_id,
                    account_id: winner.account_id(),
                    amount: bonus,
                    reason: format!("Snake game winner bonus: {} credits", bonus),
                });
            }
        }

        info!(
            winner = ?self.winner.as_ref().map(|w| w.account_id),
            duration_secs = self.final_game_secs,
            players = self.roster.len(),
            "Round finished"
        );

        let winner = self.winner.as_ref().map(|w| FinishedWinner {
            account_id: w.account_id,
            username: w.username.clone(),
            score: w.score,
            kills: w.kills,
            food_eaten: w.food_eaten,
        });
        self.broadcast(ServerMsg::GameFinished { winner });

        self.roster.append(&mut self.waiting);

        self.schedule.start(TimerKind::CooldownBroadcast, COUNTDOWN_PERIOD);
        self.schedule.start(
            TimerKind::CooldownEnd,
            Duration::from_millis(self.config.cooldown_ms),
        );

        self.broadcast_state(now_ms);
    }

    fn on_cooldown_tick(&mut self, now_ms: u64) {
        if self.status != RoundStatus::Finished {
            self.schedule.stop(TimerKind::CooldownBroadcast);
            return;
        }
        self.broadcast_state(now_ms);
    }

    fn on_cooldown_end(&mut self, now_ms: u64) {
        self.schedule.stop(TimerKind::CooldownEnd);
        self.schedule.stop(TimerKind::CooldownBroadcast);
        if self.status != RoundStatus::Finished {
            return;
        }

        self.reopen_lobby();

        if self.roster.is_empty() {
            info!("Cooldown over, lobby idle until next join");
            return;
        }

        self.lobby_started_at = now_ms;
        self.schedule.start(TimerKind::Lobby, COUNTDOWN_PERIOD);
        info!(players = self.roster.len(), "Cooldown over, lobby open");
        self.broadcast_state(now_ms);
    }

    /// Back to WAITING with every round-scoped field cleared. Anyone queued
    /// during the cooldown becomes active.
    fn reopen_lobby(&mut self) {
        self.roster.append(&mut self.waiting);
        self.status = RoundStatus::Waiting;
        self.cooldown_active = false;
        self.winner = None;
        self.final_game_secs = 0;
        self.finished_at = 0;
        self.food.clear();
        self.speed_level = 1;
        self.current_tick_rate = self.config.base_tick_rate_ms;
        self.schedule.stop(TimerKind::CooldownBroadcast);
        self.schedule.stop(TimerKind::CooldownEnd);
    }

    // ------------------------------------------------------------------
    // Simulation
    // ------------------------------------------------------------------

    fn on_simulation_tick(&mut self, now_ms: u64) {
        if self.status != RoundStatus::Playing {
            self.schedule.stop(TimerKind::Simulation);
            return;
        }

        for player in &mut self.roster {
            if player.expire_invincibility(now_ms) {
                debug!(account_id = %player.account_id(), "Grace window over");
            }
        }

        for idx in 0..self.roster.len() {
            if self.roster[idx].alive {
                self.move_player(idx);
            }
        }

        self.evict_idle(now_ms);
        self.check_round_end(now_ms);
        self.broadcast_state(now_ms);
    }

    fn move_player(&mut self, idx: usize) {
        let Some(new_head) = self.roster[idx].next_head(&self.board) else {
            return;
        };

        if !self.roster[idx].invincible {
            let hit = self.roster.iter().position(|p| p.snake.contains(&new_head));
            if let Some(other) = hit {
                let spoils = self.roster[idx].die();
                if other != idx && self.roster[other].alive {
                    self.roster[idx].surrender();
                    self.roster[other].claim_kill(spoils);
                    debug!(
                        killer = %self.roster[other].account_id(),
                        victim = %self.roster[idx].account_id(),
                        "Kill"
                    );
                }

                let victim = &self.roster[idx];
                let msg = ServerMsg::PlayerDied {
                    account_id: victim.account_id(),
                    username: victim.identity.username.clone(),
                };
                self.broadcast(msg);
                return;
            }
        }

        let food_idx = self.food.iter().position(|f| *f == new_head);
        self.roster[idx].advance(new_head, food_idx.is_some());
        if let Some(food_idx) = food_idx {
            self.food[food_idx] = self.random_free_position();
        }
    }

    fn evict_idle(&mut self, now_ms: u64) {
        if self.status != RoundStatus::Playing {
            return;
        }

        let timeout = self.config.inactivity_timeout_ms;
        let idle: Vec<(Uuid, Uuid, u64)> = self
            .roster
            .iter()
            .filter(|p| p.alive && p.is_idle(now_ms, timeout))
            .map(|p| {
                (
                    p.account_id(),
                    p.identity.channel_id,
                    now_ms.saturating_sub(p.last_activity_at) / 1000,
                )
            })
            .collect();

        for (account_id, channel_id, idle_secs) in idle {
            info!(account_id = %account_id, idle_secs, "Kicking inactive player");
            self.effects.push(Effect::Disconnect {
                channel_id,
                reason: "Inactivity timeout".to_string(),
            });
            self.leave(account_id, now_ms);
        }
    }

    fn on_speed_ramp(&mut self, now_ms: u64) {
        if self.status != RoundStatus::Playing {
            self.schedule.stop(TimerKind::SpeedRamp);
            return;
        }

        let Some(next) = self
            .current_tick_rate
            .checked_sub(self.config.speed_step_ms)
            .filter(|rate| *rate >= self.config.min_tick_rate_ms)
        else {
            return;
        };

        self.current_tick_rate = next;
        self.speed_level += 1;
        self.schedule
            .reschedule(TimerKind::Simulation, Duration::from_millis(next));

        info!(
            speed_level = self.speed_level,
            tick_rate = next,
            "Speed increased"
        );

        self.broadcast(ServerMsg::SpeedChanged {
            speed_level: self.speed_level,
            tick_rate: next,
            game_time_seconds: whole_secs_between(self.started_at, now_ms),
        });
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    /// Channels of everyone currently tracked, active first
    fn participants(&self) -> Vec<Uuid> {
        self.roster
            .iter()
            .chain(self.waiting.iter())
            .map(|p| p.identity.channel_id)
            .collect()
    }

    fn broadcast(&mut self, msg: ServerMsg) {
        let recipients = self.participants();
        if recipients.is_empty() {
            return;
        }
        self.effects.push(Effect::Broadcast { recipients, msg });
    }

    fn broadcast_state(&mut self, now_ms: u64) {
        let view = SnapshotBuilder::build(self, now_ms);
        self.broadcast(ServerMsg::GameState(view));
    }
}
