//! Snapshot building for network transmission

use std::collections::HashMap;

use crate::util::time::{secs_left, whole_secs_between};
use crate::ws::protocol::{GameStateView, PlayerView, RoundStatus, SnapshotWinner};

use super::round::RoundState;
use super::schedule::TimerKind;
use super::snake::PlayerSnake;

/// Builds the `game_state` payload from the authoritative round
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Full view of the round at `now_ms`, waiting players included
    pub fn build(round: &RoundState, now_ms: u64) -> GameStateView {
        let mut players = HashMap::with_capacity(round.roster.len() + round.waiting.len());
        for player in &round.roster {
            players.insert(player.account_id(), player_view(player, false));
        }
        for player in &round.waiting {
            players.insert(player.account_id(), player_view(player, true));
        }

        let game_time_seconds = match round.status {
            RoundStatus::Playing => whole_secs_between(round.started_at, now_ms),
            RoundStatus::Finished => round.final_game_secs,
            RoundStatus::Waiting => 0,
        };

        let waiting_time_left = (round.status == RoundStatus::Waiting).then(|| {
            if round.schedule().is_running(TimerKind::Lobby) {
                secs_left(round.lobby_started_at, round.config.lobby_duration_ms, now_ms)
            } else {
                round.config.lobby_duration_ms.div_ceil(1000)
            }
        });

        let game_over_time_left = (round.status == RoundStatus::Finished)
            .then(|| secs_left(round.finished_at, round.config.cooldown_ms, now_ms));

        let winner = round.winner.as_ref().map(|w| SnapshotWinner {
            account_id: w.account_id,
            username: w.username.clone(),
            score: w.score,
            kills: w.kills,
            color: w.color,
        });

        GameStateView {
            players,
            food: round.food.clone(),
            speed_level: round.speed_level,
            current_tick_rate: round.current_tick_rate,
            game_time_seconds,
            status: round.status,
            waiting_time_left,
            game_over_time_left,
            winner,
        }
    }
}

fn player_view(player: &PlayerSnake, waiting: bool) -> PlayerView {
    PlayerView {
        account_id: player.account_id(),
        username: player.identity.username.clone(),
        snake: player.snake.clone(),
        color: player.color,
        alive: player.alive,
        score: player.score,
        food_eaten: player.food_eaten,
        kills: player.kills,
        invincible: player.invincible,
        waiting,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::game::snake::PlayerIdentity;
    use uuid::Uuid;

    fn identity(name: &str) -> PlayerIdentity {
        PlayerIdentity {
            account_id: Uuid::new_v4(),
            username: name.to_string(),
            channel_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn waiting_view_counts_down_the_lobby() {
        let mut round = RoundState::new(GameConfig::default(), 1);
        round.join(identity("alice"), 2_000);

        let view = SnapshotBuilder::build(&round, 3_500);
        assert_eq!(view.status, RoundStatus::Waiting);
        assert_eq!(view.waiting_time_left, Some(14));
        assert_eq!(view.game_over_time_left, None);
        assert_eq!(view.game_time_seconds, 0);
        assert_eq!(view.players.len(), 1);
    }

    #[test]
    fn playing_view_reports_elapsed_time() {
        let mut round = RoundState::new(GameConfig::default(), 1);
        round.join(identity("alice"), 0);
        round.fire(TimerKind::Lobby, 15_000);

        let view = SnapshotBuilder::build(&round, 27_900);
        assert_eq!(view.status, RoundStatus::Playing);
        assert_eq!(view.game_time_seconds, 12);
        assert_eq!(view.waiting_time_left, None);
        assert_eq!(view.food.len(), 4);
        assert!(view.players.values().all(|p| p.invincible && !p.waiting));
    }

    #[test]
    fn finished_view_freezes_time_and_counts_down_cooldown() {
        let mut round = RoundState::new(GameConfig::default(), 1);
        let alice = identity("alice");
        round.join(alice.clone(), 0);
        round.fire(TimerKind::Lobby, 15_000);
        round.leave(alice.account_id, 20_000);
        assert_eq!(round.status(), RoundStatus::Finished);

        let view = SnapshotBuilder::build(&round, 24_500);
        assert_eq!(view.game_time_seconds, 5);
        assert_eq!(view.game_over_time_left, Some(6));
        assert_eq!(view.waiting_time_left, None);
        assert!(view.winner.is_none());
    }
}
