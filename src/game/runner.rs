//! Round actor: owns the round state and drives its timers

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::GameConfig;
use crate::gateway::{self, Gateway};
use crate::util::time::RoundClock;

use super::round::{RoundCommand, RoundState, RoundSummary};
use super::schedule::TimerKind;

/// Inbound command queue depth
pub const COMMAND_BUFFER: usize = 256;

/// The round actor has shut down
#[derive(Debug, thiserror::Error)]
#[error("round actor is not running")]
pub struct RoundClosed;

/// Handle to the running round
#[derive(Clone)]
pub struct RoundHandle {
    command_tx: mpsc::Sender<RoundCommand>,
    summary_rx: watch::Receiver<RoundSummary>,
}

impl RoundHandle {
    pub async fn submit(&self, command: RoundCommand) -> Result<(), RoundClosed> {
        self.command_tx.send(command).await.map_err(|_| RoundClosed)
    }

    /// Latest published counts
    pub fn summary(&self) -> RoundSummary {
        *self.summary_rx.borrow()
    }
}

/// A live tokio interval mirroring one schedule slot
#[derive(Default)]
struct ArmedTimer {
    generation: u64,
    interval: Option<Interval>,
}

enum RoundEvent {
    Command(Option<RoundCommand>),
    Timer(TimerKind),
}

/// The authoritative round
pub struct GameRound<G: Gateway> {
    state: RoundState,
    command_rx: mpsc::Receiver<RoundCommand>,
    gateway: Arc<G>,
    clock: RoundClock,
    /// Indexed like `TimerKind::ALL`
    timers: [ArmedTimer; 5],
    summary_tx: watch::Sender<RoundSummary>,
}

impl<G: Gateway> GameRound<G> {
    pub fn new(config: GameConfig, seed: u64, gateway: Arc<G>) -> (Self, RoundHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let state = RoundState::new(config, seed);
        let (summary_tx, summary_rx) = watch::channel(state.summary());

        let round = Self {
            state,
            command_rx,
            gateway,
            clock: RoundClock::new(),
            timers: Default::default(),
            summary_tx,
        };
        let handle = RoundHandle {
            command_tx,
            summary_rx,
        };

        (round, handle)
    }

    /// Run until every handle is dropped
    pub async fn run(mut self) {
        info!("Round actor started");

        loop {
            let event = {
                let [simulation, speed_ramp, lobby, cooldown_tick, cooldown_end] = &mut self.timers;
                tokio::select! {
                    command = self.command_rx.recv() => RoundEvent::Command(command),
                    _ = next_tick(simulation) => RoundEvent::Timer(TimerKind::Simulation),
                    _ = next_tick(speed_ramp) => RoundEvent::Timer(TimerKind::SpeedRamp),
                    _ = next_tick(lobby) => RoundEvent::Timer(TimerKind::Lobby),
                    _ = next_tick(cooldown_tick) => RoundEvent::Timer(TimerKind::CooldownBroadcast),
                    _ = next_tick(cooldown_end) => RoundEvent::Timer(TimerKind::CooldownEnd),
                }
            };

            let now_ms = self.clock.now_ms();
            match event {
                RoundEvent::Command(Some(command)) => self.state.handle(command, now_ms),
                RoundEvent::Command(None) => break,
                RoundEvent::Timer(kind) => self.state.fire(kind, now_ms),
            }

            self.reconcile_timers();
            gateway::dispatch(self.gateway.as_ref(), self.state.drain_effects());
            self.summary_tx.send_replace(self.state.summary());
        }

        info!("Round actor stopped");
    }

    /// Rebuild every interval whose slot moved since we last looked
    fn reconcile_timers(&mut self) {
        for (idx, kind) in TimerKind::ALL.into_iter().enumerate() {
            let slot = self.state.schedule().slot(kind);
            let armed = &mut self.timers[idx];
            if armed.generation == slot.generation {
                continue;
            }

            armed.generation = slot.generation;
            armed.interval = slot.period.map(|period| {
                let mut interval = interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                interval
            });
            debug!(timer = ?kind, period = ?slot.period, "Timer rearmed");
        }
    }
}

async fn next_tick(timer: &mut ArmedTimer) {
    match timer.interval.as_mut() {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::game::grid::Direction;
    use crate::game::snake::PlayerIdentity;
    use crate::gateway::testing::{Recorded, RecordingGateway};
    use crate::ws::protocol::{RoundStatus, ServerMsg};

    fn identity(name: &str) -> PlayerIdentity {
        PlayerIdentity {
            account_id: Uuid::new_v4(),
            username: name.to_string(),
            channel_id: Uuid::new_v4(),
        }
    }

    fn spawn_round() -> (RoundHandle, Arc<RecordingGateway>) {
        let gateway = Arc::new(RecordingGateway::default());
        let (round, handle) = GameRound::new(GameConfig::default(), 99, gateway.clone());
        tokio::spawn(round.run());
        (handle, gateway)
    }

    #[tokio::test(start_paused = true)]
    async fn lobby_countdown_starts_the_round() {
        let (handle, gateway) = spawn_round();
        let alice = identity("alice");
        let bob = identity("bob");

        tokio_test::assert_ok!(handle.submit(RoundCommand::Join(alice.clone())).await);
        tokio_test::assert_ok!(handle.submit(RoundCommand::Join(bob.clone())).await);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(handle.summary().status, RoundStatus::Waiting);
        assert_eq!(handle.summary().active_players, 2);

        tokio::time::sleep(Duration::from_millis(15_000)).await;
        assert_eq!(handle.summary().status, RoundStatus::Playing);

        let to_bob = gateway.sent_to(bob.channel_id);
        assert!(to_bob
            .iter()
            .any(|m| matches!(m, ServerMsg::GameStarting { .. })));
        let ticks_before = to_bob
            .iter()
            .filter(|m| matches!(m, ServerMsg::GameState(v) if v.status == RoundStatus::Playing))
            .count();

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        let ticks_after = gateway
            .sent_to(bob.channel_id)
            .iter()
            .filter(|m| matches!(m, ServerMsg::GameState(v) if v.status == RoundStatus::Playing))
            .count();
        assert!(ticks_after - ticks_before >= 9, "only {} ticks", ticks_after - ticks_before);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_player_round_runs_to_cooldown() {
        let (handle, gateway) = spawn_round();
        let alice = identity("alice");

        tokio_test::assert_ok!(handle.submit(RoundCommand::Join(alice.clone())).await);
        tokio::time::sleep(Duration::from_millis(15_500)).await;
        assert_eq!(handle.summary().status, RoundStatus::Playing);

        // One input keeps the player around past the first ramp step
        tokio_test::assert_ok!(
            handle
                .submit(RoundCommand::ChangeDirection {
                    account_id: alice.account_id,
                    direction: Direction::Right,
                })
                .await
        );
        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert!(gateway.sent_to(alice.channel_id).iter().any(|m| matches!(
            m,
            ServerMsg::SpeedChanged {
                speed_level: 2,
                tick_rate: 95,
                ..
            }
        )));

        // No further input: evicted once the inactivity window passes
        tokio::time::sleep(Duration::from_millis(21_000)).await;
        assert_eq!(gateway.disconnects(), vec![alice.channel_id]);
        assert_eq!(handle.summary().status, RoundStatus::Finished);
        assert_eq!(handle.summary().active_players, 0);

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(handle.summary().status, RoundStatus::Waiting);
        assert_eq!(gateway.disconnects().len(), 1);
        assert!(gateway
            .calls()
            .iter()
            .all(|c| !matches!(c, Recorded::Rewarded { .. })));
    }
}
