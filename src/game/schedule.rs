//! Declarative timer table for the round.
//!
//! The round state only records which timers should be running and at what
//! period. The runner owns the real tokio intervals and rebuilds one whenever
//! its slot's generation moves.

use std::time::Duration;

/// The periodic timers a round can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Movement tick, period = current tick rate
    Simulation,
    /// Lowers the tick rate while playing
    SpeedRamp,
    /// Once per second in the lobby
    Lobby,
    /// Once per second while results are shown
    CooldownBroadcast,
    /// Fires once when the cooldown is over
    CooldownEnd,
}

impl TimerKind {
    pub const ALL: [TimerKind; 5] = [
        TimerKind::Simulation,
        TimerKind::SpeedRamp,
        TimerKind::Lobby,
        TimerKind::CooldownBroadcast,
        TimerKind::CooldownEnd,
    ];

    fn index(self) -> usize {
        match self {
            TimerKind::Simulation => 0,
            TimerKind::SpeedRamp => 1,
            TimerKind::Lobby => 2,
            TimerKind::CooldownBroadcast => 3,
            TimerKind::CooldownEnd => 4,
        }
    }
}

/// Desired state of one timer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerSlot {
    pub period: Option<Duration>,
    pub generation: u64,
}

impl TimerSlot {
    pub fn is_running(&self) -> bool {
        self.period.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Schedule {
    slots: [TimerSlot; 5],
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, kind: TimerKind) -> TimerSlot {
        self.slots[kind.index()]
    }

    pub fn is_running(&self, kind: TimerKind) -> bool {
        self.slot(kind).is_running()
    }

    /// Start `kind` if it is not already running. A running timer keeps its
    /// phase and period.
    pub fn start(&mut self, kind: TimerKind, period: Duration) {
        let slot = &mut self.slots[kind.index()];
        if slot.period.is_none() {
            slot.period = Some(period);
            slot.generation += 1;
        }
    }

    /// Stop `kind`; stopping a stopped timer is a no-op.
    pub fn stop(&mut self, kind: TimerKind) {
        let slot = &mut self.slots[kind.index()];
        if slot.period.take().is_some() {
            slot.generation += 1;
        }
    }

    /// Cancel and re-register `kind` with a new period. Only applies to a
    /// running timer.
    pub fn reschedule(&mut self, kind: TimerKind, period: Duration) {
        let slot = &mut self.slots[kind.index()];
        if slot.period.is_some() {
            slot.period = Some(period);
            slot.generation += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_is_idempotent() {
        let mut schedule = Schedule::new();
        schedule.start(TimerKind::Lobby, Duration::from_secs(1));
        let first = schedule.slot(TimerKind::Lobby);
        schedule.start(TimerKind::Lobby, Duration::from_secs(5));
        assert_eq!(schedule.slot(TimerKind::Lobby), first);
    }

    #[test]
    fn double_stop_is_harmless() {
        let mut schedule = Schedule::new();
        schedule.start(TimerKind::Simulation, Duration::from_millis(100));
        schedule.stop(TimerKind::Simulation);
        let stopped = schedule.slot(TimerKind::Simulation);
        schedule.stop(TimerKind::Simulation);
        assert_eq!(schedule.slot(TimerKind::Simulation), stopped);
        assert!(!stopped.is_running());
    }

    #[test]
    fn reschedule_bumps_generation() {
        let mut schedule = Schedule::new();
        schedule.start(TimerKind::Simulation, Duration::from_millis(100));
        let before = schedule.slot(TimerKind::Simulation).generation;
        schedule.reschedule(TimerKind::Simulation, Duration::from_millis(95));
        let slot = schedule.slot(TimerKind::Simulation);
        assert_eq!(slot.period, Some(Duration::from_millis(95)));
        assert_eq!(slot.generation, before + 1);
    }

    #[test]
    fn reschedule_does_not_start_a_stopped_timer() {
        let mut schedule = Schedule::new();
        schedule.reschedule(TimerKind::Simulation, Duration::from_millis(95));
        assert!(!schedule.is_running(TimerKind::Simulation));
    }
}
