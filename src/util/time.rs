//! Time utilities for the round clock and server uptime

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(std::time::Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Monotonic millisecond clock for the round actor.
///
/// Built on tokio's `Instant` so a paused test runtime drives it together
/// with the round timers.
#[derive(Debug, Clone)]
pub struct RoundClock {
    start: Instant,
}

impl RoundClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Milliseconds since the clock was created
    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for RoundClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole seconds between two millisecond timestamps, rounded down
pub fn whole_secs_between(from_ms: u64, to_ms: u64) -> u64 {
    to_ms.saturating_sub(from_ms) / 1000
}

/// Seconds left until `duration_ms` has passed since `started_ms`, rounded up
pub fn secs_left(started_ms: u64, duration_ms: u64, now_ms: u64) -> u64 {
    let elapsed = now_ms.saturating_sub(started_ms);
    duration_ms.saturating_sub(elapsed).div_ceil(1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secs_left_rounds_up_and_floors_at_zero() {
        assert_eq!(secs_left(0, 15_000, 0), 15);
        assert_eq!(secs_left(0, 15_000, 14_001), 1);
        assert_eq!(secs_left(0, 15_000, 15_000), 0);
        assert_eq!(secs_left(0, 15_000, 20_000), 0);
    }

    #[test]
    fn whole_secs_round_down() {
        assert_eq!(whole_secs_between(1_000, 3_999), 2);
        assert_eq!(whole_secs_between(5_000, 1_000), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn round_clock_follows_paused_time() {
        let clock = RoundClock::new();
        tokio::time::advance(Duration::from_millis(2_500)).await;
        assert_eq!(clock.now_ms(), 2_500);
    }
}
