//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// HMAC secret used to verify session tokens at WebSocket upgrade
    pub session_jwt_secret: String,
    /// Allowed client origins for CORS (comma-separated, `*` for any)
    pub client_origin: String,

    /// Reward ledger endpoint; grants are only logged when unset
    pub reward_ledger_url: Option<String>,
    /// API key sent to the reward ledger
    pub reward_ledger_key: Option<String>,

    /// Gameplay tuning
    pub game: GameConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let game = GameConfig::from_env()?;
        game.validate()?;

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            session_jwt_secret: env::var("SESSION_JWT_SECRET")
                .map_err(|_| ConfigError::Missing("SESSION_JWT_SECRET"))?,
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            reward_ledger_url: optional_var("REWARD_LEDGER_URL"),
            reward_ledger_key: optional_var("REWARD_LEDGER_KEY"),

            game,
        })
    }
}

/// Gameplay constants. Durations are kept in milliseconds since the round
/// clock counts milliseconds.
#[derive(Clone, Debug, PartialEq)]
pub struct GameConfig {
    pub board_width: i32,
    pub board_height: i32,
    pub initial_snake_length: usize,

    /// Simulation period at the start of every round
    pub base_tick_rate_ms: u64,
    /// Floor for the speed ramp
    pub min_tick_rate_ms: u64,
    /// How much the period shrinks per ramp step
    pub speed_step_ms: u64,
    pub speed_increase_interval_ms: u64,

    pub lobby_duration_ms: u64,
    pub round_time_limit_ms: u64,
    pub cooldown_ms: u64,
    pub inactivity_timeout_ms: u64,
    pub spawn_grace_ms: u64,

    pub base_food_count: usize,
    pub food_per_player: usize,
    /// Fraction of the winner's score granted again as a bonus
    pub winner_bonus: f64,

    pub spawn_min_distance: u32,
    pub spawn_attempts: u32,
    pub free_cell_attempts: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            board_width: 48,
            board_height: 33,
            initial_snake_length: 3,
            base_tick_rate_ms: 100,
            min_tick_rate_ms: 40,
            speed_step_ms: 5,
            speed_increase_interval_ms: 10_000,
            lobby_duration_ms: 15_000,
            round_time_limit_ms: 300_000,
            cooldown_ms: 10_000,
            inactivity_timeout_ms: 30_000,
            spawn_grace_ms: 3_000,
            base_food_count: 3,
            food_per_player: 1,
            winner_bonus: 0.5,
            spawn_min_distance: 3,
            spawn_attempts: 200,
            free_cell_attempts: 100,
        }
    }
}

impl GameConfig {
    /// Defaults overridden by any `SNAKE_*` variables that are set
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            board_width: env_or("SNAKE_BOARD_WIDTH", d.board_width)?,
            board_height: env_or("SNAKE_BOARD_HEIGHT", d.board_height)?,
            initial_snake_length: env_or("SNAKE_INITIAL_LENGTH", d.initial_snake_length)?,
            base_tick_rate_ms: env_or("SNAKE_TICK_RATE_MS", d.base_tick_rate_ms)?,
            min_tick_rate_ms: env_or("SNAKE_MIN_TICK_RATE_MS", d.min_tick_rate_ms)?,
            speed_step_ms: env_or("SNAKE_SPEED_STEP_MS", d.speed_step_ms)?,
            speed_increase_interval_ms: env_or(
                "SNAKE_SPEED_INTERVAL_MS",
                d.speed_increase_interval_ms,
            )?,
            lobby_duration_ms: env_or("SNAKE_LOBBY_MS", d.lobby_duration_ms)?,
            round_time_limit_ms: env_or("SNAKE_TIME_LIMIT_MS", d.round_time_limit_ms)?,
            cooldown_ms: env_or("SNAKE_COOLDOWN_MS", d.cooldown_ms)?,
            inactivity_timeout_ms: env_or("SNAKE_INACTIVITY_MS", d.inactivity_timeout_ms)?,
            spawn_grace_ms: env_or("SNAKE_SPAWN_GRACE_MS", d.spawn_grace_ms)?,
            base_food_count: env_or("SNAKE_BASE_FOOD", d.base_food_count)?,
            food_per_player: env_or("SNAKE_FOOD_PER_PLAYER", d.food_per_player)?,
            winner_bonus: env_or("SNAKE_WINNER_BONUS", d.winner_bonus)?,
            spawn_min_distance: env_or("SNAKE_SPAWN_MIN_DISTANCE", d.spawn_min_distance)?,
            spawn_attempts: env_or("SNAKE_SPAWN_ATTEMPTS", d.spawn_attempts)?,
            free_cell_attempts: env_or("SNAKE_FREE_CELL_ATTEMPTS", d.free_cell_attempts)?,
        })
    }

    /// Reject combinations the round loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.board_width <= 0 || self.board_height <= 0 {
            return Err(ConfigError::Invalid("board dimensions must be positive"));
        }
        if self.initial_snake_length == 0 {
            return Err(ConfigError::Invalid("initial snake length must be at least 1"));
        }
        if self.initial_snake_length as i32 > self.board_width {
            return Err(ConfigError::Invalid("initial snake must fit the board width"));
        }
        if self.min_tick_rate_ms == 0 {
            return Err(ConfigError::Invalid("minimum tick rate must be positive"));
        }
        if self.min_tick_rate_ms > self.base_tick_rate_ms {
            return Err(ConfigError::Invalid("minimum tick rate exceeds base tick rate"));
        }
        if self.speed_step_ms == 0 {
            return Err(ConfigError::Invalid("speed step must be positive"));
        }
        if self.cooldown_ms == 0 {
            return Err(ConfigError::Invalid("cooldown must be positive"));
        }
        if self.speed_increase_interval_ms == 0 {
            return Err(ConfigError::Invalid("speed increase interval must be positive"));
        }
        if !(0.0..=10.0).contains(&self.winner_bonus) {
            return Err(ConfigError::Invalid("winner bonus out of range"));
        }
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.base_tick_rate_ms)
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional_var(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Unparsable(key))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Could not parse environment variable: {0}")]
    Unparsable(&'static str),

    #[error("Invalid game configuration: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = GameConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.board_width, 48);
        assert_eq!(config.board_height, 33);
        assert_eq!(config.tick_period(), Duration::from_millis(100));
    }

    #[test]
    fn min_tick_rate_above_base_is_rejected() {
        let config = GameConfig {
            min_tick_rate_ms: 150,
            ..GameConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn empty_board_is_rejected() {
        let config = GameConfig {
            board_height: 0,
            ..GameConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_value_reports_the_key() {
        let parsed: Result<u64, _> = parse_value("SNAKE_TICK_RATE_MS", "fast");
        match parsed {
            Err(ConfigError::Unparsable(key)) => assert_eq!(key, "SNAKE_TICK_RATE_MS"),
            other => panic!("unexpected result: {:?}", other),
        }
        let ok: u64 = tokio_test::assert_ok!(parse_value("SNAKE_TICK_RATE_MS", "80"));
        assert_eq!(ok, 80);
    }
}
