//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::RoundHandle;
use crate::gateway::SessionRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionRegistry>,
    pub round: RoundHandle,
}

impl AppState {
    pub fn new(config: Arc<Config>, sessions: Arc<SessionRegistry>, round: RoundHandle) -> Self {
        Self {
            config,
            sessions,
            round,
        }
    }
}
