//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;
use crate::ws::protocol::RoundStatus;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins(&state.config.client_origin))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// `*` allows any origin, otherwise a comma-separated list
fn allowed_origins(client_origin: &str) -> AllowOrigin {
    if client_origin.trim() == "*" {
        return AllowOrigin::from(Any);
    }

    let origins: Vec<HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();
    AllowOrigin::list(origins)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    connected_sessions: usize,
    round_status: RoundStatus,
    active_players: usize,
    waiting_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let summary = state.round.summary();

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        connected_sessions: state.sessions.len(),
        round_status: summary.status,
        active_players: summary.active_players,
        waiting_players: summary.waiting_players,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{Config, GameConfig};
    use crate::game::GameRound;
    use crate::gateway::testing::RecordingGateway;
    use crate::gateway::SessionRegistry;

    fn test_state() -> AppState {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".to_string(),
            session_jwt_secret: "s3cret".to_string(),
            client_origin: "*".to_string(),
            reward_ledger_url: None,
            reward_ledger_key: None,
            game: GameConfig::default(),
        };
        let gateway = Arc::new(RecordingGateway::default());
        let (round, handle) = GameRound::new(config.game.clone(), 1, gateway);
        tokio::spawn(round.run());
        AppState::new(Arc::new(config), Arc::new(SessionRegistry::new()), handle)
    }

    #[tokio::test]
    async fn health_reports_idle_round() {
        let state = test_state();
        let Json(health) = health_handler(State(state)).await;
        let value = serde_json::to_value(&health).unwrap();

        assert_eq!(value["status"], "ok");
        assert_eq!(value["roundStatus"], "WAITING");
        assert_eq!(value["connectedSessions"], 0);
        assert_eq!(value["activePlayers"], 0);
        assert_eq!(value["waitingPlayers"], 0);
    }
}
