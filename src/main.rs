//! Snake Royale Server - authoritative multiplayer snake battle royale
//!
//! This is the main entry point for the game server. It handles:
//! - WebSocket sessions for real-time gameplay
//! - The single shared round, its lobby, timers and cooldown
//! - Reward grants posted to the ledger when a round ends

mod app;
mod config;
mod game;
mod gateway;
mod http;
mod rewards;
mod util;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::game::GameRound;
use crate::gateway::{LiveGateway, SessionRegistry};
use crate::http::build_router;
use crate::rewards::RewardLedger;
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Arc::new(Config::from_env()?);

    init_tracing(&config.log_level);
    init_server_time();

    info!("Starting Snake Royale Server");
    info!("Server address: {}", config.server_addr);

    let ledger = RewardLedger::from_config(&config);
    if ledger.is_none() {
        warn!("REWARD_LEDGER_URL not set, rewards will only be logged");
    }

    let sessions = Arc::new(SessionRegistry::new());
    let gateway = Arc::new(LiveGateway::new(sessions.clone(), ledger));

    let seed: u64 = rand::random();
    info!(
        seed,
        board_width = config.game.board_width,
        board_height = config.game.board_height,
        "Spawning round actor"
    );
    let (round, round_handle) = GameRound::new(config.game.clone(), seed, gateway);
    tokio::spawn(round.run());

    let state = AppState::new(config.clone(), sessions, round_handle);
    let router = build_router(state);

    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
