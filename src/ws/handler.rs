//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::grid::Direction;
use crate::game::snake::PlayerIdentity;
use crate::game::{RoundCommand, RoundHandle};
use crate::gateway::{Outbound, SessionRegistry};
use crate::http::middleware::{extract_bearer_token, verify_jwt, AuthError};
use crate::util::rate_limit::SessionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Close code sent when the server ends a session
const CLOSE_POLICY: u16 = 1008;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Session token; the Authorization header is accepted as well
    pub token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let token = query.token.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(extract_bearer_token)
            .map(str::to_string)
    });

    let claims = match token
        .ok_or(AuthError::MissingToken)
        .and_then(|token| verify_jwt(&token, &state.config.session_jwt_secret))
    {
        Ok(claims) => claims,
        Err(e) => {
            warn!(error = %e, "WebSocket auth failed");
            return e.into_response();
        }
    };

    let identity = PlayerIdentity {
        account_id: claims.sub,
        username: claims.display_name(),
        channel_id: Uuid::new_v4(),
    };
    info!(account_id = %identity.account_id, "WebSocket upgrade for authenticated user");

    ws.on_upgrade(move |socket| handle_socket(socket, identity, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, identity: PlayerIdentity, state: AppState) {
    let channel_id = identity.channel_id;
    let account_id = identity.account_id;
    info!(account_id = %account_id, channel_id = %channel_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        account_id,
        channel_id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(account_id = %account_id, error = %e, "Failed to send welcome");
        return;
    }

    let outbound_rx = state.sessions.register(channel_id, account_id);
    let mut writer_handle = tokio::spawn(run_writer(channel_id, ws_sink, outbound_rx));

    // Either side finishing ends the session
    tokio::select! {
        _ = run_reader(&identity, ws_stream, &state.round, &state.sessions) => {}
        _ = &mut writer_handle => {
            debug!(account_id = %account_id, "Writer finished first");
        }
    }

    // Socket close counts as leave
    let _ = state.round.submit(RoundCommand::Leave { account_id }).await;

    state.sessions.unregister(&channel_id);
    writer_handle.abort();

    info!(account_id = %account_id, channel_id = %channel_id, "WebSocket connection closed");
}

/// Outbound queue -> WebSocket
async fn run_writer(
    channel_id: Uuid,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<Outbound>,
) {
    while let Some(item) = outbound_rx.recv().await {
        match item {
            Outbound::Frame(json) => {
                if let Err(e) = ws_sink.send(Message::Text(json.to_string())).await {
                    debug!(channel_id = %channel_id, error = %e, "WebSocket send failed");
                    break;
                }
            }
            Outbound::Close(reason) => {
                let frame = CloseFrame {
                    code: CLOSE_POLICY,
                    reason: reason.into(),
                };
                let _ = ws_sink.send(Message::Close(Some(frame))).await;
                break;
            }
        }
    }
}

/// WebSocket -> round actor
async fn run_reader(
    identity: &PlayerIdentity,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    round: &RoundHandle,
    sessions: &SessionRegistry,
) {
    let account_id = identity.account_id;
    let rate_limiter = SessionRateLimiter::new();

    while let Some(result) = ws_stream.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(_)) => {
                warn!(account_id = %account_id, "Received binary message, ignoring");
                continue;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => {
                info!(account_id = %account_id, "Client initiated close");
                break;
            }
            Err(e) => {
                debug!(account_id = %account_id, error = %e, "WebSocket error");
                break;
            }
        };

        if !rate_limiter.check_input() {
            warn!(account_id = %account_id, "Rate limited input message");
            continue;
        }

        let client_msg = match serde_json::from_str::<ClientMsg>(&text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(account_id = %account_id, error = %e, "Failed to parse client message");
                continue;
            }
        };

        let command = match client_msg {
            ClientMsg::Ready => RoundCommand::Join(identity.clone()),
            ClientMsg::SnakeMove { direction } => match direction.to_direction() {
                Some(direction) => change_direction(account_id, direction),
                None => {
                    debug!(account_id = %account_id, ?direction, "Invalid direction dropped");
                    continue;
                }
            },
            ClientMsg::Leave => RoundCommand::Leave { account_id },
            ClientMsg::Ping { t } => {
                if let Err(e) = reply(sessions, identity.channel_id, &ServerMsg::Pong { t }) {
                    debug!(account_id = %account_id, error = %e, "Pong not delivered");
                }
                continue;
            }
        };

        if round.submit(command).await.is_err() {
            error!(account_id = %account_id, "Round actor is gone");
            break;
        }
    }
}

fn change_direction(account_id: Uuid, direction: Direction) -> RoundCommand {
    RoundCommand::ChangeDirection {
        account_id,
        direction,
    }
}

/// Session-local reply through the same queue as round traffic
fn reply(
    sessions: &SessionRegistry,
    channel_id: Uuid,
    msg: &ServerMsg,
) -> Result<(), crate::gateway::GatewayError> {
    let json = serde_json::to_string(msg)?;
    sessions.deliver(channel_id, Outbound::Frame(json.into()))
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
