//! HTTP and WebSocket Server
//!
//! The outer surface of the crash game: four JSON endpoints for wagering
//! and a push-only WebSocket stream for viewers. Handlers hold no game
//! logic; they translate between HTTP shapes and gateway outcomes, and the
//! viewer loop just forwards whatever the hub hands it.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::gateway::{BetOutcome, CashOutOutcome, WagerGateway};
use crate::network::hub::BroadcastHub;
use crate::network::protocol::{
    BalanceAction, BalanceResponse, CashOutRequest, CashOutResponse, StatusResponse,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listener to.
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Wagering surface.
    pub gateway: Arc<WagerGateway>,
    /// Viewer registry.
    pub hub: Arc<BroadcastHub>,
}

/// Build the router with every route mounted.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/topup_balance", post(top_up))
        .route("/balance/:user_id", get(balance))
        .route("/bet", post(place_bet))
        .route("/cashout", post(cash_out))
        .route("/ws", get(viewer_ws))
        .with_state(state)
}

// =============================================================================
// HTTP HANDLERS
// =============================================================================

async fn top_up(
    State(state): State<AppState>,
    Json(body): Json<BalanceAction>,
) -> Json<StatusResponse> {
    state.gateway.top_up(&body.user_id, body.amount).await;
    info!(user_id = %body.user_id, amount = body.amount, "balance topped up");
    Json(StatusResponse::new("success"))
}

async fn balance(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<BalanceResponse> {
    let balance = state.gateway.query_balance(&user_id).await;
    Json(BalanceResponse { balance })
}

async fn place_bet(
    State(state): State<AppState>,
    Json(body): Json<BalanceAction>,
) -> Json<StatusResponse> {
    let outcome = state.gateway.place_wager(&body.user_id, body.amount).await;
    let status = match outcome {
        BetOutcome::Placed => {
            info!(user_id = %body.user_id, amount = body.amount, "bet placed");
            "bet placed"
        }
        BetOutcome::InsufficientFunds => "insufficient funds",
        BetOutcome::AlreadyOpen => "bet already open",
        BetOutcome::InvalidAmount => "invalid amount",
        BetOutcome::BettingClosed => "betting closed",
    };
    Json(StatusResponse::new(status))
}

async fn cash_out(
    State(state): State<AppState>,
    Json(body): Json<CashOutRequest>,
) -> Json<CashOutResponse> {
    match state.gateway.cash_out(&body.user_id).await {
        CashOutOutcome::CashedOut { win } => {
            info!(user_id = %body.user_id, win, "cashed out");
            Json(CashOutResponse {
                status: "cashed out".to_string(),
                win: Some(win),
            })
        }
        CashOutOutcome::NotRunning => Json(CashOutResponse {
            status: "not running".to_string(),
            win: None,
        }),
    }
}

// =============================================================================
// VIEWER STREAM
// =============================================================================

async fn viewer_ws(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| serve_viewer(socket, state.hub))
}

/// Drive one viewer connection until it closes.
///
/// Frames come off the session channel the hub registered for us; inbound
/// traffic is ignored apart from the close handshake and pings. Every exit
/// path unregisters the session.
async fn serve_viewer(socket: WebSocket, hub: Arc<BroadcastHub>) {
    let (id, mut frames) = hub.register().await;
    info!(%id, "viewer connected");

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    // Hub pruned the session (buffer saturated).
                    debug!(%id, "session channel closed");
                    break;
                };
                let text = match frame.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(%id, error = %e, "failed to encode frame");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(payload))) => {
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {
                        // Push-only stream: application messages are ignored.
                    }
                    Some(Err(e)) => {
                        debug!(%id, error = %e, "viewer socket error");
                        break;
                    }
                }
            }
        }
    }

    hub.unregister(&id).await;
    info!(%id, "viewer disconnected");
}

// =============================================================================
// TESTS
// =============================================================================
