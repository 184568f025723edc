//! Aviator Game Server
//!
//! Binds the HTTP/WebSocket listener, spawns the round loop, and supervises
//! both until shutdown.

use std::future::IntoFuture;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use aviator::network::server::{router, AppState, ServerConfig};
use aviator::{
    spawn_round_loop, BroadcastHub, DeterministicRng, RoundConfig, RoundEngine, RoundSnapshot,
    WagerGateway, WagerLedger, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Aviator Server v{}", VERSION);

    let config = ServerConfig::default();
    let round_config = RoundConfig::default();

    let ledger = Arc::new(WagerLedger::new());
    let (state_tx, state_rx) = watch::channel(RoundSnapshot::initial(&round_config));
    let hub = Arc::new(BroadcastHub::new(state_rx.clone()));
    let gateway = Arc::new(WagerGateway::new(ledger.clone(), state_rx));

    let engine = RoundEngine::new(round_config, DeterministicRng::from_entropy());
    let mut rounds = spawn_round_loop(engine, ledger, hub.clone(), state_tx);

    let app = router(AppState { gateway, hub });
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!("listening on {}", config.bind_addr);

    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            result.context("server error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        _ = rounds.wait() => {
            error!("round loop exited unexpectedly");
        }
    }

    rounds.shutdown().await;
    info!("server stopped");
    Ok(())
}
