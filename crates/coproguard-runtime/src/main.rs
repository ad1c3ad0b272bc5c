//! coproguard host
//!
//! Loads the guard config, wraps the statistics coprocessor in the policy
//! chain, starts it, serves ops endpoints until Ctrl-C, then drains and stops.

use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};

use coproguard_runtime::coprocessor::{guard_error, Coprocessor};
use coproguard_runtime::{app_state, config, router};

const CONFIG_ENV: &str = "COPROGUARD_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "coproguard.yaml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = config::load_from_file(&path)?;
    let listen: SocketAddr = cfg
        .ops
        .listen
        .parse()
        .map_err(|e| format!("ops.listen must be a valid SocketAddr: {e}"))?;

    let state = app_state::AppState::new(cfg)?;
    let observer = state.observer();
    let env = state.environment();

    if let Err(err) = observer.start(env.clone()).await {
        let kind = guard_error(&err).map(|g| g.kind().as_str()).unwrap_or("UNKNOWN");
        tracing::error!(kind, error = %err, "coprocessor start failed");
        return Err(err);
    }

    let app = router::build_router(state.clone());
    tracing::info!(%listen, "coproguard-host starting");
    let listener = tokio::net::TcpListener::bind(listen).await?;

    let drain = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested, draining");
            drain.set_draining();
        })
        .await?;

    if let Err(err) = observer.stop(env).await {
        tracing::warn!(error = %err, "coprocessor stop failed");
    }
    Ok(())
}
