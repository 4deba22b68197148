use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use withdrawal_ledger::api::{create_router, AppState};
use withdrawal_ledger::build_ledger;
use withdrawal_ledger::config::load_config;
use withdrawal_ledger::queue::ReconciliationSweep;
use withdrawal_ledger::telemetry::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // LEDGER_CONFIG overrides the default config.toml; both are optional.
    let config_path = std::env::var("LEDGER_CONFIG")
        .map(PathBuf::from)
        .ok()
        .or_else(|| Some(PathBuf::from("config.toml")).filter(|path| path.exists()));
    let config = load_config(config_path.as_deref())?;

    init_tracing(&config.logging)?;
    info!("Starting withdrawal ledger");

    let ledger = build_ledger(&config).await?;

    let sweep = ReconciliationSweep::new(ledger.clone(), config.reconciliation.clone());
    tokio::spawn(async move {
        info!("Starting reconciliation sweep");
        sweep.run().await;
    });

    let address = config.server.address();
    let state = Arc::new(AppState { ledger, config });
    let app = create_router(state);

    let listener = TcpListener::bind(address.as_str()).await?;
    info!("Listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down withdrawal ledger");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {:?}", e);
    }
}
