pub mod api;
pub mod config;
pub mod db;
pub mod gateway;
pub mod ledger;
pub mod queue;
pub mod telemetry;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::ledger::WithdrawalLedger;

/// Wires the configured store and gateway into a ledger.
pub async fn build_ledger(config: &AppConfig) -> anyhow::Result<Arc<WithdrawalLedger>> {
    let store = db::connect_store(&config.database).await?;
    let gateway = gateway::from_config(&config.gateway)?;

    Ok(Arc::new(WithdrawalLedger::new(
        store,
        gateway,
        config.withdrawal,
        config.gateway.timeout(),
    )))
}
