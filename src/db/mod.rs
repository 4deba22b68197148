pub mod client;
pub mod memory;
pub mod postgres;
pub mod store;

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::DatabaseConfig;

pub use client::DBClient;
pub use memory::MemoryStore;
pub use postgres::PgLedgerStore;
pub use store::LedgerStore;

/// PostgreSQL when a database URL is configured, otherwise an in-memory ledger.
pub async fn connect_store(config: &DatabaseConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match config.url() {
        Some(url) => {
            let client = DBClient::new(config, &url).await?;
            info!("Running database migrations");
            client.run_migrations().await?;
            Ok(Arc::new(PgLedgerStore::new(client.pool)))
        }
        None => {
            warn!("DATABASE_URL not set, ledger state is kept in memory and lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
