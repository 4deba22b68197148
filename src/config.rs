use anyhow::ensure;
use config::{Config, Environment, File};
use dotenv::dotenv;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::gateway::SandboxMode;
use crate::ledger::WithdrawalLimits;

/// Loads configuration from a given config file or environment variables.
pub fn load_config(config_file_path: Option<&Path>) -> anyhow::Result<AppConfig> {
    // Load .env file if it exists, ignore if not present
    dotenv().ok();

    // e.g. LEDGER__GATEWAY__API_KEY
    build_config(
        config_file_path,
        Environment::with_prefix("LEDGER").separator("__"),
    )
}

fn build_config(
    config_file_path: Option<&Path>,
    environment: Environment,
) -> anyhow::Result<AppConfig> {
    let mut settings = Config::builder();

    if let Some(path) = config_file_path {
        settings = settings.add_source(File::from(path).required(true));
    }

    settings = settings.add_source(environment);

    let app_config = settings.build()?.try_deserialize::<AppConfig>()?;
    app_config.validate()?;

    Ok(app_config)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub withdrawal: WithdrawalLimits,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub internal: InternalConfig,
}

impl AppConfig {
    /// Rejects settings the ledger cannot run safely with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let limits = &self.withdrawal;
        ensure!(
            limits.fee >= Decimal::ZERO,
            "withdrawal.fee must not be negative, got {}",
            limits.fee
        );
        ensure!(
            limits.minimum > Decimal::ZERO,
            "withdrawal.minimum must be positive, got {}",
            limits.minimum
        );
        ensure!(
            limits.minimum <= limits.maximum,
            "withdrawal.minimum ({}) exceeds withdrawal.maximum ({})",
            limits.minimum,
            limits.maximum
        );

        // A payout still inside its gateway call must never look stale to the sweep.
        let stale_after_ms = self.reconciliation.stale_after_sec.saturating_mul(1000);
        ensure!(
            stale_after_ms > self.gateway.timeout_ms,
            "reconciliation.stale_after_sec ({}s) must exceed gateway.timeout_ms ({}ms)",
            self.reconciliation.stale_after_sec,
            self.gateway.timeout_ms
        );

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub url: Option<String>,
}

impl DatabaseConfig {
    /// Configured URL, falling back to `DATABASE_URL`.
    pub fn url(&self) -> Option<String> {
        self.url
            .clone()
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .filter(|url| !url.trim().is_empty())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    /// Shared secret for payout webhook signatures. Webhooks are refused without it.
    pub webhook_secret: Option<String>,
    pub sandbox_mode: SandboxMode,
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_ms: 10_000,
            webhook_secret: None,
            sandbox_mode: SandboxMode::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub interval_sec: u64,
    pub stale_after_sec: u64,
    pub batch_size: i64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            interval_sec: 60,
            stale_after_sec: 300,
            batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,  // "debug" | "info" | "warn" | "error"
    pub format: String, // "pretty" | "json"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Credentials for service-to-service endpoints such as `POST /earnings`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InternalConfig {
    /// Expected value of the `x-internal-key` header. Internal endpoints refuse
    /// every call while this is unset.
    pub api_key: Option<String>,
}
