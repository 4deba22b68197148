pub mod http;
pub mod sandbox;
pub mod signature;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::ledger::model::{BankDetails, WithdrawalRequest};

pub use http::HttpPayoutGateway;
pub use sandbox::{SandboxGateway, SandboxMode};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid gateway URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Unexpected gateway response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

/// What the gateway is asked to pay. The withdrawal id doubles as the
/// idempotency key, so a repeated call never pays twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutInstruction {
    pub idempotency_key: Uuid,
    pub user_id: String,
    pub amount: Decimal,
    pub beneficiary: BankDetails,
}

impl PayoutInstruction {
    /// Pays the net amount; the fee stays with the platform.
    pub fn for_withdrawal(withdrawal: &WithdrawalRequest) -> Self {
        Self {
            idempotency_key: withdrawal.id,
            user_id: withdrawal.user_id.clone(),
            amount: withdrawal.net_amount,
            beneficiary: withdrawal.bank_details.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayoutOutcome {
    /// Money already left; the withdrawal can be completed right away.
    Completed { reference: String },
    /// Accepted for asynchronous settlement, confirmed later by webhook.
    Accepted { reference: String },
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayoutStatus {
    Completed { reference: String },
    Failed { reason: String },
    InFlight,
    /// The gateway has no payout for this idempotency key.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutEventStatus {
    Success,
    Failed,
}

/// Push notification from the gateway about a payout it accepted earlier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutEvent {
    pub reference: String,
    #[serde(default)]
    pub withdrawal_id: Option<Uuid>,
    pub status: PayoutEventStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PayoutGateway: Send + Sync {
    async fn initiate_payout(
        &self,
        instruction: &PayoutInstruction,
    ) -> Result<PayoutOutcome, GatewayError>;

    /// Looks a payout up by the idempotency key it was initiated with.
    async fn payout_status(&self, withdrawal_id: Uuid) -> Result<PayoutStatus, GatewayError>;
}

/// HTTP gateway when a base URL is configured, otherwise the sandbox.
pub fn from_config(config: &GatewayConfig) -> Result<Arc<dyn PayoutGateway>, GatewayError> {
    match &config.base_url {
        Some(base_url) => Ok(Arc::new(HttpPayoutGateway::new(
            base_url,
            config.api_key.clone().unwrap_or_default(),
            config.timeout(),
        )?)),
        None => {
            warn!(
                "No payout gateway URL configured, using sandbox gateway in {:?} mode",
                config.sandbox_mode
            );
            Ok(Arc::new(SandboxGateway::new(config.sandbox_mode)))
        }
    }
}
