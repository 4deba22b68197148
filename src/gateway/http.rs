use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use super::{GatewayError, PayoutGateway, PayoutInstruction, PayoutOutcome, PayoutStatus};

/// Payout provider reached over its REST API.
pub struct HttpPayoutGateway {
    client: Client,
    base_url: Url,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct PayoutResponse {
    reference: Option<String>,
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

impl HttpPayoutGateway {
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self, GatewayError> {
        // Url::join drops the last path segment unless the base ends with '/'.
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{}/", base_url))?
        };

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn payouts_url(&self) -> Result<Url, GatewayError> {
        Ok(self.base_url.join("payouts")?)
    }

    fn payout_url(&self, withdrawal_id: Uuid) -> Result<Url, GatewayError> {
        Ok(self.base_url.join(&format!("payouts/{}", withdrawal_id))?)
    }
}

#[async_trait]
impl PayoutGateway for HttpPayoutGateway {
    async fn initiate_payout(
        &self,
        instruction: &PayoutInstruction,
    ) -> Result<PayoutOutcome, GatewayError> {
        let response = self
            .client
            .post(self.payouts_url()?)
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", instruction.idempotency_key.to_string())
            .json(instruction)
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await?;
            warn!(
                "Gateway rejected payout {} ({}): {}",
                instruction.idempotency_key, status, body
            );
            return Ok(PayoutOutcome::Rejected {
                reason: format!("gateway returned {}: {}", status.as_u16(), body),
            });
        }
        if !status.is_success() {
            return Err(GatewayError::UnexpectedResponse {
                status: status.as_u16(),
                body: response.text().await?,
            });
        }

        let payout: PayoutResponse = response.json().await?;
        debug!(
            "Gateway answered payout {} with status {}",
            instruction.idempotency_key, payout.status
        );

        let reference = || {
            payout.reference.clone().ok_or_else(|| {
                GatewayError::Unavailable(format!(
                    "payout {} answered '{}' without a reference",
                    instruction.idempotency_key, payout.status
                ))
            })
        };

        match payout.status.as_str() {
            "completed" | "success" => Ok(PayoutOutcome::Completed {
                reference: reference()?,
            }),
            "accepted" | "pending" | "processing" => Ok(PayoutOutcome::Accepted {
                reference: reference()?,
            }),
            "rejected" | "failed" => Ok(PayoutOutcome::Rejected {
                reason: payout
                    .reason
                    .clone()
                    .unwrap_or_else(|| "payout rejected by gateway".to_string()),
            }),
            other => Err(GatewayError::Unavailable(format!(
                "unrecognised payout status '{}'",
                other
            ))),
        }
    }

    async fn payout_status(&self, withdrawal_id: Uuid) -> Result<PayoutStatus, GatewayError> {
        let response = self
            .client
            .get(self.payout_url(withdrawal_id)?)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(PayoutStatus::Unknown);
        }
        if !status.is_success() {
            return Err(GatewayError::UnexpectedResponse {
                status: status.as_u16(),
                body: response.text().await?,
            });
        }

        let payout: PayoutResponse = response.json().await?;
        match payout.status.as_str() {
            "completed" | "success" => Ok(PayoutStatus::Completed {
                reference: payout.reference.unwrap_or_else(|| withdrawal_id.to_string()),
            }),
            "rejected" | "failed" => Ok(PayoutStatus::Failed {
                reason: payout
                    .reason
                    .unwrap_or_else(|| "payout failed at gateway".to_string()),
            }),
            "accepted" | "pending" | "processing" => Ok(PayoutStatus::InFlight),
            other => Err(GatewayError::Unavailable(format!(
                "unrecognised payout status '{}'",
                other
            ))),
        }
    }
}
