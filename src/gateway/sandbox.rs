use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::{GatewayError, PayoutGateway, PayoutInstruction, PayoutOutcome, PayoutStatus};

/// How the sandbox answers new payouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxMode {
    /// Pays out synchronously.
    #[default]
    Complete,
    /// Accepts and leaves the payout in flight until `settle` is called.
    Accept,
    Reject,
    /// Never answers, so callers hit their timeout.
    Hang,
}

/// In-process gateway for local development and tests.
#[derive(Debug, Default)]
pub struct SandboxGateway {
    mode: Mutex<SandboxMode>,
    payouts: Mutex<HashMap<Uuid, PayoutStatus>>,
}

impl SandboxGateway {
    pub fn new(mode: SandboxMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            payouts: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_mode(&self, mode: SandboxMode) {
        if let Ok(mut current) = self.mode.lock() {
            *current = mode;
        }
    }

    fn mode(&self) -> SandboxMode {
        self.mode.lock().map(|mode| *mode).unwrap_or_default()
    }

    /// Settles an accepted payout, as the real provider would some time later.
    pub fn settle(&self, withdrawal_id: Uuid, status: PayoutStatus) {
        if let Ok(mut payouts) = self.payouts.lock() {
            payouts.insert(withdrawal_id, status);
        }
    }

    pub fn reference_for(withdrawal_id: Uuid) -> String {
        format!("sbx_{}", withdrawal_id.simple())
    }

    fn record(&self, withdrawal_id: Uuid, status: PayoutStatus) -> Result<(), GatewayError> {
        self.payouts
            .lock()
            .map_err(|_| GatewayError::Unavailable("sandbox state poisoned".to_string()))?
            .insert(withdrawal_id, status);
        Ok(())
    }
}

#[async_trait]
impl PayoutGateway for SandboxGateway {
    async fn initiate_payout(
        &self,
        instruction: &PayoutInstruction,
    ) -> Result<PayoutOutcome, GatewayError> {
        let id = instruction.idempotency_key;
        let reference = Self::reference_for(id);

        match self.mode() {
            SandboxMode::Complete => {
                self.record(
                    id,
                    PayoutStatus::Completed {
                        reference: reference.clone(),
                    },
                )?;
                info!("Sandbox paid out {} for {}", instruction.amount, id);
                Ok(PayoutOutcome::Completed { reference })
            }
            SandboxMode::Accept => {
                self.record(id, PayoutStatus::InFlight)?;
                Ok(PayoutOutcome::Accepted { reference })
            }
            SandboxMode::Reject => {
                let reason = "sandbox rejected payout".to_string();
                self.record(
                    id,
                    PayoutStatus::Failed {
                        reason: reason.clone(),
                    },
                )?;
                Ok(PayoutOutcome::Rejected { reason })
            }
            SandboxMode::Hang => std::future::pending().await,
        }
    }

    async fn payout_status(&self, withdrawal_id: Uuid) -> Result<PayoutStatus, GatewayError> {
        let payouts = self
            .payouts
            .lock()
            .map_err(|_| GatewayError::Unavailable("sandbox state poisoned".to_string()))?;

        Ok(payouts
            .get(&withdrawal_id)
            .cloned()
            .unwrap_or(PayoutStatus::Unknown))
    }
}
