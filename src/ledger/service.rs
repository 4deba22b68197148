use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::store::LedgerStore;
use crate::gateway::{
    PayoutEvent, PayoutEventStatus, PayoutGateway, PayoutInstruction, PayoutOutcome, PayoutStatus,
};
use crate::ledger::error::{LedgerError, ValidationError};
use crate::ledger::limits::{ValidatedWithdrawal, WithdrawalLimits};
use crate::ledger::model::{
    Balance, BankDetails, NewWithdrawal, Transition, WithdrawalRequest, WithdrawalStatus,
};

pub const CANCELLED_BY_USER: &str = "cancelled by user";
const NEVER_REACHED_GATEWAY: &str = "payout never reached the gateway";

/// Result of creating (or resuming) a withdrawal, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalOutcome {
    pub withdrawal: WithdrawalRequest,
    pub is_immediate_success: bool,
    pub requires_bank_details: bool,
    pub message: String,
}

impl WithdrawalOutcome {
    fn awaiting_bank_details(withdrawal: WithdrawalRequest) -> Self {
        Self {
            withdrawal,
            is_immediate_success: false,
            requires_bank_details: true,
            message: "Withdrawal requested. Add your bank details to start processing".to_string(),
        }
    }

    fn completed(withdrawal: WithdrawalRequest) -> Self {
        Self {
            withdrawal,
            is_immediate_success: true,
            requires_bank_details: false,
            message: "Withdrawal completed".to_string(),
        }
    }

    fn processing(withdrawal: WithdrawalRequest) -> Self {
        Self {
            withdrawal,
            is_immediate_success: false,
            requires_bank_details: false,
            message: "Withdrawal is being processed".to_string(),
        }
    }
}

/// What a reconciliation pass did to one stuck withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Completed,
    Failed,
    Unchanged,
}

/// Prices withdrawals, holds the funds and drives each request to a
/// terminal state through the payout gateway.
pub struct WithdrawalLedger {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PayoutGateway>,
    limits: WithdrawalLimits,
    gateway_timeout: Duration,
}

impl WithdrawalLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PayoutGateway>,
        limits: WithdrawalLimits,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            limits,
            gateway_timeout,
        }
    }

    pub fn limits(&self) -> &WithdrawalLimits {
        &self.limits
    }

    pub fn validate_withdrawal(
        &self,
        amount: Decimal,
        available: Decimal,
    ) -> Result<ValidatedWithdrawal, ValidationError> {
        self.limits.validate(amount, available)
    }

    pub fn compute_fee(&self, amount: Decimal) -> Decimal {
        self.limits.fee(amount)
    }

    pub fn compute_net_amount(&self, amount: Decimal) -> Option<Decimal> {
        self.limits.net_amount(amount)
    }

    pub async fn balance(&self, user_id: &str) -> Result<Balance, LedgerError> {
        self.store.balance(user_id).await
    }

    /// Escrow releases and bonus payouts land here.
    pub async fn credit_earnings(
        &self,
        user_id: &str,
        amount: Decimal,
    ) -> Result<Balance, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(ValidationError::InvalidAmount(format!(
                "credited amount must be positive, got {}",
                amount
            ))
            .into());
        }

        let balance = self.store.credit(user_id, amount).await?;
        info!("Credited {} to user {}", amount, user_id);
        Ok(balance)
    }

    pub async fn bank_details(&self, user_id: &str) -> Result<Option<BankDetails>, LedgerError> {
        self.store.bank_details(user_id).await
    }

    /// Withdraws to the bank details currently on file for the user.
    pub async fn withdraw(
        &self,
        user_id: &str,
        amount: Decimal,
    ) -> Result<WithdrawalOutcome, LedgerError> {
        let bank_details = self.store.bank_details(user_id).await?.unwrap_or_default();
        self.request_withdrawal(user_id, amount, bank_details).await
    }

    pub async fn request_withdrawal(
        &self,
        user_id: &str,
        amount: Decimal,
        bank_details: BankDetails,
    ) -> Result<WithdrawalOutcome, LedgerError> {
        if self.store.active_withdrawal(user_id).await?.is_some() {
            return Err(LedgerError::WithdrawalInProgress);
        }

        let balance = self.store.balance(user_id).await?;
        let priced = self.limits.validate(amount, balance.available)?;

        let withdrawal = self
            .store
            .open_withdrawal(NewWithdrawal {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                amount: priced.amount,
                fee: priced.fee,
                net_amount: priced.net_amount,
                bank_details,
            })
            .await?;
        info!(
            "Opened withdrawal {} of {} for user {}",
            withdrawal.id, withdrawal.requested_amount, user_id
        );

        if !withdrawal.bank_details.is_complete() {
            info!("Withdrawal {} is waiting for bank details", withdrawal.id);
            return Ok(WithdrawalOutcome::awaiting_bank_details(withdrawal));
        }

        self.dispatch(withdrawal).await
    }

    /// Starts processing a pending withdrawal, taking the bank details on
    /// file if the request was opened without them.
    pub async fn process_pending(
        &self,
        user_id: &str,
        id: Uuid,
    ) -> Result<WithdrawalOutcome, LedgerError> {
        let withdrawal = self.withdrawal(user_id, id).await?;
        if withdrawal.status != WithdrawalStatus::Pending {
            return Err(LedgerError::InvalidTransition {
                from: withdrawal.status,
                to: WithdrawalStatus::Processing,
            });
        }

        let ready = if withdrawal.bank_details.is_complete() {
            withdrawal
        } else {
            let details = self
                .store
                .bank_details(user_id)
                .await?
                .filter(BankDetails::is_complete)
                .ok_or(LedgerError::BankDetailsIncomplete)?;
            self.store.attach_bank_details(id, &details).await?
        };

        self.dispatch(ready).await
    }

    /// Saves the user's bank details and, when they are complete, resumes a
    /// withdrawal that was waiting for them.
    pub async fn submit_bank_details(
        &self,
        user_id: &str,
        details: BankDetails,
    ) -> Result<Option<WithdrawalOutcome>, LedgerError> {
        let details = details.normalized();
        self.store.save_bank_details(user_id, &details).await?;
        info!("Saved bank details for user {}", user_id);

        if !details.is_complete() {
            return Ok(None);
        }

        match self.store.active_withdrawal(user_id).await? {
            Some(active) if active.status == WithdrawalStatus::Pending => {
                info!(
                    "Resuming withdrawal {} now that bank details are complete",
                    active.id
                );
                self.process_pending(user_id, active.id).await.map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Users may withdraw a request that has not reached the gateway yet.
    pub async fn cancel_withdrawal(
        &self,
        user_id: &str,
        id: Uuid,
    ) -> Result<WithdrawalRequest, LedgerError> {
        let withdrawal = self.withdrawal(user_id, id).await?;
        if withdrawal.status != WithdrawalStatus::Pending {
            return Err(LedgerError::InvalidTransition {
                from: withdrawal.status,
                to: WithdrawalStatus::Failed,
            });
        }

        self.fail(id, WithdrawalStatus::Pending, CANCELLED_BY_USER.to_string())
            .await
    }

    /// Applies a gateway webhook. Deliveries for already resolved withdrawals
    /// are acknowledged without effect.
    pub async fn handle_payout_event(
        &self,
        event: PayoutEvent,
    ) -> Result<WithdrawalRequest, LedgerError> {
        let found = match event.withdrawal_id {
            Some(id) => self.store.withdrawal(id).await?,
            None => self.store.withdrawal_by_reference(&event.reference).await?,
        };
        let withdrawal =
            found.ok_or_else(|| LedgerError::UnknownReference(event.reference.clone()))?;
        let id = withdrawal.id;

        if withdrawal.status.is_terminal() {
            info!(
                "Ignoring {:?} event for withdrawal {} already {}",
                event.status, id, withdrawal.status
            );
            return Ok(withdrawal);
        }

        let to = match event.status {
            PayoutEventStatus::Success => WithdrawalStatus::Completed,
            PayoutEventStatus::Failed => WithdrawalStatus::Failed,
        };
        if withdrawal.status != WithdrawalStatus::Processing {
            return Err(LedgerError::InvalidTransition {
                from: withdrawal.status,
                to,
            });
        }

        let result = match event.status {
            PayoutEventStatus::Success => {
                self.store
                    .transition(
                        Transition::new(id, WithdrawalStatus::Processing, to)
                            .with_reference(event.reference),
                    )
                    .await
            }
            PayoutEventStatus::Failed => {
                let reason = event
                    .reason
                    .unwrap_or_else(|| "payout failed at gateway".to_string());
                self.fail(id, WithdrawalStatus::Processing, reason).await
            }
        };

        match result {
            Ok(resolved) => {
                info!("Withdrawal {} resolved by webhook as {}", id, resolved.status);
                Ok(resolved)
            }
            // Resolved concurrently by the request path or reconciliation.
            Err(LedgerError::InvalidTransition { .. }) => self.current(id).await,
            Err(e) => Err(e),
        }
    }

    /// The user's withdrawals, newest first.
    pub async fn withdrawals(&self, user_id: &str) -> Result<Vec<WithdrawalRequest>, LedgerError> {
        self.store.withdrawals_for_user(user_id).await
    }

    /// A single withdrawal; other users' withdrawals are reported as missing.
    pub async fn withdrawal(
        &self,
        user_id: &str,
        id: Uuid,
    ) -> Result<WithdrawalRequest, LedgerError> {
        self.store
            .withdrawal(id)
            .await?
            .filter(|w| w.user_id == user_id)
            .ok_or(LedgerError::NotFound(id))
    }

    pub async fn stale_withdrawals(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<WithdrawalRequest>, LedgerError> {
        self.store.stale_processing(older_than, limit).await
    }

    /// Asks the gateway what happened to a processing withdrawal and settles it.
    ///
    /// Gateway errors leave the withdrawal untouched; only an explicit answer
    /// from the gateway resolves it.
    pub async fn reconcile(
        &self,
        withdrawal: &WithdrawalRequest,
    ) -> Result<Reconciliation, LedgerError> {
        let id = withdrawal.id;

        let status = match timeout(self.gateway_timeout, self.gateway.payout_status(id)).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                warn!("Could not query gateway for withdrawal {}: {}", id, e);
                return Ok(Reconciliation::Unchanged);
            }
            Err(_) => {
                warn!("Gateway status query for withdrawal {} timed out", id);
                return Ok(Reconciliation::Unchanged);
            }
        };

        let settled = match status {
            PayoutStatus::InFlight => return Ok(Reconciliation::Unchanged),
            PayoutStatus::Completed { reference } => self
                .store
                .transition(
                    Transition::new(id, WithdrawalStatus::Processing, WithdrawalStatus::Completed)
                        .with_reference(reference),
                )
                .await
                .map(|_| Reconciliation::Completed),
            PayoutStatus::Failed { reason } => self
                .fail(id, WithdrawalStatus::Processing, reason)
                .await
                .map(|_| Reconciliation::Failed),
            PayoutStatus::Unknown => self
                .fail(id, WithdrawalStatus::Processing, NEVER_REACHED_GATEWAY.to_string())
                .await
                .map(|_| Reconciliation::Failed),
        };

        match settled {
            Err(LedgerError::InvalidTransition { .. }) => Ok(Reconciliation::Unchanged),
            other => other,
        }
    }

    async fn dispatch(&self, pending: WithdrawalRequest) -> Result<WithdrawalOutcome, LedgerError> {
        let id = pending.id;
        let processing = self
            .store
            .transition(Transition::new(
                id,
                WithdrawalStatus::Pending,
                WithdrawalStatus::Processing,
            ))
            .await?;

        let instruction = PayoutInstruction::for_withdrawal(&processing);
        let answer = timeout(self.gateway_timeout, self.gateway.initiate_payout(&instruction)).await;
        let timed_out = answer.is_err();

        let settled = match answer {
            Ok(Ok(PayoutOutcome::Completed { reference })) => {
                self.store
                    .transition(
                        Transition::new(id, WithdrawalStatus::Processing, WithdrawalStatus::Completed)
                            .with_reference(reference),
                    )
                    .await
            }
            Ok(Ok(PayoutOutcome::Accepted { reference })) => {
                info!("Gateway accepted withdrawal {} as {}", id, reference);
                self.store.record_gateway_reference(id, &reference).await
            }
            Ok(Ok(PayoutOutcome::Rejected { reason })) => {
                self.fail(id, WithdrawalStatus::Processing, reason).await
            }
            Ok(Err(e)) => {
                self.fail(id, WithdrawalStatus::Processing, e.to_string())
                    .await
            }
            Err(_) => {
                let reason = format!(
                    "gateway did not answer within {}ms",
                    self.gateway_timeout.as_millis()
                );
                self.fail(id, WithdrawalStatus::Processing, reason).await
            }
        };

        let withdrawal = match settled {
            Ok(withdrawal) => withdrawal,
            // A webhook settled the payout while the gateway call was in flight.
            Err(LedgerError::InvalidTransition { .. }) => self.current(id).await?,
            Err(e) => return Err(e),
        };

        match withdrawal.status {
            WithdrawalStatus::Completed => {
                info!("Withdrawal {} paid out", id);
                Ok(WithdrawalOutcome::completed(withdrawal))
            }
            WithdrawalStatus::Pending | WithdrawalStatus::Processing => {
                Ok(WithdrawalOutcome::processing(withdrawal))
            }
            WithdrawalStatus::Failed if timed_out => {
                Err(LedgerError::GatewayTimeout { withdrawal_id: id })
            }
            WithdrawalStatus::Failed => Err(LedgerError::GatewayFailure {
                withdrawal_id: id,
                reason: withdrawal.failure_reason.unwrap_or_default(),
            }),
        }
    }

    /// Fails a withdrawal; the store returns the held amount to `available`
    /// in the same transaction.
    async fn fail(
        &self,
        id: Uuid,
        from: WithdrawalStatus,
        reason: String,
    ) -> Result<WithdrawalRequest, LedgerError> {
        let failed = self
            .store
            .transition(Transition::new(id, from, WithdrawalStatus::Failed).with_reason(&reason))
            .await?;
        warn!(
            "Withdrawal {} failed, {} returned to available: {}",
            id, failed.requested_amount, reason
        );
        Ok(failed)
    }

    async fn current(&self, id: Uuid) -> Result<WithdrawalRequest, LedgerError> {
        self.store
            .withdrawal(id)
            .await?
            .ok_or(LedgerError::NotFound(id))
    }
}
