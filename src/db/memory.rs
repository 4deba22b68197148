use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::store::LedgerStore;
use crate::ledger::error::{LedgerError, ValidationError};
use crate::ledger::model::{
    Balance, BalanceDelta, BankDetails, NewWithdrawal, Transition, WithdrawalRequest,
    WithdrawalStatus,
};

/// Ledger kept in process memory. One lock guards all state.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    balances: HashMap<String, Balance>,
    bank_details: HashMap<String, BankDetails>,
    withdrawals: HashMap<Uuid, WithdrawalRequest>,
    order: Vec<Uuid>, // insertion order
}

impl State {
    fn apply(&mut self, user_id: &str, delta: BalanceDelta) -> Result<Balance, LedgerError> {
        let current = self.balances.get(user_id).copied().unwrap_or_default();
        let next = current
            .apply(delta)
            .ok_or_else(|| LedgerError::BalanceInvariant(user_id.to_string()))?;
        self.balances.insert(user_id.to_string(), next);
        Ok(next)
    }

    fn get(&self, id: Uuid) -> Result<&WithdrawalRequest, LedgerError> {
        self.withdrawals.get(&id).ok_or(LedgerError::NotFound(id))
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn balance(&self, user_id: &str) -> Result<Balance, LedgerError> {
        let state = self.inner.lock().await;
        Ok(state.balances.get(user_id).copied().unwrap_or_default())
    }

    async fn credit(&self, user_id: &str, amount: Decimal) -> Result<Balance, LedgerError> {
        let mut state = self.inner.lock().await;
        state.apply(user_id, BalanceDelta::credit(amount))
    }

    async fn bank_details(&self, user_id: &str) -> Result<Option<BankDetails>, LedgerError> {
        let state = self.inner.lock().await;
        Ok(state.bank_details.get(user_id).cloned())
    }

    async fn save_bank_details(
        &self,
        user_id: &str,
        details: &BankDetails,
    ) -> Result<(), LedgerError> {
        let mut state = self.inner.lock().await;
        state
            .bank_details
            .insert(user_id.to_string(), details.clone());
        Ok(())
    }

    async fn open_withdrawal(&self, new: NewWithdrawal) -> Result<WithdrawalRequest, LedgerError> {
        let mut state = self.inner.lock().await;

        let in_progress = state
            .withdrawals
            .values()
            .any(|w| w.user_id == new.user_id && w.status.is_active());
        if in_progress {
            return Err(LedgerError::WithdrawalInProgress);
        }

        let available = state
            .balances
            .get(&new.user_id)
            .map(|b| b.available)
            .unwrap_or_default();
        if available < new.amount {
            return Err(ValidationError::InsufficientBalance {
                requested: new.amount,
                available,
            }
            .into());
        }

        state.apply(&new.user_id, BalanceDelta::hold(new.amount))?;

        let withdrawal = WithdrawalRequest::open(new, Utc::now());
        state.order.push(withdrawal.id);
        state.withdrawals.insert(withdrawal.id, withdrawal.clone());
        Ok(withdrawal)
    }

    async fn transition(&self, transition: Transition) -> Result<WithdrawalRequest, LedgerError> {
        let mut state = self.inner.lock().await;

        let current = state.get(transition.id)?.clone();
        if current.status != transition.from || !transition.is_allowed() {
            return Err(LedgerError::InvalidTransition {
                from: current.status,
                to: transition.to,
            });
        }

        let delta = BalanceDelta::for_status(transition.to, current.requested_amount);
        state.apply(&current.user_id, delta)?;

        let updated = current.transitioned(&transition, Utc::now());
        state.withdrawals.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn record_gateway_reference(
        &self,
        id: Uuid,
        reference: &str,
    ) -> Result<WithdrawalRequest, LedgerError> {
        let mut state = self.inner.lock().await;

        let current = state.get(id)?;
        if current.status != WithdrawalStatus::Processing {
            return Err(LedgerError::InvalidTransition {
                from: current.status,
                to: WithdrawalStatus::Processing,
            });
        }

        let mut updated = current.clone();
        updated.gateway_reference = Some(reference.to_string());
        updated.updated_at = Utc::now();
        state.withdrawals.insert(id, updated.clone());
        Ok(updated)
    }

    async fn attach_bank_details(
        &self,
        id: Uuid,
        details: &BankDetails,
    ) -> Result<WithdrawalRequest, LedgerError> {
        let mut state = self.inner.lock().await;

        let current = state.get(id)?;
        if current.status != WithdrawalStatus::Pending || current.bank_details.is_complete() {
            return Err(LedgerError::SnapshotLocked(id));
        }

        let mut updated = current.clone();
        updated.bank_details = details.clone();
        updated.updated_at = Utc::now();
        state.withdrawals.insert(id, updated.clone());
        Ok(updated)
    }

    async fn withdrawal(&self, id: Uuid) -> Result<Option<WithdrawalRequest>, LedgerError> {
        let state = self.inner.lock().await;
        Ok(state.withdrawals.get(&id).cloned())
    }

    async fn withdrawal_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<WithdrawalRequest>, LedgerError> {
        let state = self.inner.lock().await;
        Ok(state
            .withdrawals
            .values()
            .find(|w| w.gateway_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn active_withdrawal(
        &self,
        user_id: &str,
    ) -> Result<Option<WithdrawalRequest>, LedgerError> {
        let state = self.inner.lock().await;
        Ok(state
            .withdrawals
            .values()
            .find(|w| w.user_id == user_id && w.status.is_active())
            .cloned())
    }

    async fn withdrawals_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<WithdrawalRequest>, LedgerError> {
        let state = self.inner.lock().await;
        Ok(state
            .order
            .iter()
            .rev()
            .filter_map(|id| state.withdrawals.get(id))
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn stale_processing(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<WithdrawalRequest>, LedgerError> {
        let state = self.inner.lock().await;
        let mut stale: Vec<_> = state
            .withdrawals
            .values()
            .filter(|w| w.status == WithdrawalStatus::Processing && w.updated_at < older_than)
            .cloned()
            .collect();
        stale.sort_by_key(|w| w.updated_at);
        stale.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(stale)
    }
}
