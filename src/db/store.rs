use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::ledger::error::LedgerError;
use crate::ledger::model::{Balance, BankDetails, NewWithdrawal, Transition, WithdrawalRequest};

/// Authoritative ledger state. Every method that touches both a balance and
/// a withdrawal does so in one transaction.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Zero balance for users the ledger has never seen.
    async fn balance(&self, user_id: &str) -> Result<Balance, LedgerError>;

    /// Adds earnings to `available` and `total`.
    async fn credit(&self, user_id: &str, amount: Decimal) -> Result<Balance, LedgerError>;

    async fn bank_details(&self, user_id: &str) -> Result<Option<BankDetails>, LedgerError>;

    async fn save_bank_details(
        &self,
        user_id: &str,
        details: &BankDetails,
    ) -> Result<(), LedgerError>;

    /// Holds the amount and records a `Pending` withdrawal.
    ///
    /// Fails with `WithdrawalInProgress` when the user already has a pending or
    /// processing withdrawal, and with `InsufficientBalance` when `available`
    /// no longer covers the amount.
    async fn open_withdrawal(&self, new: NewWithdrawal) -> Result<WithdrawalRequest, LedgerError>;

    /// Applies a status change and its balance effect if the record is still
    /// in `transition.from`.
    async fn transition(&self, transition: Transition) -> Result<WithdrawalRequest, LedgerError>;

    /// Records the gateway reference of a payout accepted for later settlement.
    async fn record_gateway_reference(
        &self,
        id: Uuid,
        reference: &str,
    ) -> Result<WithdrawalRequest, LedgerError>;

    /// Fills in the bank details of a pending withdrawal opened without them.
    async fn attach_bank_details(
        &self,
        id: Uuid,
        details: &BankDetails,
    ) -> Result<WithdrawalRequest, LedgerError>;

    async fn withdrawal(&self, id: Uuid) -> Result<Option<WithdrawalRequest>, LedgerError>;

    async fn withdrawal_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<WithdrawalRequest>, LedgerError>;

    async fn active_withdrawal(
        &self,
        user_id: &str,
    ) -> Result<Option<WithdrawalRequest>, LedgerError>;

    /// Newest first.
    async fn withdrawals_for_user(&self, user_id: &str)
        -> Result<Vec<WithdrawalRequest>, LedgerError>;

    /// Processing withdrawals not touched since `older_than`, oldest first.
    async fn stale_processing(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<WithdrawalRequest>, LedgerError>;
}
