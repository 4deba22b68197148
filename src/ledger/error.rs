use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::ledger::model::WithdrawalStatus;

/// Rejections from pricing a withdrawal. Shown to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Amount {amount} is below the minimum withdrawal of {minimum}")]
    BelowMinimum { amount: Decimal, minimum: Decimal },

    #[error("Amount {amount} is above the maximum withdrawal of {maximum}")]
    AboveMaximum { amount: Decimal, maximum: Decimal },

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("A withdrawal is already in progress for this account")]
    WithdrawalInProgress,

    #[error("Bank details are incomplete")]
    BankDetailsIncomplete,

    #[error("Payout for withdrawal {withdrawal_id} failed: {reason}")]
    GatewayFailure { withdrawal_id: Uuid, reason: String },

    #[error("Payout for withdrawal {withdrawal_id} timed out")]
    GatewayTimeout { withdrawal_id: Uuid },

    #[error("Withdrawal not found: {0}")]
    NotFound(Uuid),

    #[error("No withdrawal matches gateway reference {0}")]
    UnknownReference(String),

    #[error("Invalid withdrawal status transition: {from} -> {to}")]
    InvalidTransition {
        from: WithdrawalStatus,
        to: WithdrawalStatus,
    },

    #[error("Bank details of withdrawal {0} are already fixed")]
    SnapshotLocked(Uuid),

    #[error("Balance update for user {0} would break the balance invariant")]
    BalanceInvariant(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt withdrawal record: {0}")]
    CorruptRecord(String),
}

impl LedgerError {
    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(ValidationError::InvalidAmount(_)) => "invalid_amount",
            LedgerError::Validation(ValidationError::BelowMinimum { .. }) => "below_minimum",
            LedgerError::Validation(ValidationError::AboveMaximum { .. }) => "above_maximum",
            LedgerError::Validation(ValidationError::InsufficientBalance { .. }) => {
                "insufficient_balance"
            }
            LedgerError::WithdrawalInProgress => "withdrawal_in_progress",
            LedgerError::BankDetailsIncomplete => "bank_details_incomplete",
            LedgerError::GatewayFailure { .. } => "gateway_failure",
            LedgerError::GatewayTimeout { .. } => "gateway_timeout",
            LedgerError::NotFound(_) | LedgerError::UnknownReference(_) => "not_found",
            LedgerError::InvalidTransition { .. } | LedgerError::SnapshotLocked(_) => {
                "invalid_transition"
            }
            LedgerError::BalanceInvariant(_)
            | LedgerError::Database(_)
            | LedgerError::CorruptRecord(_) => "internal",
        }
    }

    /// Message safe to show the user. Gateway and storage details stay internal.
    pub fn user_message(&self) -> String {
        match self {
            LedgerError::GatewayFailure { .. } | LedgerError::GatewayTimeout { .. } => {
                "Withdrawal failed, please retry".to_string()
            }
            LedgerError::BalanceInvariant(_)
            | LedgerError::Database(_)
            | LedgerError::CorruptRecord(_) => "Internal error, please try again later".to_string(),
            other => other.to_string(),
        }
    }

    /// Withdrawal the error refers to, when one was created.
    pub fn withdrawal_id(&self) -> Option<Uuid> {
        match self {
            LedgerError::GatewayFailure { withdrawal_id, .. }
            | LedgerError::GatewayTimeout { withdrawal_id } => Some(*withdrawal_id),
            LedgerError::NotFound(id) | LedgerError::SnapshotLocked(id) => Some(*id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_errors_hide_their_reason_from_users() {
        let err = LedgerError::GatewayFailure {
            withdrawal_id: Uuid::nil(),
            reason: "beneficiary bank offline".to_string(),
        };

        assert_eq!(err.user_message(), "Withdrawal failed, please retry");
        assert!(err.to_string().contains("beneficiary bank offline"));
        assert_eq!(err.code(), "gateway_failure");
    }

    #[test]
    fn validation_errors_are_shown_verbatim() {
        let err: LedgerError = ValidationError::BelowMinimum {
            amount: Decimal::from(50),
            minimum: Decimal::from(100),
        }
        .into();

        assert_eq!(
            err.user_message(),
            "Amount 50 is below the minimum withdrawal of 100"
        );
        assert_eq!(err.code(), "below_minimum");
    }
}
