use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::error::ValidationError;

/// Configured bounds and flat fee for a single withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WithdrawalLimits {
    pub minimum: Decimal,
    pub maximum: Decimal,
    pub fee: Decimal,
}

/// A request that passed validation, with its price attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedWithdrawal {
    pub amount: Decimal,
    pub fee: Decimal,
    pub net_amount: Decimal,
}

impl WithdrawalLimits {
    /// Flat per-request fee; independent of the amount.
    pub fn fee(&self, _amount: Decimal) -> Decimal {
        self.fee
    }

    /// `None` when the amount does not cover the fee.
    pub fn net_amount(&self, amount: Decimal) -> Option<Decimal> {
        let net = amount - self.fee(amount);
        (net >= Decimal::ZERO).then_some(net)
    }

    pub fn validate(
        &self,
        amount: Decimal,
        available: Decimal,
    ) -> Result<ValidatedWithdrawal, ValidationError> {
        if amount <= Decimal::ZERO {
            return Err(ValidationError::InvalidAmount(format!(
                "amount must be positive, got {}",
                amount
            )));
        }

        if amount < self.minimum {
            return Err(ValidationError::BelowMinimum {
                amount,
                minimum: self.minimum,
            });
        }

        if amount > self.maximum {
            return Err(ValidationError::AboveMaximum {
                amount,
                maximum: self.maximum,
            });
        }

        let fee = self.fee(amount);
        let net_amount = self.net_amount(amount).ok_or_else(|| {
            ValidationError::InvalidAmount(format!(
                "amount {} does not cover the withdrawal fee of {}",
                amount, fee
            ))
        })?;

        if amount > available {
            return Err(ValidationError::InsufficientBalance {
                requested: amount,
                available,
            });
        }

        Ok(ValidatedWithdrawal {
            amount,
            fee,
            net_amount,
        })
    }
}

impl Default for WithdrawalLimits {
    fn default() -> Self {
        Self {
            minimum: Decimal::from(100),
            maximum: Decimal::from(100_000),
            fee: Decimal::from(10),
        }
    }
}
