use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Per-user balance aggregate owned by the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub available: Decimal, // withdrawable funds
    pub pending: Decimal,   // funds held by unresolved withdrawals
    pub total: Decimal,     // lifetime earnings
}

impl Balance {
    pub fn new(available: Decimal, pending: Decimal, total: Decimal) -> Self {
        Self {
            available,
            pending,
            total,
        }
    }

    /// `total >= available + pending`, with both parts non-negative.
    pub fn is_consistent(&self) -> bool {
        self.available >= Decimal::ZERO
            && self.pending >= Decimal::ZERO
            && self.total >= self.available + self.pending
    }

    /// Returns the adjusted balance, or `None` if the result would break the invariant.
    pub fn apply(&self, delta: BalanceDelta) -> Option<Balance> {
        let next = Balance {
            available: self.available + delta.available,
            pending: self.pending + delta.pending,
            total: self.total + delta.total,
        };
        next.is_consistent().then_some(next)
    }
}

/// Relative adjustment applied to a balance in the same transaction as the
/// withdrawal status change that caused it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceDelta {
    pub available: Decimal,
    pub pending: Decimal,
    pub total: Decimal,
}

impl BalanceDelta {
    /// Moves the requested amount from `available` into `pending`.
    pub fn hold(amount: Decimal) -> Self {
        Self {
            available: -amount,
            pending: amount,
            total: Decimal::ZERO,
        }
    }

    /// Funds left the system through a completed payout.
    pub fn release(amount: Decimal) -> Self {
        Self {
            available: Decimal::ZERO,
            pending: -amount,
            total: Decimal::ZERO,
        }
    }

    /// Failed payout: the held amount goes back to `available`.
    pub fn refund(amount: Decimal) -> Self {
        Self {
            available: amount,
            pending: -amount,
            total: Decimal::ZERO,
        }
    }

    pub fn credit(amount: Decimal) -> Self {
        Self {
            available: amount,
            pending: Decimal::ZERO,
            total: amount,
        }
    }

    /// Balance effect of moving a withdrawal of `amount` into `status`.
    pub fn for_status(status: WithdrawalStatus, amount: Decimal) -> Self {
        match status {
            WithdrawalStatus::Completed => Self::release(amount),
            WithdrawalStatus::Failed => Self::refund(amount),
            WithdrawalStatus::Pending | WithdrawalStatus::Processing => Self::default(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.available.is_zero() && self.pending.is_zero() && self.total.is_zero()
    }
}

/// Payout destination. Complete iff every field is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BankDetails {
    #[serde(default)]
    pub account_number: String,
    #[serde(default)]
    pub ifsc_code: String,
    #[serde(default)]
    pub account_holder_name: String,
    #[serde(default)]
    pub bank_name: String,
}

impl BankDetails {
    pub fn is_complete(&self) -> bool {
        [
            &self.account_number,
            &self.ifsc_code,
            &self.account_holder_name,
            &self.bank_name,
        ]
        .iter()
        .all(|field| !field.trim().is_empty())
    }

    pub fn normalized(self) -> Self {
        Self {
            account_number: self.account_number.trim().to_string(),
            ifsc_code: self.ifsc_code.trim().to_uppercase(),
            account_holder_name: self.account_holder_name.trim().to_string(),
            bank_name: self.bank_name.trim().to_string(),
        }
    }

    /// Copy safe to hand back to clients: only the last four account digits survive.
    pub fn masked(&self) -> Self {
        let digits: Vec<char> = self.account_number.chars().collect();
        let visible = digits.len().min(4);
        let hidden = digits.len() - visible;
        let account_number = std::iter::repeat('*')
            .take(hidden)
            .chain(digits[hidden..].iter().copied())
            .collect();

        Self {
            account_number,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Processing => "processing",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Completed | WithdrawalStatus::Failed)
    }

    /// Pending and Processing requests hold funds and block new requests.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(&self, next: WithdrawalStatus) -> bool {
        use WithdrawalStatus::*;

        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Failed) | (Processing, Completed) | (Processing, Failed)
        )
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WithdrawalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WithdrawalStatus::Pending),
            "processing" => Ok(WithdrawalStatus::Processing),
            "completed" => Ok(WithdrawalStatus::Completed),
            "failed" => Ok(WithdrawalStatus::Failed),
            other => Err(format!("unknown withdrawal status: {}", other)),
        }
    }
}

/// Priced request ready to be opened against a balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWithdrawal {
    pub id: Uuid,
    pub user_id: String,
    pub amount: Decimal,
    pub fee: Decimal,
    pub net_amount: Decimal,
    pub bank_details: BankDetails,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub user_id: String,
    pub requested_amount: Decimal,
    pub fee: Decimal,
    pub net_amount: Decimal,
    pub status: WithdrawalStatus,
    pub bank_details: BankDetails,
    pub gateway_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl WithdrawalRequest {
    pub fn open(new: NewWithdrawal, now: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            user_id: new.user_id,
            requested_amount: new.amount,
            fee: new.fee,
            net_amount: new.net_amount,
            status: WithdrawalStatus::Pending,
            bank_details: new.bank_details,
            gateway_reference: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    /// Record after `transition`; the caller has already checked it is allowed.
    pub fn transitioned(&self, transition: &Transition, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.status = transition.to;
        next.updated_at = now;
        if let Some(reference) = &transition.gateway_reference {
            next.gateway_reference = Some(reference.clone());
        }
        if let Some(reason) = &transition.failure_reason {
            next.failure_reason = Some(reason.clone());
        }
        if transition.to.is_terminal() {
            next.resolved_at = Some(now);
        }
        next
    }
}

/// Compare-and-set status change: applies only while the record is still in `from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub id: Uuid,
    pub from: WithdrawalStatus,
    pub to: WithdrawalStatus,
    pub gateway_reference: Option<String>,
    pub failure_reason: Option<String>,
}

impl Transition {
    pub fn new(id: Uuid, from: WithdrawalStatus, to: WithdrawalStatus) -> Self {
        Self {
            id,
            from,
            to,
            gateway_reference: None,
            failure_reason: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.gateway_reference = Some(reference.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }

    pub fn is_allowed(&self) -> bool {
        self.from.can_transition_to(self.to)
    }
}
