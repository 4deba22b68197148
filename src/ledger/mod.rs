pub mod error;
pub mod limits;
pub mod model;
pub mod service;

pub use error::{LedgerError, ValidationError};
pub use limits::{ValidatedWithdrawal, WithdrawalLimits};
pub use model::{
    Balance, BalanceDelta, BankDetails, NewWithdrawal, Transition, WithdrawalRequest,
    WithdrawalStatus,
};
pub use service::{Reconciliation, WithdrawalLedger, WithdrawalOutcome};
