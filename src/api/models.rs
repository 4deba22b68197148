use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::{BankDetails, WithdrawalOutcome, WithdrawalRequest, WithdrawalStatus};

#[derive(Debug, Deserialize)]
pub struct CreateWithdrawalRequest {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditEarningsRequest {
    pub user_id: String,
    pub amount: Decimal,
}

/// Client view of a withdrawal. The failure reason is internal and the
/// account number is masked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalView {
    pub id: Uuid,
    pub requested_amount: Decimal,
    pub fee: Decimal,
    pub net_amount: Decimal,
    pub status: WithdrawalStatus,
    pub bank_details: BankDetails,
    pub gateway_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<WithdrawalRequest> for WithdrawalView {
    fn from(withdrawal: WithdrawalRequest) -> Self {
        Self {
            id: withdrawal.id,
            requested_amount: withdrawal.requested_amount,
            fee: withdrawal.fee,
            net_amount: withdrawal.net_amount,
            status: withdrawal.status,
            bank_details: withdrawal.bank_details.masked(),
            gateway_reference: withdrawal.gateway_reference,
            created_at: withdrawal.created_at,
            updated_at: withdrawal.updated_at,
            resolved_at: withdrawal.resolved_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalOutcomeResponse {
    pub withdrawal: WithdrawalView,
    pub is_immediate_success: bool,
    pub requires_bank_details: bool,
    pub message: String,
}

impl From<WithdrawalOutcome> for WithdrawalOutcomeResponse {
    fn from(outcome: WithdrawalOutcome) -> Self {
        Self {
            withdrawal: outcome.withdrawal.into(),
            is_immediate_success: outcome.is_immediate_success,
            requires_bank_details: outcome.requires_bank_details,
            message: outcome.message,
        }
    }
}

impl WithdrawalOutcomeResponse {
    /// A withdrawal whose payout was attempted and failed, with the hold released.
    pub fn failed(withdrawal: WithdrawalRequest, message: String) -> Self {
        Self {
            withdrawal: withdrawal.into(),
            is_immediate_success: false,
            requires_bank_details: false,
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankDetailsResponse {
    pub bank_details: Option<BankDetails>,
    pub is_complete: bool,
    /// Withdrawal that was waiting for these details and has now been dispatched,
    /// whether or not the payout went through.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub withdrawal: Option<WithdrawalOutcomeResponse>,
}

impl BankDetailsResponse {
    pub fn new(details: Option<BankDetails>) -> Self {
        Self {
            is_complete: details.as_ref().is_some_and(BankDetails::is_complete),
            bank_details: details.as_ref().map(BankDetails::masked),
            withdrawal: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub withdrawal_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::NewWithdrawal;
    use serde_json::json;

    #[test]
    fn view_is_camel_case_and_hides_internal_fields() {
        let now = Utc::now();
        let mut withdrawal = WithdrawalRequest::open(
            NewWithdrawal {
                id: Uuid::nil(),
                user_id: "user-1".to_string(),
                amount: Decimal::from(500),
                fee: Decimal::from(10),
                net_amount: Decimal::from(490),
                bank_details: BankDetails {
                    account_number: "123456789".to_string(),
                    ifsc_code: "SBIN0000001".to_string(),
                    account_holder_name: "Meera".to_string(),
                    bank_name: "SBI".to_string(),
                },
            },
            now,
        );
        withdrawal.failure_reason = Some("upstream 500 from bank".to_string());

        let value = serde_json::to_value(WithdrawalView::from(withdrawal)).unwrap();

        assert_eq!(value["requestedAmount"], json!("500"));
        assert_eq!(value["netAmount"], json!("490"));
        assert_eq!(value["status"], json!("pending"));
        assert_eq!(value["bankDetails"]["accountNumber"], json!("*****6789"));
        assert!(value.get("failureReason").is_none());
        assert!(value.get("userId").is_none());
    }

    #[test]
    fn amounts_accept_numbers_and_strings() {
        let from_number: CreateWithdrawalRequest =
            serde_json::from_value(json!({ "amount": 250 })).unwrap();
        let from_string: CreateWithdrawalRequest =
            serde_json::from_value(json!({ "amount": "250.50" })).unwrap();

        assert_eq!(from_number.amount, Decimal::from(250));
        assert_eq!(from_string.amount, "250.50".parse::<Decimal>().unwrap());
    }
}
