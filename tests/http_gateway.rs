use mockito::{mock, Matcher};
use rust_decimal::Decimal;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;
use withdrawal_ledger::gateway::{
    HttpPayoutGateway, PayoutGateway, PayoutInstruction, PayoutOutcome, PayoutStatus,
};
use withdrawal_ledger::ledger::BankDetails;

fn gateway() -> HttpPayoutGateway {
    HttpPayoutGateway::new(
        &mockito::server_url(),
        "sk_test".to_string(),
        Duration::from_secs(2),
    )
    .unwrap()
}

fn instruction() -> PayoutInstruction {
    PayoutInstruction {
        idempotency_key: Uuid::new_v4(),
        user_id: "u1".to_string(),
        amount: Decimal::from(490),
        beneficiary: BankDetails {
            account_number: "50100012345678".to_string(),
            ifsc_code: "HDFC0000123".to_string(),
            account_holder_name: "Ravi Kumar".to_string(),
            bank_name: "HDFC Bank".to_string(),
        },
    }
}

#[tokio::test]
async fn test_initiate_payout_accepted() {
    let instruction = instruction();
    let m = mock("POST", "/payouts")
        .match_header("authorization", "Bearer sk_test")
        .match_header(
            "idempotency-key",
            instruction.idempotency_key.to_string().as_str(),
        )
        .match_body(Matcher::PartialJson(json!({
            "amount": "490",
            "beneficiary": { "ifscCode": "HDFC0000123" }
        })))
        .with_status(202)
        .with_header("content-type", "application/json")
        .with_body(json!({ "reference": "po_123", "status": "accepted" }).to_string())
        .create();

    let outcome = gateway().initiate_payout(&instruction).await.unwrap();

    assert_eq!(
        outcome,
        PayoutOutcome::Accepted {
            reference: "po_123".to_string()
        }
    );
    m.assert();
}

#[tokio::test]
async fn test_initiate_payout_completed() {
    let m = mock("POST", "/payouts")
        .with_status(200)
        .with_body(json!({ "reference": "po_456", "status": "completed" }).to_string())
        .create();

    let outcome = gateway().initiate_payout(&instruction()).await.unwrap();

    assert_eq!(
        outcome,
        PayoutOutcome::Completed {
            reference: "po_456".to_string()
        }
    );
    m.assert();
}

#[tokio::test]
async fn test_client_error_is_a_rejection() {
    let m = mock("POST", "/payouts")
        .with_status(422)
        .with_body(r#"{"error":"invalid ifsc"}"#)
        .create();

    let outcome = gateway().initiate_payout(&instruction()).await.unwrap();

    match outcome {
        PayoutOutcome::Rejected { reason } => assert!(reason.contains("invalid ifsc")),
        other => panic!("expected rejection, got {:?}", other),
    }
    m.assert();
}

#[tokio::test]
async fn test_server_error_is_an_error() {
    let m = mock("POST", "/payouts")
        .with_status(503)
        .with_body("maintenance")
        .create();

    let result = gateway().initiate_payout(&instruction()).await;

    assert!(result.is_err());
    m.assert();
}

#[tokio::test]
async fn test_payout_status() {
    let id = Uuid::new_v4();
    let m = mock("GET", format!("/payouts/{}", id).as_str())
        .match_header("authorization", "Bearer sk_test")
        .with_status(200)
        .with_body(json!({ "reference": "po_789", "status": "failed", "reason": "account closed" }).to_string())
        .create();

    let status = gateway().payout_status(id).await.unwrap();

    assert_eq!(
        status,
        PayoutStatus::Failed {
            reason: "account closed".to_string()
        }
    );
    m.assert();
}

#[tokio::test]
async fn test_unknown_payout() {
    let id = Uuid::new_v4();
    let m = mock("GET", format!("/payouts/{}", id).as_str())
        .with_status(404)
        .create();

    assert_eq!(gateway().payout_status(id).await.unwrap(), PayoutStatus::Unknown);
    m.assert();
}
