mod utils;

use crate::utils::{
    balance, create_test_app, create_test_app_with, create_test_config, credit,
    earnings_request, request, save_bank_details, send, INTERNAL_KEY,
};
use axum::http::StatusCode;
use futures_util::future::join_all;
use serde_json::json;
use withdrawal_ledger::gateway::SandboxMode;

#[tokio::test]
async fn test_missing_user_is_unauthorized() {
    let app = create_test_app(SandboxMode::Complete);

    let (status, body) = send(
        &app,
        request("POST", "/withdrawals", None, Some(json!({ "amount": 500 }))),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthenticated");
}

#[tokio::test]
async fn test_immediate_success() {
    let app = create_test_app(SandboxMode::Complete);
    credit(&app, "u1", 1000).await;
    save_bank_details(&app, "u1").await;

    let (status, body) = send(
        &app,
        request("POST", "/withdrawals", Some("u1"), Some(json!({ "amount": 500 }))),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isImmediateSuccess"], true);
    assert_eq!(body["requiresBankDetails"], false);
    assert_eq!(body["withdrawal"]["status"], "completed");
    assert_eq!(body["withdrawal"]["fee"], "10");
    assert_eq!(body["withdrawal"]["netAmount"], "490");
    assert_eq!(
        body["withdrawal"]["bankDetails"]["accountNumber"],
        "**********5678"
    );

    assert_eq!(
        balance(&app, "u1").await,
        json!({ "available": "500", "pending": "0", "total": "1000" })
    );
}

#[tokio::test]
async fn test_insufficient_balance() {
    let app = create_test_app(SandboxMode::Complete);
    credit(&app, "u1", 1000).await;
    save_bank_details(&app, "u1").await;

    let (status, body) = send(
        &app,
        request("POST", "/withdrawals", Some("u1"), Some(json!({ "amount": 1500 }))),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "insufficient_balance");
    assert_eq!(balance(&app, "u1").await["available"], "1000");

    let (_, list) = send(&app, request("GET", "/withdrawals", Some("u1"), None)).await;
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn test_below_minimum() {
    let app = create_test_app(SandboxMode::Complete);
    credit(&app, "u1", 1000).await;

    let (status, body) = send(
        &app,
        request("POST", "/withdrawals", Some("u1"), Some(json!({ "amount": 50 }))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "below_minimum");
    assert_eq!(balance(&app, "u1").await["available"], "1000");
}

#[tokio::test]
async fn test_non_positive_amount() {
    let app = create_test_app(SandboxMode::Complete);
    credit(&app, "u1", 1000).await;

    let (status, body) = send(
        &app,
        request("POST", "/withdrawals", Some("u1"), Some(json!({ "amount": "-5" }))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_amount");
}

#[tokio::test]
async fn test_missing_bank_details_then_submitting_them() {
    let app = create_test_app(SandboxMode::Complete);
    credit(&app, "u1", 1000).await;

    let (status, body) = send(
        &app,
        request("POST", "/withdrawals", Some("u1"), Some(json!({ "amount": 500 }))),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["requiresBankDetails"], true);
    assert_eq!(body["withdrawal"]["status"], "pending");
    assert_eq!(
        balance(&app, "u1").await,
        json!({ "available": "500", "pending": "500", "total": "1000" })
    );

    let saved = save_bank_details(&app, "u1").await;
    assert_eq!(saved["isComplete"], true);
    assert_eq!(saved["bankDetails"]["ifscCode"], "HDFC0000123");
    assert_eq!(saved["withdrawal"]["withdrawal"]["id"], body["withdrawal"]["id"]);
    assert_eq!(saved["withdrawal"]["withdrawal"]["status"], "completed");

    assert_eq!(
        balance(&app, "u1").await,
        json!({ "available": "500", "pending": "0", "total": "1000" })
    );
}

#[tokio::test]
async fn test_bank_details_saved_when_resumed_payout_fails() {
    for mode in [SandboxMode::Reject, SandboxMode::Hang] {
        let app = create_test_app(mode);
        credit(&app, "u1", 1000).await;

        let (status, body) = send(
            &app,
            request("POST", "/withdrawals", Some("u1"), Some(json!({ "amount": 500 }))),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let saved = save_bank_details(&app, "u1").await;
        assert_eq!(saved["isComplete"], true);
        assert_eq!(saved["withdrawal"]["withdrawal"]["id"], body["withdrawal"]["id"]);
        assert_eq!(saved["withdrawal"]["withdrawal"]["status"], "failed");
        assert_eq!(saved["withdrawal"]["isImmediateSuccess"], false);
        assert_eq!(saved["withdrawal"]["message"], "Withdrawal failed, please retry");

        let (_, stored) = send(&app, request("GET", "/bank-details", Some("u1"), None)).await;
        assert_eq!(stored["isComplete"], true);
        assert_eq!(
            balance(&app, "u1").await,
            json!({ "available": "1000", "pending": "0", "total": "1000" })
        );
    }
}

#[tokio::test]
async fn test_process_without_bank_details() {
    let app = create_test_app(SandboxMode::Complete);
    credit(&app, "u1", 1000).await;
    let (_, body) = send(
        &app,
        request("POST", "/withdrawals", Some("u1"), Some(json!({ "amount": 500 }))),
    )
    .await;
    let id = body["withdrawal"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        request("POST", &format!("/withdrawals/{}/process", id), Some("u1"), None),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "bank_details_incomplete");
}

#[tokio::test]
async fn test_gateway_failure_rolls_back() {
    let app = create_test_app(SandboxMode::Reject);
    credit(&app, "u1", 500).await;
    save_bank_details(&app, "u1").await;

    let (status, body) = send(
        &app,
        request("POST", "/withdrawals", Some("u1"), Some(json!({ "amount": 500 }))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["message"], "Withdrawal failed, please retry");
    let id = body["withdrawalId"].as_str().unwrap().to_string();

    let (_, withdrawal) = send(
        &app,
        request("GET", &format!("/withdrawals/{}", id), Some("u1"), None),
    )
    .await;
    assert_eq!(withdrawal["status"], "failed");
    assert!(withdrawal.get("failureReason").is_none());

    assert_eq!(
        balance(&app, "u1").await,
        json!({ "available": "500", "pending": "0", "total": "500" })
    );
}

#[tokio::test]
async fn test_gateway_timeout_rolls_back() {
    let app = create_test_app(SandboxMode::Hang);
    credit(&app, "u1", 1000).await;
    save_bank_details(&app, "u1").await;

    let (status, body) = send(
        &app,
        request("POST", "/withdrawals", Some("u1"), Some(json!({ "amount": 300 }))),
    )
    .await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["code"], "gateway_timeout");
    assert_eq!(
        balance(&app, "u1").await,
        json!({ "available": "1000", "pending": "0", "total": "1000" })
    );
}

#[tokio::test]
async fn test_one_withdrawal_in_flight_per_user() {
    let app = create_test_app(SandboxMode::Accept);
    credit(&app, "u1", 1000).await;
    save_bank_details(&app, "u1").await;

    let responses = join_all((0..5).map(|_| {
        send(
            &app,
            request("POST", "/withdrawals", Some("u1"), Some(json!({ "amount": 600 }))),
        )
    }))
    .await;

    let accepted = responses
        .iter()
        .filter(|(status, _)| *status == StatusCode::ACCEPTED)
        .count();
    assert_eq!(accepted, 1);
    assert!(responses.iter().all(|(status, _)| {
        *status == StatusCode::ACCEPTED
            || *status == StatusCode::CONFLICT
            || *status == StatusCode::UNPROCESSABLE_ENTITY
    }));

    assert_eq!(
        balance(&app, "u1").await,
        json!({ "available": "400", "pending": "600", "total": "1000" })
    );
}

#[tokio::test]
async fn test_list_and_fetch_withdrawals() {
    let app = create_test_app(SandboxMode::Complete);
    credit(&app, "u1", 1000).await;
    save_bank_details(&app, "u1").await;

    let mut ids = Vec::new();
    for amount in [200, 300] {
        let (_, body) = send(
            &app,
            request("POST", "/withdrawals", Some("u1"), Some(json!({ "amount": amount }))),
        )
        .await;
        ids.push(body["withdrawal"]["id"].clone());
    }

    let (status, list) = send(&app, request("GET", "/withdrawals", Some("u1"), None)).await;
    assert_eq!(status, StatusCode::OK);
    let listed: Vec<_> = list.as_array().unwrap().iter().map(|w| w["id"].clone()).collect();
    assert_eq!(listed, vec![ids[1].clone(), ids[0].clone()]);

    let uri = format!("/withdrawals/{}", ids[0].as_str().unwrap());
    let (status, _) = send(&app, request("GET", &uri, Some("u1"), None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, request("GET", &uri, Some("u2"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_cancel_pending_withdrawal() {
    let app = create_test_app(SandboxMode::Complete);
    credit(&app, "u1", 1000).await;

    let (_, body) = send(
        &app,
        request("POST", "/withdrawals", Some("u1"), Some(json!({ "amount": 400 }))),
    )
    .await;
    let uri = format!(
        "/withdrawals/{}/cancel",
        body["withdrawal"]["id"].as_str().unwrap()
    );

    let (status, cancelled) = send(&app, request("POST", &uri, Some("u1"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "failed");
    assert_eq!(balance(&app, "u1").await["available"], "1000");

    let (status, body) = send(&app, request("POST", &uri, Some("u1"), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_transition");
}

#[tokio::test]
async fn test_bank_details_are_masked() {
    let app = create_test_app(SandboxMode::Complete);

    let (status, empty) = send(&app, request("GET", "/bank-details", Some("u1"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(empty, json!({ "bankDetails": null, "isComplete": false }));

    save_bank_details(&app, "u1").await;
    let (_, saved) = send(&app, request("GET", "/bank-details", Some("u1"), None)).await;
    assert_eq!(saved["bankDetails"]["accountNumber"], "**********5678");
    assert_eq!(saved["isComplete"], true);
}

#[tokio::test]
async fn test_unknown_user_has_zero_balance() {
    let app = create_test_app(SandboxMode::Complete);

    assert_eq!(
        balance(&app, "nobody").await,
        json!({ "available": "0", "pending": "0", "total": "0" })
    );
}

#[tokio::test]
async fn test_health() {
    let app = create_test_app(SandboxMode::Complete);

    let (status, body) = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_earnings_require_internal_key() {
    let app = create_test_app(SandboxMode::Complete);

    let (status, body) = send(&app, earnings_request(None, "attacker", 50_000)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_internal_key");

    let (status, _) = send(&app, earnings_request(Some("guess"), "attacker", 50_000)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(
        balance(&app, "attacker").await,
        json!({ "available": "0", "pending": "0", "total": "0" })
    );

    let (status, body) = send(&app, earnings_request(Some(INTERNAL_KEY), "u1", 700)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], "700");
}

#[tokio::test]
async fn test_earnings_refused_without_configured_key() {
    let mut config = create_test_config(SandboxMode::Complete);
    config.internal.api_key = None;
    let app = create_test_app_with(config);

    let (status, _) = send(&app, earnings_request(Some(INTERNAL_KEY), "u1", 700)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, earnings_request(Some(""), "u1", 700)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(balance(&app, "u1").await["available"], "0");
}
