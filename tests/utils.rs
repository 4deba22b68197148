#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use withdrawal_ledger::api::{create_router, AppState};
use withdrawal_ledger::api::handlers::INTERNAL_KEY_HEADER;
use withdrawal_ledger::config::{
    AppConfig, DatabaseConfig, GatewayConfig, InternalConfig, LoggingConfig, ReconciliationConfig,
    ServerConfig,
};
use withdrawal_ledger::db::MemoryStore;
use withdrawal_ledger::gateway::{SandboxGateway, SandboxMode};
use withdrawal_ledger::ledger::{WithdrawalLedger, WithdrawalLimits};

pub const WEBHOOK_SECRET: &str = "whsec_integration";
pub const INTERNAL_KEY: &str = "ik_integration";

pub struct TestApp {
    pub router: Router,
    pub ledger: Arc<WithdrawalLedger>,
    pub gateway: Arc<SandboxGateway>,
}

// Helper function to create test config
pub fn create_test_config(mode: SandboxMode) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig::default(),
        withdrawal: WithdrawalLimits {
            minimum: Decimal::from(100),
            maximum: Decimal::from(100_000),
            fee: Decimal::from(10),
        },
        gateway: GatewayConfig {
            timeout_ms: 100,
            webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            sandbox_mode: mode,
            ..GatewayConfig::default()
        },
        reconciliation: ReconciliationConfig::default(),
        logging: LoggingConfig::default(),
        internal: InternalConfig {
            api_key: Some(INTERNAL_KEY.to_string()),
        },
    }
}

pub fn create_test_app(mode: SandboxMode) -> TestApp {
    create_test_app_with(create_test_config(mode))
}

pub fn create_test_app_with(config: AppConfig) -> TestApp {
    let gateway = Arc::new(SandboxGateway::new(config.gateway.sandbox_mode));
    let ledger = Arc::new(WithdrawalLedger::new(
        Arc::new(MemoryStore::new()),
        gateway.clone(),
        config.withdrawal,
        config.gateway.timeout(),
    ));

    let state = Arc::new(AppState {
        ledger: ledger.clone(),
        config,
    });

    TestApp {
        router: create_router(state),
        ledger,
        gateway,
    }
}

pub fn bank_details_json() -> Value {
    json!({
        "accountNumber": "50100012345678",
        "ifscCode": "hdfc0000123",
        "accountHolderName": "Ravi Kumar",
        "bankName": "HDFC Bank"
    })
}

pub fn request(method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let parsed = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, parsed)
}

/// `POST /earnings` with the given internal key, or none.
pub fn earnings_request(key: Option<&str>, user: &str, amount: i64) -> Request<Body> {
    let mut request = request(
        "POST",
        "/earnings",
        None,
        Some(json!({ "userId": user, "amount": amount })),
    );
    if let Some(key) = key {
        request
            .headers_mut()
            .insert(INTERNAL_KEY_HEADER, key.parse().unwrap());
    }
    request
}

pub async fn credit(app: &TestApp, user: &str, amount: i64) {
    let (status, _) = send(app, earnings_request(Some(INTERNAL_KEY), user, amount)).await;
    assert_eq!(status, StatusCode::OK);
}

pub async fn save_bank_details(app: &TestApp, user: &str) -> Value {
    let (status, body) = send(
        app,
        request("PUT", "/bank-details", Some(user), Some(bank_details_json())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

pub async fn balance(app: &TestApp, user: &str) -> Value {
    let (status, body) = send(app, request("GET", "/balance", Some(user), None)).await;
    assert_eq!(status, StatusCode::OK);
    body
}
