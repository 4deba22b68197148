use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers::{
    handle_cancel_withdrawal, handle_create_withdrawal, handle_credit_earnings,
    handle_get_balance, handle_get_bank_details, handle_get_withdrawal, handle_health,
    handle_list_withdrawals, handle_payout_webhook, handle_process_withdrawal,
    handle_put_bank_details,
};
use crate::config::AppConfig;
use crate::ledger::WithdrawalLedger;

pub struct AppState {
    pub ledger: Arc<WithdrawalLedger>,
    pub config: AppConfig,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/withdrawals",
            post(handle_create_withdrawal).get(handle_list_withdrawals),
        )
        .route("/withdrawals/{id}", get(handle_get_withdrawal))
        .route("/withdrawals/{id}/cancel", post(handle_cancel_withdrawal))
        .route("/withdrawals/{id}/process", post(handle_process_withdrawal))
        .route("/balance", get(handle_get_balance))
        .route(
            "/bank-details",
            put(handle_put_bank_details).get(handle_get_bank_details),
        )
        .route("/earnings", post(handle_credit_earnings))
        .route("/webhooks/payout", post(handle_payout_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
