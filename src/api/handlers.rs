use axum::body::Bytes;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::models::{
    BankDetailsResponse, CreateWithdrawalRequest, CreditEarningsRequest, HealthResponse,
    WithdrawalOutcomeResponse, WithdrawalView,
};
use crate::api::routes::AppState;
use crate::gateway::signature::{self, SIGNATURE_HEADER};
use crate::gateway::PayoutEvent;
use crate::ledger::{Balance, BankDetails, LedgerError};

pub const USER_HEADER: &str = "x-user-id";
pub const INTERNAL_KEY_HEADER: &str = "x-internal-key";

/// Caller identity, set by the authentication layer in front of the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| UserId(value.to_string()))
            .ok_or(ApiError::MissingUser)
    }
}

pub async fn handle_create_withdrawal(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Json(payload): Json<CreateWithdrawalRequest>,
) -> Result<(StatusCode, Json<WithdrawalOutcomeResponse>), ApiError> {
    let outcome = state.ledger.withdraw(&user_id, payload.amount).await?;

    let status = if outcome.is_immediate_success {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(outcome.into())))
}

pub async fn handle_list_withdrawals(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<WithdrawalView>>, ApiError> {
    let withdrawals = state.ledger.withdrawals(&user_id).await?;
    Ok(Json(withdrawals.into_iter().map(Into::into).collect()))
}

pub async fn handle_get_withdrawal(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<Json<WithdrawalView>, ApiError> {
    let withdrawal = state.ledger.withdrawal(&user_id, id).await?;
    Ok(Json(withdrawal.into()))
}

pub async fn handle_cancel_withdrawal(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<Json<WithdrawalView>, ApiError> {
    let cancelled = state.ledger.cancel_withdrawal(&user_id, id).await?;
    info!("User {} cancelled withdrawal {}", user_id, id);
    Ok(Json(cancelled.into()))
}

pub async fn handle_process_withdrawal(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<Json<WithdrawalOutcomeResponse>, ApiError> {
    let outcome = state.ledger.process_pending(&user_id, id).await?;
    Ok(Json(outcome.into()))
}

pub async fn handle_get_balance(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Result<Json<Balance>, ApiError> {
    Ok(Json(state.ledger.balance(&user_id).await?))
}

pub async fn handle_get_bank_details(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Result<Json<BankDetailsResponse>, ApiError> {
    let details = state.ledger.bank_details(&user_id).await?;
    Ok(Json(BankDetailsResponse::new(details)))
}

pub async fn handle_put_bank_details(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Json(details): Json<BankDetails>,
) -> Result<Json<BankDetailsResponse>, ApiError> {
    let dispatched = match state
        .ledger
        .submit_bank_details(&user_id, details.clone())
        .await
    {
        Ok(outcome) => outcome.map(Into::into),
        // The details are saved; only the resumed payout failed and its hold is already released.
        Err(err @ (LedgerError::GatewayFailure { .. } | LedgerError::GatewayTimeout { .. })) => {
            warn!("Resumed withdrawal for user {} failed: {}", user_id, err);
            let message = err.user_message();
            match err.withdrawal_id() {
                Some(id) => Some(WithdrawalOutcomeResponse::failed(
                    state.ledger.withdrawal(&user_id, id).await?,
                    message,
                )),
                None => return Err(err.into()),
            }
        }
        Err(err) => return Err(err.into()),
    };

    let mut response = BankDetailsResponse::new(Some(details.normalized()));
    response.withdrawal = dispatched;
    Ok(Json(response))
}

/// Service-to-service credit, guarded by the shared `internal.api_key`.
pub async fn handle_credit_earnings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreditEarningsRequest>,
) -> Result<Json<Balance>, ApiError> {
    let expected = state
        .config
        .internal
        .api_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .ok_or(ApiError::InvalidInternalKey)?;
    let provided = headers
        .get(INTERNAL_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::InvalidInternalKey)?;
    if !internal_key_matches(expected, provided) {
        warn!("Rejected earnings credit with a bad internal key");
        return Err(ApiError::InvalidInternalKey);
    }

    if payload.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("userId cannot be empty".to_string()));
    }

    let balance = state
        .ledger
        .credit_earnings(&payload.user_id, payload.amount)
        .await?;
    Ok(Json(balance))
}

/// Gateway push notification. The body is authenticated before it is parsed.
pub async fn handle_payout_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WithdrawalView>, ApiError> {
    let secret = state
        .config
        .gateway
        .webhook_secret
        .as_deref()
        .ok_or(ApiError::WebhooksDisabled)?;

    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::InvalidSignature)?;
    if !signature::verify(secret, &body, provided) {
        warn!("Rejected payout webhook with a bad signature");
        return Err(ApiError::InvalidSignature);
    }

    let event: PayoutEvent =
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    info!(
        "Payout webhook for reference {}: {:?}",
        event.reference, event.status
    );

    let withdrawal = state.ledger.handle_payout_event(event).await?;
    Ok(Json(withdrawal.into()))
}

// Digests have a fixed length, so comparing them does not leak the key's length or prefix.
fn internal_key_matches(expected: &str, provided: &str) -> bool {
    Sha256::digest(expected.as_bytes()) == Sha256::digest(provided.as_bytes())
}

pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
