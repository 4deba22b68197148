use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use crate::api::models::ErrorResponse;
use crate::ledger::{LedgerError, ValidationError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Missing x-user-id header")]
    MissingUser,

    #[error("Invalid payout signature")]
    InvalidSignature,

    #[error("Missing or invalid x-internal-key header")]
    InvalidInternalKey,

    #[error("Payout webhooks are not configured")]
    WebhooksDisabled,

    #[error("Malformed request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Ledger(err) => ledger_status(err),
            ApiError::MissingUser | ApiError::InvalidSignature | ApiError::InvalidInternalKey => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::WebhooksDisabled => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Ledger(err) => err.code(),
            ApiError::MissingUser => "unauthenticated",
            ApiError::InvalidSignature => "invalid_signature",
            ApiError::InvalidInternalKey => "invalid_internal_key",
            ApiError::WebhooksDisabled => "webhooks_disabled",
            ApiError::BadRequest(_) => "bad_request",
        }
    }
}

fn ledger_status(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::Validation(ValidationError::InsufficientBalance { .. })
        | LedgerError::BankDetailsIncomplete => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
        LedgerError::WithdrawalInProgress
        | LedgerError::InvalidTransition { .. }
        | LedgerError::SnapshotLocked(_) => StatusCode::CONFLICT,
        LedgerError::NotFound(_) | LedgerError::UnknownReference(_) => StatusCode::NOT_FOUND,
        LedgerError::GatewayFailure { .. } => StatusCode::BAD_GATEWAY,
        LedgerError::GatewayTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        LedgerError::BalanceInvariant(_)
        | LedgerError::Database(_)
        | LedgerError::CorruptRecord(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = match &self {
            ApiError::Ledger(err) => ErrorResponse {
                code: err.code().to_string(),
                message: err.user_message(),
                withdrawal_id: err.withdrawal_id(),
            },
            other => ErrorResponse {
                code: other.code().to_string(),
                message: other.to_string(),
                withdrawal_id: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    #[test]
    fn maps_ledger_errors_to_status_codes() {
        let cases = [
            (
                LedgerError::Validation(ValidationError::InvalidAmount("-1".to_string())),
                StatusCode::BAD_REQUEST,
            ),
            (
                LedgerError::Validation(ValidationError::InsufficientBalance {
                    requested: Decimal::from(10),
                    available: Decimal::ZERO,
                }),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (LedgerError::WithdrawalInProgress, StatusCode::CONFLICT),
            (LedgerError::NotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (
                LedgerError::GatewayTimeout {
                    withdrawal_id: Uuid::nil(),
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                LedgerError::BalanceInvariant("user-1".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }
}
