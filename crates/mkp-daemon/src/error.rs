//! HTTP error mapping.
//!
//! Handlers return `Result<_, ApiError>`. Domain rejections
//! ([`MarketError`]) become 4xx/502 responses carrying the error text and a
//! stable `kind`; anything else is logged and returned as an opaque 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mkp_ledger::MarketError;

use crate::api_types::ErrorResponse;

#[derive(Debug)]
pub struct ApiError(anyhow::Error);

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(e: E) -> Self {
        ApiError(e.into())
    }
}

pub fn status_for(e: &MarketError) -> StatusCode {
    match e {
        MarketError::Validation(_) => StatusCode::BAD_REQUEST,
        MarketError::Unauthenticated => StatusCode::UNAUTHORIZED,
        MarketError::Forbidden(_) => StatusCode::FORBIDDEN,
        MarketError::NotFound { .. } => StatusCode::NOT_FOUND,
        MarketError::InvalidStateTransition { .. } | MarketError::NotPurchasable(_) => {
            StatusCode::CONFLICT
        }
        MarketError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        MarketError::PaymentFailed(_) | MarketError::ExternalAuthFailed(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0.downcast_ref::<MarketError>() {
            Some(e) => {
                let status = status_for(e);
                if status.is_server_error() {
                    tracing::warn!(kind = e.kind(), error = %e, "upstream failure");
                }
                (
                    status,
                    Json(ErrorResponse {
                        error: e.to_string(),
                        kind: e.kind().to_string(),
                    }),
                )
                    .into_response()
            }
            None => {
                tracing::error!(error = ?self.0, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "internal error".to_string(),
                        kind: "internal".to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }
}
