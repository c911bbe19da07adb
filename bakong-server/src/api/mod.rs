//! HTTP API surface.
//!
//! # Endpoints
//!
//! - `POST /orders/{order_id}/payment`    – create or reuse the Bakong payment
//! - `POST /payments/{payment_id}/check`  – poll the provider and reconcile
//! - `POST /payments/{payment_id}/cancel` – cancel a pending payment
//! - `POST /bakong/callback`              – provider settlement webhook

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Router, routing::post};
use bakong_core::recon::ReconError;

use crate::state::AppState;

pub mod callback;
pub mod extractors;
pub mod payments;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(payments::router())
        .route("/bakong/callback", post(callback::bakong_callback))
}

/// Errors surfaced to API callers, mapped from engine errors.
#[derive(Debug)]
pub(crate) struct ApiError(pub ReconError);

impl From<ReconError> for ApiError {
    fn from(err: ReconError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self.0 {
            ReconError::OrderNotFound(_) => {
                (StatusCode::NOT_FOUND, "order not found").into_response()
            }
            ReconError::PaymentNotFound => {
                (StatusCode::NOT_FOUND, "payment not found").into_response()
            }
            ReconError::OrderAlreadyPaid(_) => {
                (StatusCode::CONFLICT, "order is already paid").into_response()
            }
            ReconError::MissingProviderReference => (
                StatusCode::CONFLICT,
                "payment has no provider transaction reference",
            )
                .into_response(),
            e @ ReconError::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, e.to_string()).into_response()
            }
            ReconError::Provider(e) => {
                tracing::error!(error = %e, "Bakong provider error");
                (StatusCode::BAD_GATEWAY, "payment provider unavailable").into_response()
            }
            ReconError::Store(e) => {
                tracing::error!(error = %e, "API database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}
