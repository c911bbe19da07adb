use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Serialize;
use uuid::Uuid;

use super::{PaymentResponse, to_response};
use crate::api::ApiError;
use crate::api::extractors::AuthenticatedUser;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct CheckResponse {
    /// What the poll did, e.g. "payment marked paid".
    result: String,
    payment: PaymentResponse,
}

/// `POST /payments/{payment_id}/check` — poll the provider and reconcile.
///
/// The customer-facing "I have paid" button. Asks the provider for the
/// transaction status and applies it through the same settlement path as
/// the webhook.
pub(super) async fn manual_check(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(payment_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let (payment, applied) = state.engine.manual_check(&principal, payment_id).await?;
    Ok(Json(CheckResponse {
        result: applied.to_string(),
        payment: to_response(&payment),
    }))
}
