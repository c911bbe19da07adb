use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use super::to_response;
use crate::api::ApiError;
use crate::api::extractors::AuthenticatedUser;
use crate::state::AppState;

/// `POST /orders/{order_id}/payment` — create or reuse the Bakong payment.
///
/// Returns the pending payment carrying the KHQR payload. Repeating the
/// call while that payment is still pending returns the same payment
/// without another provider round trip.
pub(super) async fn request_payment(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let payment = state.engine.request_payment(&principal, order_id).await?;
    Ok((StatusCode::CREATED, Json(to_response(&payment))))
}
