use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use super::to_response;
use crate::api::ApiError;
use crate::api::extractors::AuthenticatedUser;
use crate::state::AppState;

/// `POST /payments/{payment_id}/cancel` — cancel a pending payment.
///
/// Terminal payments cannot be cancelled; a paid payment in particular
/// stays paid and the call returns a conflict.
pub(super) async fn cancel_payment(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(payment_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let payment = state.engine.cancel_payment(&principal, payment_id).await?;
    Ok(Json(to_response(&payment)))
}
