//! Provider settlement webhook.

use axum::{Json, extract::State, response::IntoResponse};
use bakong_core::provider::SettlementOutcome;
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::state::AppState;

/// Callback body as posted by the Bakong switch.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    transaction_id: String,
    status: String,
}

#[derive(Debug, Serialize)]
struct CallbackAck {
    acknowledged: bool,
    /// What the settlement did, e.g. "payment marked paid".
    result: String,
}

/// `POST /bakong/callback` — apply a settlement pushed by the provider.
///
/// Raw provider statuses are normalized here at the boundary; the engine
/// only ever sees [`SettlementOutcome`] values. Duplicate deliveries are
/// acknowledged without changing anything. Unknown transaction
/// references get a 404 so the provider's redelivery shows up in its
/// logs rather than silently draining.
pub async fn bakong_callback(
    State(state): State<AppState>,
    Json(payload): Json<CallbackPayload>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(
        txn_ref = %payload.transaction_id,
        raw = %payload.status,
        "Bakong callback received"
    );

    let outcome = SettlementOutcome::from_raw(&payload.status);
    let applied = state
        .engine
        .apply_settlement(&payload.transaction_id, outcome)
        .await?;

    Ok(Json(CallbackAck {
        acknowledged: true,
        result: applied.to_string(),
    }))
}
