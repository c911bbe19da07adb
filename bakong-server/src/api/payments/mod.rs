//! Payment API handlers.
//!
//! These endpoints are called by the shop frontend on behalf of an
//! authenticated user (forwarded in the `X-Authenticated-User` header).

use axum::{Router, routing::post};
use bakong_core::entities::payment::Payment;
use bakong_core::entities::{Currency, PaymentStatus};
use serde::Serialize;
use uuid::Uuid;

use crate::state::AppState;

mod cancel_payment;
mod manual_check;
mod request_payment;

/// Build the payment API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/orders/{order_id}/payment",
            post(request_payment::request_payment),
        )
        .route(
            "/payments/{payment_id}/check",
            post(manual_check::manual_check),
        )
        .route(
            "/payments/{payment_id}/cancel",
            post(cancel_payment::cancel_payment),
        )
}

/// A payment as returned to API callers.
#[derive(Debug, Serialize)]
pub(super) struct PaymentResponse {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub invoice_no: String,
    pub amount: rust_decimal::Decimal,
    pub currency: Currency,
    pub status: PaymentStatus,
    /// EMV KHQR payload for the frontend to render. Absent while QR
    /// generation has not succeeded.
    pub qr_string: Option<String>,
    pub txn_ref: Option<String>,
    pub paid_at: Option<i64>,
    pub created_at: i64,
}

/// Convert a `Payment` (DB model) into a `PaymentResponse` (API model).
pub(super) fn to_response(payment: &Payment) -> PaymentResponse {
    PaymentResponse {
        payment_id: payment.payment_id,
        order_id: payment.order_id,
        invoice_no: payment.invoice_no.clone(),
        amount: payment.amount,
        currency: payment.currency,
        status: payment.status,
        qr_string: payment.qr_string.clone(),
        txn_ref: payment.txn_ref.clone(),
        paid_at: payment.paid_at.map(|t| t.unix_timestamp()),
        created_at: payment.created_at.unix_timestamp(),
    }
}
