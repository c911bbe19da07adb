//! Record store seam for the reconciliation engine.
//!
//! The engine talks to payments and orders exclusively through
//! [`ReconStore`]; the cross-entity transaction boundary (payment
//! settlement + order payment status) lives behind `settle_paid`, so no
//! caller can ever mark one side without the other.

pub mod memory;
pub mod pg;

pub use memory::MemoryStore;
pub use pg::PgReconStore;

use crate::entities::order::Order;
use crate::entities::payment::Payment;
use crate::entities::{Currency, PaymentMethod, PaymentStatus};
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The requested status change is not in the monotonic transition
    /// table. Carries both ends so callers can log the race precisely.
    #[error("illegal payment transition: {from} -> {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    /// A row that was just observed is gone; only reachable through
    /// lost races with concurrent writers.
    #[error("payment vanished mid-operation")]
    PaymentVanished,
}

/// Persistence contract for the reconciliation workflow.
#[async_trait]
pub trait ReconStore: Send + Sync {
    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, StoreError>;

    async fn get_payment_by_txn_ref(&self, txn_ref: &str) -> Result<Option<Payment>, StoreError>;

    /// Return the live `pending` payment for `(order, method)`, creating
    /// it if absent. Idempotent under concurrency: losers of the insert
    /// race re-read the winner's row.
    async fn create_or_reuse_pending(
        &self,
        order_id: Uuid,
        method: PaymentMethod,
        amount: Decimal,
        currency: Currency,
    ) -> Result<Payment, StoreError>;

    /// Persist the provider's transaction reference and QR payload.
    /// Silently does nothing if the payment left `pending` in the
    /// meantime or already carries a reference.
    async fn attach_provider_result(
        &self,
        payment_id: Uuid,
        txn_ref: &str,
        qr_string: &str,
    ) -> Result<(), StoreError>;

    /// Atomically settle a payment: payment to `paid` with `paid_at`
    /// stamped, order payment status to `paid`, order logistics advanced
    /// from `pending` to `processing`. Succeeds without side effects if
    /// the payment is already `paid`; refuses any other terminal state.
    async fn settle_paid(&self, payment_id: Uuid) -> Result<(), StoreError>;

    /// Move a `pending` payment to a terminal status, enforcing the
    /// transition table. `paid` is not a legal target here: settlement
    /// must go through [`ReconStore::settle_paid`], which also stamps
    /// `paid_at` and updates the order.
    async fn transition(&self, payment_id: Uuid, to: PaymentStatus) -> Result<(), StoreError>;
}
