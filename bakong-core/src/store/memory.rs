//! In-memory [`ReconStore`] for tests and lightweight fakes.
//!
//! A single mutex over both tables stands in for the database
//! transaction: `settle_paid` mutates the payment and its order under
//! one guard, matching the atomicity the Postgres store gets from sqlx
//! transactions.

use super::{ReconStore, StoreError};
use crate::entities::order::Order;
use crate::entities::payment::{Payment, invoice_number};
use crate::entities::{Currency, OrderPaymentStatus, OrderStatus, PaymentMethod, PaymentStatus};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    orders: HashMap<Uuid, Order>,
    payments: HashMap<Uuid, Payment>,
}

/// Shared, clonable in-memory store. Clones see the same data.
#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an order, as the out-of-scope checkout flow would.
    pub async fn insert_order(&self, order: Order) {
        let mut inner = self.inner.lock().await;
        inner.orders.insert(order.order_id, order);
    }

    /// Snapshot every payment belonging to an order.
    pub async fn payments_for_order(&self, order_id: Uuid) -> Vec<Payment> {
        let inner = self.inner.lock().await;
        inner
            .payments
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ReconStore for MemoryStore {
    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.orders.get(&order_id).cloned())
    }

    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.payments.get(&payment_id).cloned())
    }

    async fn get_payment_by_txn_ref(&self, txn_ref: &str) -> Result<Option<Payment>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .payments
            .values()
            .find(|p| p.txn_ref.as_deref() == Some(txn_ref))
            .cloned())
    }

    async fn create_or_reuse_pending(
        &self,
        order_id: Uuid,
        method: PaymentMethod,
        amount: Decimal,
        currency: Currency,
    ) -> Result<Payment, StoreError> {
        let mut inner = self.inner.lock().await;

        if let Some(existing) = inner
            .payments
            .values()
            .find(|p| {
                p.order_id == order_id
                    && p.method == method
                    && p.status == PaymentStatus::Pending
            })
            .cloned()
        {
            return Ok(existing);
        }

        let now = time::OffsetDateTime::now_utc();
        let payment = Payment {
            payment_id: Uuid::new_v4(),
            order_id,
            method,
            invoice_no: invoice_number(order_id, now),
            txn_ref: None,
            qr_string: None,
            amount,
            currency,
            status: PaymentStatus::Pending,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        inner.payments.insert(payment.payment_id, payment.clone());
        Ok(payment)
    }

    async fn attach_provider_result(
        &self,
        payment_id: Uuid,
        txn_ref: &str,
        qr_string: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(payment) = inner.payments.get_mut(&payment_id)
            && payment.status == PaymentStatus::Pending
            && payment.txn_ref.is_none()
        {
            payment.txn_ref = Some(txn_ref.to_owned());
            payment.qr_string = Some(qr_string.to_owned());
            payment.updated_at = time::OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn settle_paid(&self, payment_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;

        let order_id = {
            let payment = inner
                .payments
                .get_mut(&payment_id)
                .ok_or(StoreError::PaymentVanished)?;
            match payment.status {
                PaymentStatus::Paid => return Ok(()),
                PaymentStatus::Pending => {
                    let now = time::OffsetDateTime::now_utc();
                    payment.status = PaymentStatus::Paid;
                    payment.paid_at = Some(now);
                    payment.updated_at = now;
                    payment.order_id
                }
                from => {
                    return Err(StoreError::InvalidTransition {
                        from,
                        to: PaymentStatus::Paid,
                    });
                }
            }
        };

        if let Some(order) = inner.orders.get_mut(&order_id)
            && order.payment_status != OrderPaymentStatus::Paid
        {
            order.payment_status = OrderPaymentStatus::Paid;
            if order.status == OrderStatus::Pending {
                order.status = OrderStatus::Processing;
            }
            order.updated_at = time::OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn transition(&self, payment_id: Uuid, to: PaymentStatus) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let payment = inner
            .payments
            .get_mut(&payment_id)
            .ok_or(StoreError::PaymentVanished)?;

        if to == PaymentStatus::Paid || !payment.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                from: payment.status,
                to,
            });
        }
        payment.status = to;
        payment.updated_at = time::OffsetDateTime::now_utc();
        Ok(())
    }
}
