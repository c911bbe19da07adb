//! Postgres-backed [`ReconStore`].

use super::{ReconStore, StoreError};
use crate::entities::order::{GetOrderById, Order};
use crate::entities::payment::{
    AttachProviderResult, FindPendingPayment, GetPaymentById, GetPaymentByTxnRef,
    InsertPendingPayment, Payment, disambiguate_invoice, invoice_number,
};
use crate::entities::{Currency, PaymentMethod, PaymentStatus};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.constraint() == Some(constraint))
}

#[derive(Debug, Clone)]
pub struct PgReconStore {
    pool: PgPool,
}

impl PgReconStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn processor(&self) -> DatabaseProcessor {
        DatabaseProcessor {
            pool: self.pool.clone(),
        }
    }
}

#[async_trait]
impl ReconStore for PgReconStore {
    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.processor().process(GetOrderById { order_id }).await?)
    }

    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .processor()
            .process(GetPaymentById { payment_id })
            .await?)
    }

    async fn get_payment_by_txn_ref(&self, txn_ref: &str) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .processor()
            .process(GetPaymentByTxnRef {
                txn_ref: txn_ref.to_owned(),
            })
            .await?)
    }

    async fn create_or_reuse_pending(
        &self,
        order_id: Uuid,
        method: PaymentMethod,
        amount: Decimal,
        currency: Currency,
    ) -> Result<Payment, StoreError> {
        let processor = self.processor();

        // Common path: a pending attempt already exists, reuse it.
        if let Some(existing) = processor
            .process(FindPendingPayment { order_id, method })
            .await?
        {
            return Ok(existing);
        }

        let insert = InsertPendingPayment {
            order_id,
            method,
            invoice_no: invoice_number(order_id, time::OffsetDateTime::now_utc()),
            amount,
            currency,
        };
        let inserted = match processor.process(insert.clone()).await {
            Ok(row) => row,
            // A retry after a failed attempt within the same second
            // reproduces the invoice number of the earlier row, which
            // trips its unique constraint before the pending-payment
            // arbiter is consulted. Suffix the invoice and try once more.
            Err(e) if is_unique_violation(&e, "payments_invoice_no_key") => {
                processor
                    .process(InsertPendingPayment {
                        invoice_no: disambiguate_invoice(&insert.invoice_no),
                        ..insert
                    })
                    .await?
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(payment) = inserted {
            return Ok(payment);
        }

        // Lost the insert race on the partial unique index; the winner
        // committed, so re-read its row.
        processor
            .process(FindPendingPayment { order_id, method })
            .await?
            .ok_or(StoreError::PaymentVanished)
    }

    async fn attach_provider_result(
        &self,
        payment_id: Uuid,
        txn_ref: &str,
        qr_string: &str,
    ) -> Result<(), StoreError> {
        let rows = self
            .processor()
            .process(AttachProviderResult {
                payment_id,
                txn_ref: txn_ref.to_owned(),
                qr_string: qr_string.to_owned(),
            })
            .await?;
        if rows == 0 {
            // Payment left `pending` (or was already claimed) while the
            // provider call was in flight. Documented no-op.
            tracing::warn!(%payment_id, "provider result dropped: payment no longer claimable");
        }
        Ok(())
    }

    async fn settle_paid(&self, payment_id: Uuid) -> Result<(), StoreError> {
        let payment = self
            .processor()
            .process(GetPaymentById { payment_id })
            .await?
            .ok_or(StoreError::PaymentVanished)?;

        let mut tx = self.pool.begin().await?;

        let rows = Payment::settle_paid_tx(&mut tx, payment_id).await?;
        if rows == 0 {
            // Lost a race since the read above; classify on fresh state.
            let current = Payment::status_tx(&mut tx, payment_id)
                .await?
                .ok_or(StoreError::PaymentVanished)?;
            tx.rollback().await?;
            return if current == PaymentStatus::Paid {
                Ok(())
            } else {
                Err(StoreError::InvalidTransition {
                    from: current,
                    to: PaymentStatus::Paid,
                })
            };
        }

        Order::mark_paid_tx(&mut tx, payment.order_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn transition(&self, payment_id: Uuid, to: PaymentStatus) -> Result<(), StoreError> {
        // `paid` is only reachable through settle_paid, which owns the
        // paid_at stamp and the order-side write.
        if to == PaymentStatus::Paid || !PaymentStatus::Pending.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                from: PaymentStatus::Pending,
                to,
            });
        }

        let rows = self
            .processor()
            .process(crate::entities::payment::TransitionPendingPayment { payment_id, to })
            .await?;
        if rows == 1 {
            return Ok(());
        }

        let from = self
            .processor()
            .process(GetPaymentById { payment_id })
            .await?
            .ok_or(StoreError::PaymentVanished)?
            .status;
        Err(StoreError::InvalidTransition { from, to })
    }
}
