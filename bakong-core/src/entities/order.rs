use crate::entities::{OrderPaymentStatus, OrderStatus};
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use uuid::Uuid;

/// An order row. Created by the (out-of-scope) checkout flow; the
/// reconciliation engine only ever mutates `payment_status` and the
/// `pending -> processing` logistics step that rides along with it.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Order {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub order_number: String,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub payment_status: OrderPaymentStatus,
    pub created_at: time::OffsetDateTime,
    pub updated_at: time::OffsetDateTime,
}

#[derive(Debug, Clone, Copy)]
pub struct GetOrderById {
    pub order_id: Uuid,
}

impl Processor<GetOrderById> for DatabaseProcessor {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetOrderById")]
    async fn process(&self, query: GetOrderById) -> Result<Option<Order>, sqlx::Error> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT order_id, user_id, order_number, total_amount,
                   status, payment_status, created_at, updated_at
            FROM orders
            WHERE order_id = $1
            "#,
        )
        .bind(query.order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }
}

impl Order {
    /// Mark the order as paid inside an open transaction.
    ///
    /// Sets `payment_status` to `paid` and advances the logistics status
    /// from `pending` to `processing`. A no-op when the order is already
    /// paid, so redundant settlement deliveries never double-apply.
    pub async fn mark_paid_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        order_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = 'paid',
                status = CASE WHEN status = 'pending'
                              THEN 'processing'::order_status
                              ELSE status END,
                updated_at = NOW()
            WHERE order_id = $1
              AND payment_status <> 'paid'
            "#,
        )
        .bind(order_id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }
}
