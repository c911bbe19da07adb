use crate::entities::{Currency, PaymentMethod, PaymentStatus};
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use uuid::Uuid;

/// A payment attempt against an order. An order may accumulate several
/// payments over time (a retry after a failed QR generation gets a fresh
/// row), but at most one may be `pending` per method and at most one may
/// ever reach `paid`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub method: PaymentMethod,
    pub invoice_no: String,
    /// Transaction reference assigned by Bakong. Null until QR generation
    /// succeeds; globally unique so callbacks can never cross payments.
    pub txn_ref: Option<String>,
    pub qr_string: Option<String>,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub paid_at: Option<time::OffsetDateTime>,
    pub created_at: time::OffsetDateTime,
    pub updated_at: time::OffsetDateTime,
}

/// Build the unique invoice number for a new payment:
/// `INV-<compact utc timestamp>-<order id>`.
///
/// The timestamp alone is not collision-proof (two orders can pay in the
/// same second), hence the order id suffix; the unique constraint on the
/// column backstops both.
pub fn invoice_number(order_id: Uuid, at: time::OffsetDateTime) -> String {
    format!(
        "INV-{:04}{:02}{:02}{:02}{:02}{:02}-{}",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second(),
        order_id.simple(),
    )
}

/// Suffix an invoice number that collided with an existing row.
///
/// Only reachable when the same order retries a payment within the same
/// wall-clock second, which reproduces the timestamp component exactly.
pub fn disambiguate_invoice(base: &str) -> String {
    let tag = Uuid::new_v4().simple().to_string();
    format!("{base}-{}", &tag[..6])
}

const PAYMENT_COLUMNS: &str = "payment_id, order_id, method, invoice_no, txn_ref, qr_string, \
     amount, currency, status, paid_at, created_at, updated_at";

#[derive(Debug, Clone, Copy)]
pub struct GetPaymentById {
    pub payment_id: Uuid,
}

impl Processor<GetPaymentById> for DatabaseProcessor {
    type Output = Option<Payment>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPaymentById")]
    async fn process(&self, query: GetPaymentById) -> Result<Option<Payment>, sqlx::Error> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE payment_id = $1"
        ))
        .bind(query.payment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payment)
    }
}

#[derive(Debug, Clone)]
pub struct GetPaymentByTxnRef {
    pub txn_ref: String,
}

impl Processor<GetPaymentByTxnRef> for DatabaseProcessor {
    type Output = Option<Payment>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPaymentByTxnRef")]
    async fn process(&self, query: GetPaymentByTxnRef) -> Result<Option<Payment>, sqlx::Error> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE txn_ref = $1"
        ))
        .bind(query.txn_ref)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payment)
    }
}

/// Look up the live `pending` payment for an (order, method) pair, if any.
#[derive(Debug, Clone, Copy)]
pub struct FindPendingPayment {
    pub order_id: Uuid,
    pub method: PaymentMethod,
}

impl Processor<FindPendingPayment> for DatabaseProcessor {
    type Output = Option<Payment>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:FindPendingPayment")]
    async fn process(&self, query: FindPendingPayment) -> Result<Option<Payment>, sqlx::Error> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments \
             WHERE order_id = $1 AND method = $2 AND status = 'pending'"
        ))
        .bind(query.order_id)
        .bind(query.method)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payment)
    }
}

/// Insert a new `pending` payment.
///
/// Races on the partial unique index: if another request inserted the
/// pending row first, this yields `None` (ON CONFLICT DO NOTHING) and the
/// caller re-reads the winner's row.
#[derive(Debug, Clone)]
pub struct InsertPendingPayment {
    pub order_id: Uuid,
    pub method: PaymentMethod,
    pub invoice_no: String,
    pub amount: Decimal,
    pub currency: Currency,
}

impl Processor<InsertPendingPayment> for DatabaseProcessor {
    type Output = Option<Payment>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertPendingPayment")]
    async fn process(&self, insert: InsertPendingPayment) -> Result<Option<Payment>, sqlx::Error> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "INSERT INTO payments (order_id, method, invoice_no, amount, currency) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (order_id, method) WHERE status = 'pending' DO NOTHING \
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(insert.order_id)
        .bind(insert.method)
        .bind(insert.invoice_no)
        .bind(insert.amount)
        .bind(insert.currency)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payment)
    }
}

/// Persist the provider's QR generation result on a payment.
///
/// Guarded twice: the payment must still be `pending` (a slow provider
/// response must not resurrect a cancelled or expired payment) and must
/// not already carry a `txn_ref` (a duplicate generation attempt must not
/// clobber the reference the provider will call back with).
#[derive(Debug, Clone)]
pub struct AttachProviderResult {
    pub payment_id: Uuid,
    pub txn_ref: String,
    pub qr_string: String,
}

impl Processor<AttachProviderResult> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:AttachProviderResult")]
    async fn process(&self, cmd: AttachProviderResult) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET txn_ref = $2, qr_string = $3, updated_at = NOW()
            WHERE payment_id = $1
              AND status = 'pending'
              AND txn_ref IS NULL
            "#,
        )
        .bind(cmd.payment_id)
        .bind(cmd.txn_ref)
        .bind(cmd.qr_string)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Move a `pending` payment to a terminal status.
///
/// The `status = 'pending'` predicate is the transition table in SQL form:
/// a payment that already reached a terminal state is left untouched and
/// the command reports zero rows, letting the store classify the refusal.
#[derive(Debug, Clone, Copy)]
pub struct TransitionPendingPayment {
    pub payment_id: Uuid,
    pub to: PaymentStatus,
}

impl Processor<TransitionPendingPayment> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:TransitionPendingPayment")]
    async fn process(&self, cmd: TransitionPendingPayment) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, updated_at = NOW()
            WHERE payment_id = $1
              AND status = 'pending'
            "#,
        )
        .bind(cmd.payment_id)
        .bind(cmd.to)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

impl Payment {
    /// Settle a `pending` payment inside an open transaction: status to
    /// `paid`, `paid_at` stamped. Returns the number of rows updated so
    /// the caller can distinguish the idempotent-duplicate case.
    pub async fn settle_paid_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        payment_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'paid', paid_at = NOW(), updated_at = NOW()
            WHERE payment_id = $1
              AND status = 'pending'
            "#,
        )
        .bind(payment_id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// Read the current status of a payment inside an open transaction.
    pub async fn status_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        payment_id: Uuid,
    ) -> Result<Option<PaymentStatus>, sqlx::Error> {
        let status = sqlx::query_scalar::<_, PaymentStatus>(
            "SELECT status FROM payments WHERE payment_id = $1",
        )
        .bind(payment_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn invoice_number_has_prefix_timestamp_and_order_id() {
        let order_id = Uuid::from_u128(0xfeed);
        let at = datetime!(2026-01-03 05:34:18 UTC);
        let invoice = invoice_number(order_id, at);
        assert_eq!(
            invoice,
            format!("INV-20260103053418-{}", order_id.simple())
        );
    }

    #[test]
    fn invoice_numbers_differ_across_orders_in_the_same_second() {
        let at = datetime!(2026-01-03 05:34:18 UTC);
        let a = invoice_number(Uuid::from_u128(1), at);
        let b = invoice_number(Uuid::from_u128(2), at);
        assert_ne!(a, b);
    }

    #[test]
    fn disambiguated_invoice_keeps_the_base_and_never_repeats() {
        let at = datetime!(2026-01-03 05:34:18 UTC);
        let base = invoice_number(Uuid::from_u128(1), at);
        let a = disambiguate_invoice(&base);
        let b = disambiguate_invoice(&base);
        assert!(a.starts_with(&format!("{base}-")));
        assert_ne!(a, base);
        assert_ne!(a, b);
    }
}
