//! The reconciliation engine.
//!
//! Payment state arrives over three independent channels: the synchronous
//! QR-creation response, the provider's webhook callback, and manual
//! polls. All three converge here. The engine owns the decision logic;
//! atomicity comes from the store ([`ReconStore::settle_paid`] is one
//! transaction across the payment and its order), and idempotency from
//! the monotonic transition table plus the explicit duplicate cases
//! below.

use crate::entities::order::Order;
use crate::entities::payment::Payment;
use crate::entities::{Currency, OrderPaymentStatus, PaymentMethod, PaymentStatus};
use crate::provider::{BakongApi, ProviderError, QrRequest, SettlementOutcome};
use crate::store::{ReconStore, StoreError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;
use uuid::Uuid;

/// Opaque authenticated-caller identity, carried for request attribution
/// only. The engine logs it and never interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(pub String);

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Engine-level settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Currency newly created payments settle in.
    pub currency: Currency,
    /// Callback URL handed to the provider at QR generation.
    pub callback_url: Url,
}

/// What a settlement event did, for acknowledgement bodies and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementApplied {
    MarkedPaid,
    /// Duplicate success delivery; nothing changed.
    AlreadyPaid,
    MarkedFailed,
    MarkedExpired,
    /// Stale failure (or lost race) against a payment that already
    /// reached a terminal state; nothing changed.
    AlreadyTerminal,
    /// Intermediate provider status; nothing changed.
    Ignored,
}

impl fmt::Display for SettlementApplied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SettlementApplied::MarkedPaid => "payment marked paid",
            SettlementApplied::AlreadyPaid => "payment already paid",
            SettlementApplied::MarkedFailed => "payment marked failed",
            SettlementApplied::MarkedExpired => "payment marked expired",
            SettlementApplied::AlreadyTerminal => "payment already in a terminal state",
            SettlementApplied::Ignored => "status ignored",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum ReconError {
    #[error("order {0} not found")]
    OrderNotFound(Uuid),

    #[error("order {0} is already paid")]
    OrderAlreadyPaid(Uuid),

    #[error("payment not found")]
    PaymentNotFound,

    #[error("payment has no provider transaction reference")]
    MissingProviderReference,

    #[error("illegal payment transition: {from} -> {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("store error: {0}")]
    Store(sqlx::Error),
}

impl From<StoreError> for ReconError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => ReconError::Store(e),
            StoreError::InvalidTransition { from, to } => {
                ReconError::InvalidTransition { from, to }
            }
            StoreError::PaymentVanished => ReconError::PaymentNotFound,
        }
    }
}

/// Drives payment creation, QR generation and settlement application.
pub struct ReconEngine<S, P> {
    store: S,
    provider: P,
    config: EngineConfig,
    /// Per-order guards serialising the reuse-check / generate / persist
    /// sequence inside this process, so concurrent payment requests for
    /// one order make a single provider call. Settlement paths never
    /// take these, so a slow provider call cannot delay settlements.
    order_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl<S, P> ReconEngine<S, P>
where
    S: ReconStore,
    P: BakongApi,
{
    pub fn new(store: S, provider: P, config: EngineConfig) -> Self {
        Self {
            store,
            provider,
            config,
            order_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create (or reuse) the pending payment for an order and make sure
    /// it carries a KHQR payload.
    ///
    /// Idempotent: repeating the call for an order with a live pending
    /// payment returns that payment without contacting the provider. A
    /// provider failure burns the attempt — the payment moves to
    /// `failed` and the next call starts a fresh one.
    #[tracing::instrument(skip_all, fields(principal = %principal, order_id = %order_id))]
    pub async fn request_payment(
        &self,
        principal: &Principal,
        order_id: Uuid,
    ) -> Result<Payment, ReconError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(ReconError::OrderNotFound(order_id))?;
        if order.payment_status == OrderPaymentStatus::Paid {
            return Err(ReconError::OrderAlreadyPaid(order_id));
        }

        let lock = self.order_lock(order_id).await;
        let guard = lock.lock().await;
        let result = self.generate_for_order(&order).await;
        drop(guard);
        self.release_order_lock(order_id, lock).await;
        result
    }

    async fn generate_for_order(&self, order: &Order) -> Result<Payment, ReconError> {
        let payment = self
            .store
            .create_or_reuse_pending(
                order.order_id,
                PaymentMethod::Bakong,
                order.total_amount,
                self.config.currency,
            )
            .await?;

        if payment.qr_string.is_some() {
            tracing::debug!(payment_id = %payment.payment_id, "reusing pending payment with QR");
            return Ok(payment);
        }

        let request = QrRequest {
            amount: payment.amount,
            currency: payment.currency,
            bill_number: payment.invoice_no.clone(),
            description: format!("Order Payment #{}", order.order_number),
            callback_url: self.config.callback_url.clone(),
        };

        match self.provider.generate_khqr(request).await {
            Ok(qr) => {
                self.store
                    .attach_provider_result(payment.payment_id, &qr.txn_ref, &qr.qr_string)
                    .await?;
                let refreshed = self
                    .store
                    .get_payment(payment.payment_id)
                    .await?
                    .ok_or(ReconError::PaymentNotFound)?;
                tracing::info!(
                    payment_id = %refreshed.payment_id,
                    invoice_no = %refreshed.invoice_no,
                    "KHQR generated"
                );
                Ok(refreshed)
            }
            Err(provider_err) => {
                tracing::error!(
                    payment_id = %payment.payment_id,
                    error = %provider_err,
                    "QR generation failed, failing the payment attempt"
                );
                if let Err(e) = self
                    .store
                    .transition(payment.payment_id, PaymentStatus::Failed)
                    .await
                {
                    match e {
                        StoreError::InvalidTransition { from, .. } => {
                            // Settled or cancelled while the provider call
                            // was in flight; leave it alone.
                            tracing::warn!(
                                payment_id = %payment.payment_id,
                                %from,
                                "payment left pending before failure could be recorded"
                            );
                        }
                        other => return Err(other.into()),
                    }
                }
                Err(ReconError::Provider(provider_err))
            }
        }
    }

    /// Apply a settlement event for a provider transaction reference.
    ///
    /// Shared verbatim by the webhook and the manual poll, so the two
    /// channels cannot diverge. Idempotent and commutative with respect
    /// to redundant delivery: duplicate successes, and stale failures
    /// after a success, change nothing.
    #[tracing::instrument(skip_all, fields(txn_ref = %txn_ref, outcome = ?outcome))]
    pub async fn apply_settlement(
        &self,
        txn_ref: &str,
        outcome: SettlementOutcome,
    ) -> Result<SettlementApplied, ReconError> {
        let Some(payment) = self.store.get_payment_by_txn_ref(txn_ref).await? else {
            tracing::warn!(txn_ref, "settlement for unknown transaction reference");
            return Err(ReconError::PaymentNotFound);
        };

        match outcome {
            SettlementOutcome::Settled => {
                if payment.status == PaymentStatus::Paid {
                    tracing::debug!(payment_id = %payment.payment_id, "duplicate settlement delivery");
                    return Ok(SettlementApplied::AlreadyPaid);
                }

                // An order gets exactly one paid payment, ever. A pending
                // payment whose order settled through another attempt is a
                // reconciliation anomaly, not a settlement.
                let order = self
                    .store
                    .get_order(payment.order_id)
                    .await?
                    .ok_or(ReconError::OrderNotFound(payment.order_id))?;
                if order.payment_status == OrderPaymentStatus::Paid {
                    tracing::warn!(
                        payment_id = %payment.payment_id,
                        order_id = %order.order_id,
                        "settlement for an order that is already paid"
                    );
                    return Err(ReconError::OrderAlreadyPaid(order.order_id));
                }

                self.store.settle_paid(payment.payment_id).await?;
                tracing::info!(
                    payment_id = %payment.payment_id,
                    order_id = %payment.order_id,
                    "payment settled"
                );
                Ok(SettlementApplied::MarkedPaid)
            }
            SettlementOutcome::Failed | SettlementOutcome::Expired => {
                if payment.status.is_terminal() {
                    // Includes the success-then-stale-failure case: paid
                    // stays paid.
                    return Ok(SettlementApplied::AlreadyTerminal);
                }
                let to = if outcome == SettlementOutcome::Failed {
                    PaymentStatus::Failed
                } else {
                    PaymentStatus::Expired
                };
                match self.store.transition(payment.payment_id, to).await {
                    Ok(()) => Ok(if to == PaymentStatus::Failed {
                        SettlementApplied::MarkedFailed
                    } else {
                        SettlementApplied::MarkedExpired
                    }),
                    // Lost a race; the payment reached a terminal state
                    // through another channel first.
                    Err(StoreError::InvalidTransition { .. }) => {
                        Ok(SettlementApplied::AlreadyTerminal)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            SettlementOutcome::Other => {
                tracing::info!(txn_ref, "ignoring intermediate provider status");
                Ok(SettlementApplied::Ignored)
            }
        }
    }

    /// Poll the provider for a payment's settlement status and apply the
    /// result through [`Self::apply_settlement`].
    ///
    /// A provider error leaves the payment untouched: a failed status
    /// check is not evidence of payment failure.
    #[tracing::instrument(skip_all, fields(principal = %principal, payment_id = %payment_id))]
    pub async fn manual_check(
        &self,
        principal: &Principal,
        payment_id: Uuid,
    ) -> Result<(Payment, SettlementApplied), ReconError> {
        let payment = self
            .store
            .get_payment(payment_id)
            .await?
            .ok_or(ReconError::PaymentNotFound)?;
        let txn_ref = payment
            .txn_ref
            .clone()
            .ok_or(ReconError::MissingProviderReference)?;

        let check = self.provider.check_status(&txn_ref).await?;
        tracing::debug!(raw = %check.raw, "provider status check result");

        let applied = self.apply_settlement(&txn_ref, check.outcome).await?;
        let refreshed = self
            .store
            .get_payment(payment_id)
            .await?
            .ok_or(ReconError::PaymentNotFound)?;
        Ok((refreshed, applied))
    }

    /// Cancel a pending payment. Terminal payments, `paid` above all,
    /// cannot be cancelled.
    #[tracing::instrument(skip_all, fields(principal = %principal, payment_id = %payment_id))]
    pub async fn cancel_payment(
        &self,
        principal: &Principal,
        payment_id: Uuid,
    ) -> Result<Payment, ReconError> {
        let payment = self
            .store
            .get_payment(payment_id)
            .await?
            .ok_or(ReconError::PaymentNotFound)?;

        self.store
            .transition(payment.payment_id, PaymentStatus::Cancelled)
            .await?;
        tracing::info!(%payment_id, "payment cancelled");

        self.store
            .get_payment(payment_id)
            .await?
            .ok_or(ReconError::PaymentNotFound)
    }

    async fn order_lock(&self, order_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.order_locks.lock().await;
        locks.entry(order_id).or_default().clone()
    }

    /// Drop the map entry once no request is using it, so the lock table
    /// does not grow with every order ever paid.
    async fn release_order_lock(&self, order_id: Uuid, lock: Arc<Mutex<()>>) {
        drop(lock);
        let mut locks = self.order_locks.lock().await;
        if let Some(entry) = locks.get(&order_id)
            && Arc::strong_count(entry) == 1
        {
            locks.remove(&order_id);
        }
    }
}
