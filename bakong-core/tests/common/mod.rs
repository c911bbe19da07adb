//! Shared fixtures for the integration suites.

use async_trait::async_trait;
use bakong_core::entities::order::Order;
use bakong_core::entities::{Currency, OrderPaymentStatus, OrderStatus};
use bakong_core::provider::{
    BakongApi, ProviderError, QrRequest, QrResult, SettlementOutcome, StatusCheck,
};
use bakong_core::recon::{EngineConfig, Principal, ReconEngine};
use bakong_core::store::MemoryStore;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// A scriptable [`BakongApi`]. Clones share state so tests can inspect
/// call counts after handing the provider to the engine.
#[derive(Clone, Default)]
pub struct MockProvider {
    inner: Arc<MockInner>,
}

#[derive(Default)]
struct MockInner {
    generate_calls: AtomicUsize,
    check_calls: AtomicUsize,
    fail_generate: AtomicBool,
    generate_delay_ms: AtomicU64,
    txn_counter: AtomicUsize,
    check_queue: Mutex<VecDeque<Result<StatusCheck, ProviderError>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_generate(&self, fail: bool) {
        self.inner.fail_generate.store(fail, Ordering::SeqCst);
    }

    /// Delay each generate call, to widen race windows in concurrency tests.
    pub fn set_generate_delay_ms(&self, ms: u64) {
        self.inner.generate_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn queue_check(&self, result: Result<StatusCheck, ProviderError>) {
        self.inner.check_queue.lock().unwrap().push_back(result);
    }

    pub fn generate_calls(&self) -> usize {
        self.inner.generate_calls.load(Ordering::SeqCst)
    }

    pub fn check_calls(&self) -> usize {
        self.inner.check_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BakongApi for MockProvider {
    async fn generate_khqr(&self, _request: QrRequest) -> Result<QrResult, ProviderError> {
        self.inner.generate_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.inner.generate_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }

        if self.inner.fail_generate.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected {
                attempts: 3,
                status: 500,
                body: "sandbox unavailable".to_owned(),
            });
        }

        let n = self.inner.txn_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(QrResult {
            txn_ref: format!("T{n}"),
            qr_string: "00020101021229190015bakong@khqr5204".to_owned(),
        })
    }

    async fn check_status(&self, _txn_ref: &str) -> Result<StatusCheck, ProviderError> {
        self.inner.check_calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .check_queue
            .lock()
            .unwrap()
            .pop_front()
            .expect("no status check queued on MockProvider")
    }
}

pub fn settled_check() -> StatusCheck {
    StatusCheck {
        outcome: SettlementOutcome::Settled,
        raw: "SUCCESS".to_owned(),
        message: Some("settled".to_owned()),
    }
}

pub fn principal() -> Principal {
    Principal("user-42".to_owned())
}

/// Seed an unpaid order the way the out-of-scope checkout flow would.
pub fn sample_order(total: Decimal) -> Order {
    let order_id = Uuid::new_v4();
    let now = time::OffsetDateTime::now_utc();
    Order {
        order_id,
        user_id: Uuid::new_v4(),
        order_number: format!("ORD-20260103-{}", &order_id.simple().to_string()[..4]),
        total_amount: total,
        status: OrderStatus::Pending,
        payment_status: OrderPaymentStatus::Unpaid,
        created_at: now,
        updated_at: now,
    }
}

pub fn engine(
    store: MemoryStore,
    provider: MockProvider,
) -> ReconEngine<MemoryStore, MockProvider> {
    ReconEngine::new(
        store,
        provider,
        EngineConfig {
            currency: Currency::Usd,
            callback_url: "https://shop.example.com/api/bakong/callback"
                .parse()
                .unwrap(),
        },
    )
}
