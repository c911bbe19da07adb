//! [`BakongClient`] wire behaviour against a local mock of the provider.

#![allow(clippy::unwrap_used)]

use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Json;
use bakong_core::entities::Currency;
use bakong_core::provider::bakong::{BakongClient, BakongClientConfig};
use bakong_core::provider::{BakongApi, ProviderError, QrRequest, RetryPolicy, SettlementOutcome};
use rust_decimal::Decimal;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

async fn spawn_mock(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn client_for(addr: SocketAddr) -> BakongClient {
    let config = BakongClientConfig {
        base_url: format!("http://{addr}").parse().unwrap(),
        api_key: "test-key".to_owned(),
        merchant_id: "merchant-1".to_owned(),
        verify_tls: true,
    };
    // Short delay so retry tests run fast; same attempt budget as production.
    let policy = RetryPolicy {
        max_attempts: 3,
        retry_delay: Duration::from_millis(10),
        attempt_timeout: Duration::from_secs(2),
    };
    BakongClient::new(config, policy).unwrap()
}

fn qr_request() -> QrRequest {
    QrRequest {
        amount: Decimal::new(1250, 2),
        currency: Currency::Usd,
        bill_number: "INV-20260103053418-abc".to_owned(),
        description: "Order Payment #ORD-20260103-0001".to_owned(),
        callback_url: "https://shop.example.com/api/bakong/callback"
            .parse()
            .unwrap(),
    }
}

#[tokio::test]
async fn generate_succeeds_after_transient_rejections() {
    let calls = Arc::new(AtomicUsize::new(0));
    let handler_calls = calls.clone();
    let router = Router::new().route(
        "/khqr/generate",
        post(move || {
            let calls = handler_calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    (StatusCode::INTERNAL_SERVER_ERROR, "busy").into_response()
                } else {
                    Json(json!({"transactionId": "T-1", "qrString": "000201"})).into_response()
                }
            }
        }),
    );
    let addr = spawn_mock(router).await;

    let result = client_for(addr).generate_khqr(qr_request()).await.unwrap();

    assert_eq!(result.txn_ref, "T-1");
    assert_eq!(result.qr_string, "000201");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn generate_gives_up_after_the_attempt_budget() {
    let calls = Arc::new(AtomicUsize::new(0));
    let handler_calls = calls.clone();
    let router = Router::new().route(
        "/khqr/generate",
        post(move || {
            let calls = handler_calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                (StatusCode::SERVICE_UNAVAILABLE, "maintenance")
            }
        }),
    );
    let addr = spawn_mock(router).await;

    let err = client_for(addr).generate_khqr(qr_request()).await.unwrap_err();

    assert!(matches!(
        err,
        ProviderError::Rejected {
            attempts: 3,
            status: 503,
            ..
        }
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn incomplete_success_body_is_malformed_and_not_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let handler_calls = calls.clone();
    let router = Router::new().route(
        "/khqr/generate",
        post(move || {
            let calls = handler_calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Json(json!({"transactionId": "T-1"}))
            }
        }),
    );
    let addr = spawn_mock(router).await;

    let err = client_for(addr).generate_khqr(qr_request()).await.unwrap_err();

    // A 2xx with missing fields is a contract violation, not a transient
    // condition worth more attempts.
    assert!(matches!(err, ProviderError::Malformed(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn check_status_normalizes_the_raw_status() {
    let router = Router::new().route(
        "/payment/status/{txn_ref}",
        get(|| async { Json(json!({"status": "SUCCESS", "message": "done"})) }),
    );
    let addr = spawn_mock(router).await;

    let check = client_for(addr).check_status("T-1").await.unwrap();

    assert_eq!(check.outcome, SettlementOutcome::Settled);
    assert_eq!(check.raw, "SUCCESS");
    assert_eq!(check.message.as_deref(), Some("done"));
}

#[tokio::test]
async fn check_status_passes_unrecognized_statuses_through_as_other() {
    let router = Router::new().route(
        "/payment/status/{txn_ref}",
        get(|| async { Json(json!({"status": "PROCESSING"})) }),
    );
    let addr = spawn_mock(router).await;

    let check = client_for(addr).check_status("T-1").await.unwrap();

    assert_eq!(check.outcome, SettlementOutcome::Other);
    assert_eq!(check.raw, "PROCESSING");
}
