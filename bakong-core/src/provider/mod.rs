//! Bakong provider boundary.
//!
//! Everything the reconciliation engine knows about the national payment
//! switch lives behind the [`BakongApi`] trait. Raw provider statuses are
//! normalized into [`SettlementOutcome`] here, at the client boundary,
//! so the engine never inspects provider strings.

pub mod bakong;

pub use bakong::{BakongClient, BakongClientConfig};

use crate::entities::Currency;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// A QR generation request, one per payment attempt.
#[derive(Debug, Clone)]
pub struct QrRequest {
    pub amount: Decimal,
    pub currency: Currency,
    /// Our invoice number; echoed back by the provider as the bill number.
    pub bill_number: String,
    pub description: String,
    /// Where the provider should deliver the settlement webhook.
    pub callback_url: Url,
}

/// A successful QR generation response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrResult {
    /// Provider-assigned transaction reference, used to correlate later
    /// callbacks and polls to the payment.
    pub txn_ref: String,
    /// The KHQR payload string to render for the customer.
    pub qr_string: String,
}

/// A status check response, already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCheck {
    pub outcome: SettlementOutcome,
    /// The provider's verbatim status string, for logging.
    pub raw: String,
    pub message: Option<String>,
}

impl StatusCheck {
    pub fn settled(&self) -> bool {
        self.outcome == SettlementOutcome::Settled
    }
}

/// Provider statuses collapsed to what the engine acts on.
///
/// `Other` covers the intermediate statuses the provider may emit before
/// settlement; the engine logs and ignores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    Settled,
    Failed,
    Expired,
    Other,
}

impl SettlementOutcome {
    /// Normalize a raw provider status string.
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" | "PAID" | "COMPLETED" => SettlementOutcome::Settled,
            "FAILED" | "DECLINED" | "REJECTED" => SettlementOutcome::Failed,
            "EXPIRED" | "TIMEOUT" => SettlementOutcome::Expired,
            _ => SettlementOutcome::Other,
        }
    }
}

/// Transport retry policy for provider calls.
///
/// Defaults mirror the integration contract with the sandbox: three
/// attempts, one second apart, sixty seconds per attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

/// Errors surfaced by the provider client after its retry budget is spent.
///
/// These never escalate past the client boundary as panics; the payment
/// involved stays `pending` (status checks) or is failed by the engine
/// (QR generation).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Connection-level failure (DNS, TLS, reset, timeout) on every attempt.
    #[error("provider unreachable after {attempts} attempts: {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// The provider kept answering with a non-2xx status.
    #[error("provider rejected the request after {attempts} attempts (status {status}): {body}")]
    Rejected {
        attempts: u32,
        status: u16,
        body: String,
    },

    /// A 2xx response that does not carry the required fields. Not
    /// retried: the provider accepted the request, so re-sending it
    /// risks a duplicate transaction.
    #[error("malformed provider response: {0}")]
    Malformed(String),

    /// The configured base URL cannot be combined with an endpoint path.
    #[error("invalid provider url: {0}")]
    Url(#[from] url::ParseError),
}

/// The provider integration surface the engine depends on.
#[async_trait]
pub trait BakongApi: Send + Sync {
    /// Ask the switch to generate a dynamic KHQR for one payment attempt.
    async fn generate_khqr(&self, request: QrRequest) -> Result<QrResult, ProviderError>;

    /// Poll the settlement status of a previously generated transaction.
    async fn check_status(&self, txn_ref: &str) -> Result<StatusCheck, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settlement_normalization_is_case_insensitive() {
        assert_eq!(SettlementOutcome::from_raw("SUCCESS"), SettlementOutcome::Settled);
        assert_eq!(SettlementOutcome::from_raw("success"), SettlementOutcome::Settled);
        assert_eq!(SettlementOutcome::from_raw(" Paid "), SettlementOutcome::Settled);
        assert_eq!(SettlementOutcome::from_raw("FAILED"), SettlementOutcome::Failed);
        assert_eq!(SettlementOutcome::from_raw("declined"), SettlementOutcome::Failed);
        assert_eq!(SettlementOutcome::from_raw("EXPIRED"), SettlementOutcome::Expired);
    }

    #[test]
    fn unknown_statuses_normalize_to_other() {
        for raw in ["PROCESSING", "IN_PROGRESS", "", "42"] {
            assert_eq!(SettlementOutcome::from_raw(raw), SettlementOutcome::Other);
        }
    }

    #[test]
    fn default_retry_policy_matches_the_integration_contract() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.retry_delay, Duration::from_secs(1));
        assert_eq!(policy.attempt_timeout, Duration::from_secs(60));
    }
}
