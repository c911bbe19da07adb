//! `reqwest`-backed client for the Bakong open API.

use super::{ProviderError, QrRequest, QrResult, RetryPolicy, SettlementOutcome, StatusCheck};
use crate::provider::BakongApi;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use url::Url;

/// Connection settings for [`BakongClient`].
#[derive(Debug, Clone)]
pub struct BakongClientConfig {
    /// Root URL of the Bakong open API (sandbox or production).
    pub base_url: Url,
    /// Value for the `x-api-key` header.
    pub api_key: String,
    /// Merchant identity assigned by NBC.
    pub merchant_id: String,
    /// Whether to verify the provider's TLS certificate. Disabled only
    /// for the sandbox deployment profile.
    pub verify_tls: bool,
}

/// Typed HTTP client for the Bakong switch.
///
/// Applies the bounded [`RetryPolicy`]: connection failures and non-2xx
/// responses are retried up to the attempt limit with a fixed delay, then
/// surfaced as a single [`ProviderError`].
#[derive(Debug, Clone)]
pub struct BakongClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    merchant_id: String,
    policy: RetryPolicy,
}

impl BakongClient {
    pub fn new(config: BakongClientConfig, policy: RetryPolicy) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(policy.attempt_timeout)
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url,
            api_key: config.api_key,
            merchant_id: config.merchant_id,
            policy,
        })
    }

    /// Send one request per attempt until a 2xx arrives or the retry
    /// budget is spent. Returns the raw successful response for the
    /// caller to parse.
    async fn send_with_retry(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut last_failure: Option<AttemptFailure> = None;

        for attempt in 1..=self.policy.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.policy.retry_delay).await;
            }

            match build().header("x-api-key", &self.api_key).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    tracing::warn!(attempt, status, "Bakong rejected request, retrying");
                    last_failure = Some(AttemptFailure::Rejected { status, body });
                }
                Err(source) => {
                    tracing::warn!(attempt, error = %source, "Bakong request failed, retrying");
                    last_failure = Some(AttemptFailure::Transport(source));
                }
            }
        }

        let attempts = self.policy.max_attempts;
        Err(match last_failure {
            Some(AttemptFailure::Transport(source)) => ProviderError::Transport { attempts, source },
            Some(AttemptFailure::Rejected { status, body }) => ProviderError::Rejected {
                attempts,
                status,
                body,
            },
            // max_attempts of zero never issues a request
            None => ProviderError::Malformed("retry policy allows zero attempts".to_owned()),
        })
    }
}

enum AttemptFailure {
    Transport(reqwest::Error),
    Rejected { status: u16, body: String },
}

#[async_trait]
impl BakongApi for BakongClient {
    #[tracing::instrument(skip_all, err, fields(bill_number = %request.bill_number))]
    async fn generate_khqr(&self, request: QrRequest) -> Result<QrResult, ProviderError> {
        let url = self.base_url.join("/khqr/generate")?;
        let body = KhqrGenerateRequest {
            merchant_id: &self.merchant_id,
            amount: request.amount,
            currency: request.currency.to_string(),
            bill_number: &request.bill_number,
            description: &request.description,
            callback_url: &request.callback_url,
        };

        let response = self
            .send_with_retry(|| self.http.post(url.clone()).json(&body))
            .await?;

        let parsed: KhqrGenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let txn_ref = parsed
            .transaction_id
            .ok_or_else(|| ProviderError::Malformed("transactionId not returned".to_owned()))?;
        let qr_string = parsed
            .qr_string
            .ok_or_else(|| ProviderError::Malformed("qrString not returned".to_owned()))?;

        Ok(QrResult { txn_ref, qr_string })
    }

    #[tracing::instrument(skip_all, err, fields(txn_ref = %txn_ref))]
    async fn check_status(&self, txn_ref: &str) -> Result<StatusCheck, ProviderError> {
        let url = self.base_url.join(&format!("/payment/status/{txn_ref}"))?;

        let response = self.send_with_retry(|| self.http.get(url.clone())).await?;

        let parsed: TxnStatusResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        Ok(StatusCheck {
            outcome: SettlementOutcome::from_raw(&parsed.status),
            raw: parsed.status,
            message: parsed.message,
        })
    }
}

// Wire types. Field names follow the provider contract, not ours.

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct KhqrGenerateRequest<'a> {
    merchant_id: &'a str,
    amount: Decimal,
    currency: String,
    bill_number: &'a str,
    description: &'a str,
    callback_url: &'a Url,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KhqrGenerateResponse {
    transaction_id: Option<String>,
    qr_string: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TxnStatusResponse {
    status: String,
    message: Option<String>,
}
