use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use trade_relay_core::error::ConnectorError;
use trade_relay_core::limits::{ApiRateLimiter, RetryPolicy};

/// HTTP client for the Hyperliquid `info` / `exchange` endpoints.
///
/// The rate limiter is injected: one limiter instance covers the venue, no
/// matter how many clients (mainnet/testnet) share it.
pub struct HyperliquidClient {
    http: Client,
    base_url: String,
    limiter: Arc<ApiRateLimiter>,
    retry: RetryPolicy,
}

impl HyperliquidClient {
    /// # Errors
    /// Returns `ConnectorError::Configuration` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        limiter: Arc<ApiRateLimiter>,
        retry: RetryPolicy,
    ) -> Result<Self, ConnectorError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ConnectorError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            limiter,
            retry,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST to `/info` with retry and rate limiting.
    pub async fn post_info(
        &self,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ConnectorError> {
        self.retry
            .run("hyperliquid:info", || self.post_once("/info", body))
            .await
    }

    /// POST a signed payload to `/exchange` with retry and rate limiting.
    pub async fn post_exchange(
        &self,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, ConnectorError> {
        self.retry
            .run("hyperliquid:exchange", || self.post_once("/exchange", payload))
            .await
    }

    async fn post_once(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ConnectorError> {
        self.limiter.acquire().await;

        let url = format!("{}{}", self.base_url, endpoint);
        tracing::debug!(%url, "POST");

        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();

        if status.as_u16() == 429 {
            return Err(ConnectorError::RateLimited(
                "hyperliquid returned 429".to_string(),
            ));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ConnectorError::api(status.as_u16(), text));
        }

        let json = response.json().await?;
        Ok(json)
    }
}

impl std::fmt::Debug for HyperliquidClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperliquidClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
