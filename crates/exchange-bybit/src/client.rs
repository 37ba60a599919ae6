use crate::auth;
use crate::types::Envelope;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use trade_relay_core::credentials::Credentials;
use trade_relay_core::error::ConnectorError;
use trade_relay_core::limits::{ApiRateLimiter, RetryPolicy};

/// Bybit v5 return codes that mean throttling.
const RATE_LIMIT_CODES: &[i64] = &[10006, 10018];

/// Return codes for bad keys, bad signatures, or expired timestamps.
const CREDENTIAL_CODES: &[i64] = &[10003, 10004, 10005, 33004];

/// Rate-limited, retrying HTTP client for Bybit v5 endpoints.
///
/// One client serves every subscriber: credentials are passed per request
/// because each call is signed with the calling subscriber's secret.
pub struct BybitClient {
    http: Client,
    base_url: String,
    limiter: Arc<ApiRateLimiter>,
    retry: RetryPolicy,
    recv_window_ms: u64,
}

impl BybitClient {
    /// # Errors
    /// Returns `ConnectorError::Configuration` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        limiter: Arc<ApiRateLimiter>,
        retry: RetryPolicy,
        recv_window_ms: u64,
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
            recv_window_ms,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Public (unauthenticated) GET, e.g. tickers and instrument info.
    pub async fn public_get(&self, path: &str, query: &str) -> Result<Value, ConnectorError> {
        self.retry
            .run("bybit:public", || self.get_once(path, query, None))
            .await
    }

    /// Authenticated GET; `query` must be the exact string sent on the wire.
    pub async fn signed_get(
        &self,
        credentials: &Credentials,
        path: &str,
        query: &str,
    ) -> Result<Value, ConnectorError> {
        self.retry
            .run("bybit:get", || self.get_once(path, query, Some(credentials)))
            .await
    }

    /// Authenticated POST with a JSON body.
    pub async fn signed_post(
        &self,
        credentials: &Credentials,
        path: &str,
        body: &Value,
    ) -> Result<Value, ConnectorError> {
        self.retry
            .run("bybit:post", || self.post_once(path, body, credentials))
            .await
    }

    async fn get_once(
        &self,
        path: &str,
        query: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Value, ConnectorError> {
        self.limiter.acquire().await;

        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };
        tracing::debug!(%url, "GET");

        let mut request = self.http.get(&url);
        if let Some(credentials) = credentials {
            let headers = auth::sign_request(
                credentials,
                chrono::Utc::now().timestamp_millis() as u64,
                self.recv_window_ms,
                query,
            );
            for (name, value) in headers.as_tuples() {
                request = request.header(name, value);
            }
        }

        let response = request.send().await?;
        Self::handle_response(response).await
    }

    async fn post_once(
        &self,
        path: &str,
        body: &Value,
        credentials: &Credentials,
    ) -> Result<Value, ConnectorError> {
        self.limiter.acquire().await;

        let url = format!("{}{}", self.base_url, path);
        let payload = serde_json::to_string(body)?;
        tracing::debug!(%url, body_len = payload.len(), "POST");

        let headers = auth::sign_request(
            credentials,
            chrono::Utc::now().timestamp_millis() as u64,
            self.recv_window_ms,
            &payload,
        );

        let mut request = self
            .http
            .post(&url)
            .header("Content-Type", "application/json");
        for (name, value) in headers.as_tuples() {
            request = request.header(name, value);
        }

        let response = request.body(payload).send().await?;
        Self::handle_response(response).await
    }

    /// Maps HTTP and venue-level failures into the shared taxonomy and
    /// unwraps the `result` payload on success.
    async fn handle_response(response: reqwest::Response) -> Result<Value, ConnectorError> {
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ConnectorError::RateLimited("bybit returned 429".to_string()));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ConnectorError::api(status.as_u16(), text));
        }

        let envelope: Envelope = response.json().await?;
        if envelope.ret_code == 0 {
            return Ok(envelope.result);
        }

        let message = format!("retCode {}: {}", envelope.ret_code, envelope.ret_msg);
        if RATE_LIMIT_CODES.contains(&envelope.ret_code) {
            return Err(ConnectorError::RateLimited(message));
        }
        if CREDENTIAL_CODES.contains(&envelope.ret_code) {
            return Err(ConnectorError::CredentialInvalid(message));
        }
        Err(ConnectorError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

impl std::fmt::Debug for BybitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BybitClient")
            .field("base_url", &self.base_url)
            .field("recv_window_ms", &self.recv_window_ms)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trade_relay_core::connector::ExchangeKind;
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(url: &str) -> BybitClient {
        let limiter = Arc::new(ApiRateLimiter::new(100, 100).unwrap());
        let retry = RetryPolicy::new(
            1,
            Duration::from_millis(1),
            Duration::from_millis(10),
        );
        BybitClient::new(url, limiter, retry, 5000).unwrap()
    }

    fn creds() -> Credentials {
        Credentials::new(ExchangeKind::Bybit, "key", "secret")
    }

    #[tokio::test]
    async fn signed_get_sends_auth_headers_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v5/position/list"))
            .and(query_param("category", "linear"))
            .and(header_exists("X-BAPI-API-KEY"))
            .and(header_exists("X-BAPI-SIGN"))
            .and(header_exists("X-BAPI-TIMESTAMP"))
            .and(header_exists("X-BAPI-RECV-WINDOW"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "retCode": 0, "retMsg": "OK", "result": {"list": []}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server.uri())
            .signed_get(&creds(), "/v5/position/list", "category=linear")
            .await
            .unwrap();
        assert!(result.get("list").is_some());
    }

    #[tokio::test]
    async fn venue_rate_limit_code_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "retCode": 10006, "retMsg": "Too many visits!", "result": {}
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .public_get("/v5/market/tickers", "category=linear")
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::RateLimited(_)));
    }

    #[tokio::test]
    async fn credential_code_maps_to_credential_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "retCode": 10003, "retMsg": "API key is invalid.", "result": {}
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .signed_get(&creds(), "/v5/account/wallet-balance", "accountType=UNIFIED")
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::CredentialInvalid(_)));
    }

    #[tokio::test]
    async fn http_429_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .public_get("/v5/market/tickers", "")
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::RateLimited(_)));
    }

    #[tokio::test]
    async fn business_error_carries_ret_code_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "retCode": 110007, "retMsg": "ab not enough for new order", "result": {}
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .public_get("/v5/market/tickers", "")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("110007"));
    }
}
