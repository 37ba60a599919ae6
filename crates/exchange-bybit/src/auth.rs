//! HMAC-SHA256 authentication for the Bybit v5 API.
//!
//! The signature is computed over `timestamp + api_key + recv_window +
//! payload`, where the payload is the query string for GET requests and the
//! JSON body for POST requests. Credentials vary per subscriber, so signing
//! is stateless: the caller passes the credential record per request.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use trade_relay_core::credentials::Credentials;

type HmacSha256 = Hmac<Sha256>;

/// Headers required on authenticated Bybit requests.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    /// X-BAPI-API-KEY header.
    pub api_key: String,

    /// X-BAPI-SIGN header (lowercase hex).
    pub signature: String,

    /// X-BAPI-TIMESTAMP header (Unix milliseconds).
    pub timestamp: String,

    /// X-BAPI-RECV-WINDOW header (milliseconds).
    pub recv_window: String,
}

impl SignedHeaders {
    /// Returns headers as tuples for reqwest.
    #[must_use]
    pub fn as_tuples(&self) -> [(&'static str, &str); 4] {
        [
            ("X-BAPI-API-KEY", &self.api_key),
            ("X-BAPI-SIGN", &self.signature),
            ("X-BAPI-TIMESTAMP", &self.timestamp),
            ("X-BAPI-RECV-WINDOW", &self.recv_window),
        ]
    }
}

/// Signs one request.
///
/// # Arguments
/// * `credentials` - The subscriber's API key and secret
/// * `timestamp_ms` - Unix timestamp in milliseconds
/// * `recv_window_ms` - Request validity window
/// * `payload` - Query string (GET) or JSON body (POST), empty when none
#[must_use]
pub fn sign_request(
    credentials: &Credentials,
    timestamp_ms: u64,
    recv_window_ms: u64,
    payload: &str,
) -> SignedHeaders {
    let timestamp = timestamp_ms.to_string();
    let recv_window = recv_window_ms.to_string();
    let prehash = format!("{}{}{}{}", timestamp, credentials.api_key, recv_window, payload);

    let mut mac = HmacSha256::new_from_slice(credentials.expose_secret().as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(prehash.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    SignedHeaders {
        api_key: credentials.api_key.clone(),
        signature,
        timestamp,
        recv_window,
    }
}
