//! Exchange credentials as received from the storage layer.
//!
//! Encryption at rest is the storage layer's concern; this engine only ever
//! sees decrypted material and keeps it out of logs.

use crate::connector::ExchangeKind;
use secrecy::{ExposeSecret, SecretString};

/// Opaque credential record for one subscriber on one venue.
///
/// `api_key` doubles as the wallet address for wallet-signed venues;
/// `api_secret` holds the API secret or the wallet private key.
#[derive(Clone)]
pub struct Credentials {
    pub exchange: ExchangeKind,
    pub api_key: String,
    api_secret: SecretString,
    pub passphrase: Option<String>,
    pub testnet: bool,
}

impl Credentials {
    #[must_use]
    pub fn new(
        exchange: ExchangeKind,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            exchange,
            api_key: api_key.into(),
            api_secret: SecretString::from(api_secret.into()),
            passphrase: None,
            testnet: false,
        }
    }

    #[must_use]
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    #[must_use]
    pub fn with_testnet(mut self, testnet: bool) -> Self {
        self.testnet = testnet;
        self
    }

    /// Exposes the secret for signing. Never log the return value.
    #[must_use]
    pub fn expose_secret(&self) -> &str {
        self.api_secret.expose_secret()
    }

    /// True when both halves of the credential are present.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.expose_secret().is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("exchange", &self.exchange)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("testnet", &self.testnet)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secret() {
        let creds = Credentials::new(ExchangeKind::Bybit, "key-id", "super-secret");
        let output = format!("{creds:?}");
        assert!(output.contains("key-id"));
        assert!(!output.contains("super-secret"));
        assert!(output.contains("[REDACTED]"));
    }

    #[test]
    fn usable_requires_both_halves() {
        let creds = Credentials::new(ExchangeKind::Hyperliquid, "0xabc", "0xdeadbeef");
        assert!(creds.is_usable());

        let missing_secret = Credentials::new(ExchangeKind::Hyperliquid, "0xabc", "");
        assert!(!missing_secret.is_usable());

        let missing_key = Credentials::new(ExchangeKind::Hyperliquid, "", "0xdeadbeef");
        assert!(!missing_key.is_usable());
    }

    #[test]
    fn builder_sets_testnet_and_passphrase() {
        let creds = Credentials::new(ExchangeKind::Bybit, "k", "s")
            .with_passphrase("p")
            .with_testnet(true);
        assert!(creds.testnet);
        assert_eq!(creds.passphrase.as_deref(), Some("p"));
    }
}
