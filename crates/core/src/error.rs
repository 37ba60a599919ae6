//! Error taxonomy shared by every exchange connector.
//!
//! Unlike per-venue error enums, the coordinator and the monitoring engine
//! need to branch on venue-agnostic failure classes (insufficient balance,
//! unknown symbol, tick rejection, rate limiting), so the taxonomy lives in
//! `core` and connectors map their wire responses into it.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors produced by exchange connectors.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Network-level failure (connect, DNS, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// Request timed out.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Venue said we are calling too fast.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Non-success HTTP response.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error body from the venue.
        message: String,
    },

    /// Credentials rejected or malformed.
    #[error("invalid credentials: {0}")]
    CredentialInvalid(String),

    /// Account cannot fund the order.
    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance {
        available: Decimal,
        required: Decimal,
    },

    /// Order notional is below the venue minimum and the balance cannot
    /// support scaling it up.
    #[error("order below venue minimum: notional {notional}, minimum {minimum}")]
    BelowMinimumOrder { notional: Decimal, minimum: Decimal },

    /// Symbol is not tradeable on the venue.
    #[error("symbol not available: {symbol}{}", fmt_suggestions(.suggestions))]
    SymbolNotAvailable {
        symbol: String,
        /// Near-matches from the venue universe, when derivable.
        suggestions: Vec<String>,
    },

    /// Every candidate tick size was rejected.
    #[error("tick discovery exhausted for {symbol} after {attempts} attempts: {last_error}")]
    TickRejected {
        symbol: String,
        attempts: u32,
        last_error: String,
    },

    /// Venue rejected the order for a non-tick reason.
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// No position exists for the symbol. Normal while waiting for entry.
    #[error("no position for {symbol}")]
    PositionNotFound { symbol: String },

    /// Reported fill deviates too far from the intended price.
    #[error("slippage exceeded: expected {expected}, filled {actual} (limit {limit_pct}%)")]
    SlippageExceeded {
        expected: Decimal,
        actual: Decimal,
        limit_pct: Decimal,
    },

    /// Response body could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Connector misconfiguration (bad URL, zero rate limit, missing key).
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ConnectorError {
    /// Creates an API error from status code and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Stable code used when a result is persisted or reported upstream.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::RateLimited(_) => "rate_limited",
            Self::Api { .. } => "api",
            Self::CredentialInvalid(_) => "credential_invalid",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::BelowMinimumOrder { .. } => "below_minimum_order",
            Self::SymbolNotAvailable { .. } => "symbol_not_available",
            Self::TickRejected { .. } => "tick_rejected",
            Self::OrderRejected(_) => "order_rejected",
            Self::PositionNotFound { .. } => "position_not_found",
            Self::SlippageExceeded { .. } => "slippage_exceeded",
            Self::Serialization(_) => "serialization",
            Self::Configuration(_) => "configuration",
        }
    }

    /// True when retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// True when the failure looks like venue-side throttling.
    ///
    /// Matched on message content as well as the typed variant, because
    /// some venues report throttling inside an HTTP 200 body.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited(_) => true,
            Self::Api { status, message } => *status == 429 || looks_rate_limited(message),
            Self::Network(message) | Self::OrderRejected(message) => looks_rate_limited(message),
            _ => false,
        }
    }
}

fn fmt_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (similar: {})", suggestions.join(", "))
    }
}

/// Message-content heuristic for throttling responses.
fn looks_rate_limited(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["rate limit", "too many requests", "429", "throttle"]
        .iter()
        .any(|needle| lower.contains(needle))
}

impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else if err.is_decode() {
            Self::Serialization(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Rejections from the risk engine. These are per-subscriber outcomes, not
/// faults: the subscriber is skipped, everyone else proceeds.
#[derive(Debug, Error, PartialEq)]
pub enum RiskError {
    #[error("balance must be positive, got {0}")]
    NonPositiveBalance(Decimal),

    #[error("balance {balance} below minimum {minimum}")]
    BalanceBelowMinimum { balance: Decimal, minimum: Decimal },

    #[error("signal has no entry price to size against")]
    MissingEntryPrice,

    #[error("entry price must be positive, got {0}")]
    InvalidEntryPrice(Decimal),
}
