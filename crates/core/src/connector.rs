//! The exchange-connector abstraction.
//!
//! Each venue implements [`ExchangeConnector`]; everything above the trait
//! (coordinator, monitoring engine) selects behavior through
//! [`ExchangeKind`] and calls trait methods only — never by inspecting the
//! concrete connector type.

use crate::credentials::Credentials;
use crate::error::ConnectorError;
use crate::risk::SizedOrder;
use crate::signal::{Side, Signal};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Supported venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Hyperliquid,
    Bybit,
}

impl ExchangeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hyperliquid => "hyperliquid",
            Self::Bybit => "bybit",
        }
    }
}

impl std::fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExchangeKind {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hyperliquid" => Ok(Self::Hyperliquid),
            "bybit" => Ok(Self::Bybit),
            other => Err(ConnectorError::Configuration(format!(
                "unknown exchange: {other}"
            ))),
        }
    }
}

/// Account balance in quote currency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub total: Decimal,
    pub available: Decimal,
}

/// A live position as reported by a venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    /// Signed size: positive long, negative short.
    pub size: Decimal,
    pub entry_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub side: Side,
}

impl PositionSnapshot {
    /// Price implied by entry and unrealized PnL.
    ///
    /// This is `entry + pnl / size`, which is exact for a single fill but
    /// only an approximation once DCA legs have filled at different prices.
    /// Known accuracy limitation of the position-based monitoring strategy.
    #[must_use]
    pub fn approx_mark_price(&self) -> Decimal {
        if self.size.is_zero() {
            self.entry_price
        } else {
            self.entry_price + self.unrealized_pnl / self.size
        }
    }
}

/// Error details carried inside a persisted or reported execution result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable taxonomy code, see [`ConnectorError::code`].
    pub code: String,
    pub message: String,
}

impl From<&ConnectorError> for ErrorInfo {
    fn from(err: &ConnectorError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one subscriber's trade execution: the venue order ids for
/// every placed leg plus the effective fill price when known.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub entry_order_id: Option<String>,
    pub dca_order_ids: Vec<String>,
    pub tp_order_ids: Vec<String>,
    pub sl_order_id: Option<String>,
    pub fill_price: Option<Decimal>,
    pub executed_size: Option<Decimal>,
    pub error: Option<ErrorInfo>,
}

impl ExecutionResult {
    #[must_use]
    pub fn failure(err: &ConnectorError) -> Self {
        Self {
            success: false,
            error: Some(ErrorInfo::from(err)),
            ..Self::default()
        }
    }

    /// Order ids for legs that rest on the book and may need cancellation
    /// when the signal completes (entry + DCA legs).
    #[must_use]
    pub fn open_entry_order_ids(&self) -> Vec<String> {
        self.entry_order_id
            .iter()
            .chain(self.dca_order_ids.iter())
            .cloned()
            .collect()
    }
}

/// Uniform venue operations. All methods are async and must apply the
/// connector's rate limiter and retry policy internally.
#[async_trait]
pub trait ExchangeConnector: Send + Sync {
    /// Which venue this connector speaks to.
    fn kind(&self) -> ExchangeKind;

    /// Verifies the credentials against the venue (authenticated no-op call).
    async fn connect(&self, credentials: &Credentials) -> Result<bool, ConnectorError>;

    /// Cheap local shape check; no network.
    fn validate_credentials(&self, credentials: &Credentials) -> bool;

    async fn get_balance(&self, credentials: &Credentials) -> Result<Balance, ConnectorError>;

    async fn get_positions(
        &self,
        credentials: &Credentials,
    ) -> Result<Vec<PositionSnapshot>, ConnectorError>;

    /// Position for one symbol; `Ok(None)` means flat, which is the normal
    /// "still waiting for entry" answer, not an error.
    async fn get_position(
        &self,
        credentials: &Credentials,
        symbol: &str,
    ) -> Result<Option<PositionSnapshot>, ConnectorError>;

    /// Mark prices for a set of symbols in as few venue calls as possible.
    async fn get_mark_prices(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, Decimal>, ConnectorError>;

    /// Places the full order group for a sized signal: entry, DCA legs,
    /// split take-profits, reduce-only stop.
    async fn execute_trade(
        &self,
        credentials: &Credentials,
        sized: &SizedOrder,
        signal: &Signal,
    ) -> Result<ExecutionResult, ConnectorError>;

    async fn cancel_order(
        &self,
        credentials: &Credentials,
        symbol: &str,
        order_id: &str,
    ) -> Result<(), ConnectorError>;
}

/// Which way to round when snapping a value onto a venue grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapDirection {
    Up,
    Down,
}

/// Snaps `value` onto multiples of `step`. Idempotent: snapping an
/// already-snapped value returns it unchanged. A non-positive step is a
/// no-op grid.
#[must_use]
pub fn snap_to_increment(value: Decimal, step: Decimal, direction: SnapDirection) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    let steps = value / step;
    let steps = match direction {
        SnapDirection::Up => steps.ceil(),
        SnapDirection::Down => steps.floor(),
    };
    (steps * step).normalize()
}

/// Default bound for [`enforce_slippage`], in percent.
pub const MAX_SLIPPAGE_PERCENT: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Sanity check on a reported fill: rejects executions that deviate from the
/// intended price by more than `limit_pct` percent in either direction.
///
/// # Errors
/// Returns `ConnectorError::SlippageExceeded` past the bound.
pub fn enforce_slippage(
    expected: Decimal,
    actual: Decimal,
    limit_pct: Decimal,
) -> Result<(), ConnectorError> {
    if expected <= Decimal::ZERO || actual <= Decimal::ZERO {
        return Ok(());
    }
    let deviation_pct = ((actual - expected) / expected * Decimal::ONE_HUNDRED).abs();
    if deviation_pct > limit_pct {
        return Err(ConnectorError::SlippageExceeded {
            expected,
            actual,
            limit_pct,
        });
    }
    Ok(())
}

/// Connector lookup by venue, built once at startup and shared.
#[derive(Default, Clone)]
pub struct ConnectorRegistry {
    connectors: HashMap<ExchangeKind, Arc<dyn ExchangeConnector>>,
}

impl ConnectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, connector: Arc<dyn ExchangeConnector>) {
        self.connectors.insert(connector.kind(), connector);
    }

    #[must_use]
    pub fn get(&self, kind: ExchangeKind) -> Option<Arc<dyn ExchangeConnector>> {
        self.connectors.get(&kind).cloned()
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<ExchangeKind> {
        self.connectors.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn exchange_kind_round_trips() {
        assert_eq!("hyperliquid".parse::<ExchangeKind>().unwrap(), ExchangeKind::Hyperliquid);
        assert_eq!("Bybit".parse::<ExchangeKind>().unwrap(), ExchangeKind::Bybit);
        assert!("binance".parse::<ExchangeKind>().is_err());
        assert_eq!(ExchangeKind::Hyperliquid.to_string(), "hyperliquid");
    }

    #[test]
    fn approx_mark_price_from_pnl() {
        let position = PositionSnapshot {
            symbol: "BTC".to_string(),
            size: dec!(0.5),
            entry_price: dec!(60000),
            unrealized_pnl: dec!(500),
            side: Side::Buy,
        };
        // 60000 + 500/0.5 = 61000
        assert_eq!(position.approx_mark_price(), dec!(61000));
    }

    #[test]
    fn approx_mark_price_short_position() {
        let position = PositionSnapshot {
            symbol: "ETH".to_string(),
            size: dec!(-2),
            entry_price: dec!(3000),
            unrealized_pnl: dec!(100),
            side: Side::Sell,
        };
        // Short in profit: price moved down. 3000 + 100/-2 = 2950.
        assert_eq!(position.approx_mark_price(), dec!(2950));
    }

    #[test]
    fn open_entry_ids_collects_entry_and_dca() {
        let result = ExecutionResult {
            success: true,
            entry_order_id: Some("1".to_string()),
            dca_order_ids: vec!["2".to_string(), "3".to_string()],
            tp_order_ids: vec!["4".to_string()],
            sl_order_id: Some("5".to_string()),
            ..ExecutionResult::default()
        };
        assert_eq!(result.open_entry_order_ids(), vec!["1", "2", "3"]);
    }

    #[test]
    fn snap_to_increment_is_idempotent() {
        let cases = [
            (dec!(60000.3), dec!(0.5)),
            (dec!(3127.77), dec!(0.01)),
            (dec!(0.061847), dec!(0.0001)),
        ];
        for (value, step) in cases {
            for direction in [SnapDirection::Up, SnapDirection::Down] {
                let once = snap_to_increment(value, step, direction);
                let twice = snap_to_increment(once, step, direction);
                assert_eq!(once, twice, "value {value} step {step}");
            }
        }
    }

    #[test]
    fn snap_directions_round_correctly() {
        assert_eq!(
            snap_to_increment(dec!(100.3), dec!(0.5), SnapDirection::Up),
            dec!(100.5)
        );
        assert_eq!(
            snap_to_increment(dec!(100.3), dec!(0.5), SnapDirection::Down),
            dec!(100)
        );
        // Zero step leaves the value alone.
        assert_eq!(
            snap_to_increment(dec!(100.3), dec!(0), SnapDirection::Up),
            dec!(100.3)
        );
    }

    #[test]
    fn slippage_within_bound_passes() {
        assert!(enforce_slippage(dec!(60000), dec!(60100), MAX_SLIPPAGE_PERCENT).is_ok());
        assert!(enforce_slippage(dec!(60000), dec!(59950), MAX_SLIPPAGE_PERCENT).is_ok());
    }

    #[test]
    fn excessive_slippage_rejected_both_directions() {
        // 0.5% of 60000 is 300.
        assert!(enforce_slippage(dec!(60000), dec!(60400), MAX_SLIPPAGE_PERCENT).is_err());
        assert!(enforce_slippage(dec!(60000), dec!(59600), MAX_SLIPPAGE_PERCENT).is_err());
    }

    #[test]
    fn degenerate_prices_skip_the_check() {
        assert!(enforce_slippage(dec!(0), dec!(60000), MAX_SLIPPAGE_PERCENT).is_ok());
        assert!(enforce_slippage(dec!(60000), dec!(0), MAX_SLIPPAGE_PERCENT).is_ok());
    }

    #[test]
    fn failure_result_carries_taxonomy_code() {
        let err = ConnectorError::OrderRejected("post-only would cross".to_string());
        let result = ExecutionResult::failure(&err);
        assert!(!result.success);
        assert_eq!(result.error.as_ref().unwrap().code, "order_rejected");
    }
}
