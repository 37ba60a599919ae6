//! Wire types for the Bybit v5 REST API.
//!
//! Bybit wraps everything in `{retCode, retMsg, result}` and reports all
//! numbers as strings.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

/// Top-level v5 envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "retCode")]
    pub ret_code: i64,
    #[serde(rename = "retMsg", default)]
    pub ret_msg: String,
    #[serde(default)]
    pub result: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletBalanceResult {
    #[serde(default)]
    pub list: Vec<WalletAccount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletAccount {
    #[serde(rename = "totalEquity", default)]
    pub total_equity: String,
    #[serde(rename = "totalAvailableBalance", default)]
    pub total_available_balance: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PositionListResult {
    #[serde(default)]
    pub list: Vec<RawPosition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPosition {
    pub symbol: String,
    /// "Buy", "Sell", or "None" when flat.
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub size: String,
    #[serde(rename = "avgPrice", default)]
    pub avg_price: String,
    #[serde(rename = "unrealisedPnl", default)]
    pub unrealised_pnl: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TickersResult {
    #[serde(default)]
    pub list: Vec<RawTicker>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTicker {
    pub symbol: String,
    #[serde(rename = "lastPrice", default)]
    pub last_price: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentsResult {
    #[serde(default)]
    pub list: Vec<RawInstrument>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInstrument {
    pub symbol: String,
    #[serde(rename = "priceFilter", default)]
    pub price_filter: PriceFilter,
    #[serde(rename = "lotSizeFilter", default)]
    pub lot_size_filter: LotSizeFilter,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceFilter {
    #[serde(rename = "tickSize", default)]
    pub tick_size: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LotSizeFilter {
    #[serde(rename = "qtyStep", default)]
    pub qty_step: String,
    #[serde(rename = "minOrderQty", default)]
    pub min_order_qty: String,
    #[serde(rename = "minNotionalValue", default)]
    pub min_notional_value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderCreateResult {
    #[serde(rename = "orderId", default)]
    pub order_id: String,
}

/// Parses one of Bybit's stringly-typed decimal fields, treating missing or
/// empty strings as absent.
#[must_use]
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    if raw.is_empty() {
        return None;
    }
    Decimal::from_str(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn envelope_parses_with_and_without_result() {
        let with: Envelope = serde_json::from_str(
            r#"{"retCode":0,"retMsg":"OK","result":{"list":[]}}"#,
        )
        .unwrap();
        assert_eq!(with.ret_code, 0);

        let without: Envelope = serde_json::from_str(r#"{"retCode":10001,"retMsg":"bad"}"#).unwrap();
        assert_eq!(without.ret_code, 10001);
        assert!(without.result.is_null());
    }

    #[test]
    fn position_list_parses_strings() {
        let raw = r#"{"list":[{"symbol":"BTCUSDT","side":"Buy","size":"0.5","avgPrice":"60000.5","unrealisedPnl":"12.3"}]}"#;
        let result: PositionListResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.list.len(), 1);
        assert_eq!(parse_decimal(&result.list[0].size), Some(dec!(0.5)));
        assert_eq!(parse_decimal(&result.list[0].avg_price), Some(dec!(60000.5)));
    }

    #[test]
    fn instrument_filters_parse() {
        let raw = r#"{"list":[{"symbol":"ETHUSDT",
            "priceFilter":{"tickSize":"0.01"},
            "lotSizeFilter":{"qtyStep":"0.001","minOrderQty":"0.001","minNotionalValue":"5"}}]}"#;
        let result: InstrumentsResult = serde_json::from_str(raw).unwrap();
        let instrument = &result.list[0];
        assert_eq!(parse_decimal(&instrument.price_filter.tick_size), Some(dec!(0.01)));
        assert_eq!(parse_decimal(&instrument.lot_size_filter.min_notional_value), Some(dec!(5)));
    }

    #[test]
    fn empty_decimal_fields_are_absent() {
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("abc"), None);
        assert_eq!(parse_decimal("1.5"), Some(dec!(1.5)));
    }
}
