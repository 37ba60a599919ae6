//! Bybit connector: v5 linear perpetuals.
//!
//! Same order-group contract as every connector: entry limit with a 1%
//! marketable buffer, one limit leg per DCA entry, reduce-only trigger legs
//! for stop-loss and split take-profits. Price and size grids come from the
//! instrument info endpoint (`tickSize`, `qtyStep`), cached for five
//! minutes, so no tick discovery is needed on this venue.

use crate::client::BybitClient;
use crate::types::{
    parse_decimal, InstrumentsResult, OrderCreateResult, PositionListResult, TickersResult,
    WalletBalanceResult,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use trade_relay_core::config::BybitConfig;
use trade_relay_core::connector::{
    snap_to_increment, Balance, ExchangeConnector, ExchangeKind, ExecutionResult,
    PositionSnapshot, SnapDirection,
};
use trade_relay_core::credentials::Credentials;
use trade_relay_core::error::ConnectorError;
use trade_relay_core::limits::{ApiRateLimiter, RetryPolicy};
use trade_relay_core::risk::SizedOrder;
use trade_relay_core::signal::{Side, Signal};

/// Fallback when an instrument does not publish `minNotionalValue`.
const DEFAULT_MIN_NOTIONAL: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// Marketable-limit buffer applied to the entry price.
const ENTRY_SLIPPAGE_BUFFER: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

const INSTRUMENT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct InstrumentInfo {
    tick_size: Decimal,
    qty_step: Decimal,
    min_order_qty: Decimal,
    min_notional: Decimal,
}

struct CachedInstruments {
    map: Arc<HashMap<String, InstrumentInfo>>,
    fetched_at: Instant,
}

struct Endpoint {
    client: BybitClient,
    instruments: RwLock<Option<CachedInstruments>>,
}

impl Endpoint {
    fn new(client: BybitClient) -> Self {
        Self {
            client,
            instruments: RwLock::new(None),
        }
    }

    async fn instruments(&self) -> Result<Arc<HashMap<String, InstrumentInfo>>, ConnectorError> {
        {
            let guard = self.instruments.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.fetched_at.elapsed() < INSTRUMENT_TTL {
                    return Ok(cached.map.clone());
                }
            }
        }

        let mut guard = self.instruments.write().await;
        if let Some(cached) = guard.as_ref() {
            if cached.fetched_at.elapsed() < INSTRUMENT_TTL {
                return Ok(cached.map.clone());
            }
        }

        let result = self
            .client
            .public_get("/v5/market/instruments-info", "category=linear&limit=1000")
            .await?;
        let parsed: InstrumentsResult = serde_json::from_value(result)?;

        let mut map = HashMap::new();
        for instrument in parsed.list {
            let info = InstrumentInfo {
                tick_size: parse_decimal(&instrument.price_filter.tick_size)
                    .unwrap_or(Decimal::ZERO),
                qty_step: parse_decimal(&instrument.lot_size_filter.qty_step)
                    .unwrap_or(Decimal::ZERO),
                min_order_qty: parse_decimal(&instrument.lot_size_filter.min_order_qty)
                    .unwrap_or(Decimal::ZERO),
                min_notional: parse_decimal(&instrument.lot_size_filter.min_notional_value)
                    .unwrap_or(DEFAULT_MIN_NOTIONAL),
            };
            map.insert(instrument.symbol.to_uppercase(), info);
        }

        let map = Arc::new(map);
        *guard = Some(CachedInstruments {
            map: map.clone(),
            fetched_at: Instant::now(),
        });
        Ok(map)
    }
}

pub struct BybitConnector {
    mainnet: Endpoint,
    testnet: Endpoint,
}

impl BybitConnector {
    /// # Errors
    /// Returns `ConnectorError::Configuration` when the HTTP clients cannot
    /// be built.
    pub fn new(
        config: &BybitConfig,
        limiter: Arc<ApiRateLimiter>,
        retry: RetryPolicy,
    ) -> Result<Self, ConnectorError> {
        Ok(Self {
            mainnet: Endpoint::new(BybitClient::new(
                &config.api_url,
                limiter.clone(),
                retry.clone(),
                config.recv_window_ms,
            )?),
            testnet: Endpoint::new(BybitClient::new(
                &config.testnet_api_url,
                limiter,
                retry,
                config.recv_window_ms,
            )?),
        })
    }

    fn endpoint(&self, testnet: bool) -> &Endpoint {
        if testnet {
            &self.testnet
        } else {
            &self.mainnet
        }
    }

    /// `BTC` → `BTCUSDT` as Bybit spells linear perp symbols.
    fn wire_symbol(symbol: &str) -> String {
        format!("{}USDT", symbol.to_uppercase())
    }

    /// Strips the quote suffix back off a wire symbol.
    fn base_symbol(wire: &str) -> String {
        wire.to_uppercase()
            .trim_end_matches("USDT")
            .to_string()
    }

    async fn resolve_instrument(
        &self,
        endpoint: &Endpoint,
        symbol: &str,
    ) -> Result<InstrumentInfo, ConnectorError> {
        let instruments = endpoint.instruments().await?;
        let wire = Self::wire_symbol(symbol);
        if let Some(info) = instruments.get(&wire) {
            return Ok(info.clone());
        }

        let upper = symbol.to_uppercase();
        let mut suggestions: Vec<String> = instruments
            .keys()
            .map(|s| Self::base_symbol(s))
            .filter(|base| base.contains(&upper) || upper.contains(base.as_str()))
            .collect();
        suggestions.sort();
        suggestions.dedup();
        suggestions.truncate(5);

        Err(ConnectorError::SymbolNotAvailable {
            symbol: upper,
            suggestions,
        })
    }

    async fn set_leverage(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        wire: &str,
        leverage: u8,
    ) -> Result<(), ConnectorError> {
        let body = json!({
            "category": "linear",
            "symbol": wire,
            "buyLeverage": leverage.to_string(),
            "sellLeverage": leverage.to_string(),
        });
        match endpoint
            .client
            .signed_post(credentials, "/v5/position/set-leverage", &body)
            .await
        {
            Ok(_) => Ok(()),
            // 110043: leverage already at the requested value.
            Err(err) if err.to_string().contains("110043")
                || err.to_string().to_lowercase().contains("not modified") =>
            {
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn create_order(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        body: Value,
    ) -> Result<String, ConnectorError> {
        let result = endpoint
            .client
            .signed_post(credentials, "/v5/order/create", &body)
            .await?;
        let parsed: OrderCreateResult = serde_json::from_value(result)?;
        Ok(parsed.order_id)
    }

    fn limit_order_body(
        wire: &str,
        side: Side,
        qty: Decimal,
        price: Decimal,
    ) -> Value {
        json!({
            "category": "linear",
            "symbol": wire,
            "side": order_side(side),
            "orderType": "Limit",
            "qty": qty.normalize().to_string(),
            "price": price.normalize().to_string(),
            "timeInForce": "GTC",
        })
    }

    /// Reduce-only market order fired when price crosses `trigger_price`.
    fn trigger_order_body(
        wire: &str,
        exit_side: Side,
        entry_side: Side,
        qty: Decimal,
        trigger_price: Decimal,
        is_stop: bool,
    ) -> Value {
        // Long positions: TP triggers on a rise (1), SL on a fall (2).
        // Short positions are the mirror image.
        let trigger_direction = match (entry_side, is_stop) {
            (Side::Buy, false) | (Side::Sell, true) => 1,
            (Side::Buy, true) | (Side::Sell, false) => 2,
        };
        json!({
            "category": "linear",
            "symbol": wire,
            "side": order_side(exit_side),
            "orderType": "Market",
            "qty": qty.normalize().to_string(),
            "triggerPrice": trigger_price.normalize().to_string(),
            "triggerDirection": trigger_direction,
            "reduceOnly": true,
        })
    }
}

#[async_trait]
impl ExchangeConnector for BybitConnector {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Bybit
    }

    async fn connect(&self, credentials: &Credentials) -> Result<bool, ConnectorError> {
        self.get_balance(credentials).await.map(|_| true)
    }

    fn validate_credentials(&self, credentials: &Credentials) -> bool {
        credentials.is_usable()
    }

    async fn get_balance(&self, credentials: &Credentials) -> Result<Balance, ConnectorError> {
        let endpoint = self.endpoint(credentials.testnet);
        let result = endpoint
            .client
            .signed_get(
                credentials,
                "/v5/account/wallet-balance",
                "accountType=UNIFIED",
            )
            .await?;
        let parsed: WalletBalanceResult = serde_json::from_value(result)?;

        let account = parsed.list.first().ok_or_else(|| {
            ConnectorError::Serialization("wallet-balance returned no accounts".to_string())
        })?;
        let total = parse_decimal(&account.total_equity).unwrap_or(Decimal::ZERO);
        let available = parse_decimal(&account.total_available_balance).unwrap_or(total);
        Ok(Balance { total, available })
    }

    async fn get_positions(
        &self,
        credentials: &Credentials,
    ) -> Result<Vec<PositionSnapshot>, ConnectorError> {
        let endpoint = self.endpoint(credentials.testnet);
        let result = endpoint
            .client
            .signed_get(
                credentials,
                "/v5/position/list",
                "category=linear&settleCoin=USDT",
            )
            .await?;
        let parsed: PositionListResult = serde_json::from_value(result)?;

        Ok(parsed
            .list
            .into_iter()
            .filter_map(raw_position_to_snapshot)
            .collect())
    }

    async fn get_position(
        &self,
        credentials: &Credentials,
        symbol: &str,
    ) -> Result<Option<PositionSnapshot>, ConnectorError> {
        let endpoint = self.endpoint(credentials.testnet);
        let query = format!("category=linear&symbol={}", Self::wire_symbol(symbol));
        let result = endpoint
            .client
            .signed_get(credentials, "/v5/position/list", &query)
            .await?;
        let parsed: PositionListResult = serde_json::from_value(result)?;

        Ok(parsed.list.into_iter().find_map(raw_position_to_snapshot))
    }

    async fn get_mark_prices(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, Decimal>, ConnectorError> {
        // One tickers call covers the whole category; filter locally.
        let result = self
            .mainnet
            .client
            .public_get("/v5/market/tickers", "category=linear")
            .await?;
        let parsed: TickersResult = serde_json::from_value(result)?;

        let by_wire: HashMap<String, Decimal> = parsed
            .list
            .into_iter()
            .filter_map(|t| parse_decimal(&t.last_price).map(|p| (t.symbol.to_uppercase(), p)))
            .collect();

        let mut prices = HashMap::new();
        for symbol in symbols {
            let upper = symbol.to_uppercase();
            if let Some(price) = by_wire.get(&Self::wire_symbol(&upper)) {
                prices.insert(upper, *price);
            }
        }
        Ok(prices)
    }

    async fn execute_trade(
        &self,
        credentials: &Credentials,
        sized: &SizedOrder,
        signal: &Signal,
    ) -> Result<ExecutionResult, ConnectorError> {
        let endpoint = self.endpoint(credentials.testnet);
        let instrument = self.resolve_instrument(endpoint, &signal.symbol).await?;
        let wire = Self::wire_symbol(&signal.symbol);
        let entry = signal.primary_entry().ok_or_else(|| {
            ConnectorError::OrderRejected("signal has no entry price for order placement".to_string())
        })?;
        let is_buy = signal.side == Side::Buy;

        // Venue minimum notional, scaled up when the account can fund it.
        let mut unit_size = sized.unit_size;
        if sized.notional < instrument.min_notional {
            let balance = self.get_balance(credentials).await?;
            let required_margin = instrument.min_notional / Decimal::from(sized.leverage.max(1));
            if balance.available < required_margin {
                return Err(ConnectorError::BelowMinimumOrder {
                    notional: sized.notional,
                    minimum: instrument.min_notional,
                });
            }
            tracing::info!(
                symbol = %signal.symbol,
                notional = %sized.notional,
                minimum = %instrument.min_notional,
                "scaling order up to venue minimum notional"
            );
            unit_size = instrument.min_notional / entry;
        }

        let unit_size = snap_to_increment(unit_size, instrument.qty_step, SnapDirection::Down);
        if unit_size < instrument.min_order_qty || unit_size <= Decimal::ZERO {
            return Err(ConnectorError::BelowMinimumOrder {
                notional: unit_size * entry,
                minimum: instrument.min_notional,
            });
        }

        if let Err(err) = self
            .set_leverage(endpoint, credentials, &wire, sized.leverage)
            .await
        {
            tracing::warn!(symbol = %signal.symbol, error = %err, "leverage update failed, keeping account setting");
        }

        // Entry leg with marketable buffer.
        let buffered_entry = if is_buy {
            entry * (Decimal::ONE + ENTRY_SLIPPAGE_BUFFER)
        } else {
            entry * (Decimal::ONE - ENTRY_SLIPPAGE_BUFFER)
        };
        let entry_price = snap_price(buffered_entry, instrument.tick_size, signal.side);
        let entry_id = self
            .create_order(
                endpoint,
                credentials,
                Self::limit_order_body(&wire, signal.side, unit_size, entry_price),
            )
            .await?;

        let mut result = ExecutionResult {
            success: true,
            entry_order_id: Some(entry_id),
            executed_size: Some(unit_size),
            ..ExecutionResult::default()
        };

        // DCA legs; per-leg failures reported, not fatal.
        for (index, dca_price) in signal.entries.iter().skip(1).enumerate() {
            let price = snap_price(*dca_price, instrument.tick_size, signal.side);
            match self
                .create_order(
                    endpoint,
                    credentials,
                    Self::limit_order_body(&wire, signal.side, unit_size, price),
                )
                .await
            {
                Ok(id) => {
                    tracing::info!(symbol = %signal.symbol, leg = index + 2, %price, order_id = %id, "DCA entry placed");
                    result.dca_order_ids.push(id);
                }
                Err(err) => {
                    tracing::error!(symbol = %signal.symbol, leg = index + 2, error = %err, "DCA entry failed");
                }
            }
        }

        // Stop-loss trigger.
        if let Some(stop) = signal.primary_stop() {
            let trigger = snap_price(stop, instrument.tick_size, signal.side.opposite());
            match self
                .create_order(
                    endpoint,
                    credentials,
                    Self::trigger_order_body(&wire, signal.side.opposite(), signal.side, unit_size, trigger, true),
                )
                .await
            {
                Ok(id) => result.sl_order_id = Some(id),
                Err(err) => {
                    tracing::error!(symbol = %signal.symbol, error = %err, "stop-loss leg failed");
                }
            }
        }

        // Take-profit legs: even split, last leg absorbs the remainder.
        let tp_count = signal.take_profits.len();
        if tp_count > 0 {
            let per_leg = snap_to_increment(
                unit_size / Decimal::from(tp_count as u64),
                instrument.qty_step,
                SnapDirection::Down,
            );
            let mut allocated = Decimal::ZERO;

            for (index, tp_price) in signal.take_profits.iter().enumerate() {
                let leg_size = if index + 1 == tp_count {
                    unit_size - allocated
                } else {
                    per_leg
                };
                allocated += leg_size;
                if leg_size <= Decimal::ZERO {
                    continue;
                }

                let trigger = snap_price(*tp_price, instrument.tick_size, signal.side.opposite());
                match self
                    .create_order(
                        endpoint,
                        credentials,
                        Self::trigger_order_body(&wire, signal.side.opposite(), signal.side, leg_size, trigger, false),
                    )
                    .await
                {
                    Ok(id) => {
                        tracing::info!(symbol = %signal.symbol, level = index + 1, price = %tp_price, size = %leg_size, "take-profit placed");
                        result.tp_order_ids.push(id);
                    }
                    Err(err) => {
                        tracing::error!(symbol = %signal.symbol, level = index + 1, error = %err, "take-profit leg failed");
                    }
                }
            }
        }

        Ok(result)
    }

    async fn cancel_order(
        &self,
        credentials: &Credentials,
        symbol: &str,
        order_id: &str,
    ) -> Result<(), ConnectorError> {
        let endpoint = self.endpoint(credentials.testnet);
        let body = json!({
            "category": "linear",
            "symbol": Self::wire_symbol(symbol),
            "orderId": order_id,
        });
        endpoint
            .client
            .signed_post(credentials, "/v5/order/cancel", &body)
            .await?;
        Ok(())
    }
}

fn order_side(side: Side) -> &'static str {
    match side {
        Side::Buy => "Buy",
        Side::Sell => "Sell",
    }
}

fn snap_price(price: Decimal, tick: Decimal, side: Side) -> Decimal {
    let direction = match side {
        Side::Buy => SnapDirection::Up,
        Side::Sell => SnapDirection::Down,
    };
    snap_to_increment(price, tick, direction)
}

fn raw_position_to_snapshot(raw: crate::types::RawPosition) -> Option<PositionSnapshot> {
    let size = parse_decimal(&raw.size)?;
    if size.is_zero() {
        return None;
    }
    let side = match raw.side.as_str() {
        "Buy" => Side::Buy,
        "Sell" => Side::Sell,
        _ => return None,
    };
    let signed_size = if side == Side::Sell { -size } else { size };

    Some(PositionSnapshot {
        symbol: BybitConnector::base_symbol(&raw.symbol),
        size: signed_size,
        entry_price: parse_decimal(&raw.avg_price).unwrap_or(Decimal::ZERO),
        unrealized_pnl: parse_decimal(&raw.unrealised_pnl).unwrap_or(Decimal::ZERO),
        side,
    })
}
