//! Hyperliquid connector: wallet-signed order placement with tick discovery.
//!
//! Order flow for one sized signal: resolve the asset (with near-match
//! suggestions when unknown), enforce the venue minimum notional, set
//! leverage, place the entry as a marketable GTC limit with a 1% buffer,
//! then one limit leg per DCA entry, a reduce-only stop trigger, and the
//! take-profit size split across every level with the last leg absorbing
//! the rounding remainder.

use crate::client::HyperliquidClient;
use crate::meta::{AssetMeta, MetaCache};
use crate::signing::{sign_action, signature_to_hex};
use crate::ticks::{self, TickCache};
use crate::wallet;
use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use trade_relay_core::config::HyperliquidConfig;
use trade_relay_core::connector::{
    enforce_slippage, Balance, ExchangeConnector, ExchangeKind, ExecutionResult,
    PositionSnapshot, MAX_SLIPPAGE_PERCENT,
};
use trade_relay_core::credentials::Credentials;
use trade_relay_core::error::ConnectorError;
use trade_relay_core::limits::{ApiRateLimiter, RetryPolicy};
use trade_relay_core::risk::SizedOrder;
use trade_relay_core::signal::{Side, Signal};

/// Smallest order notional the venue accepts, in USDC.
const MIN_NOTIONAL: Decimal = Decimal::from_parts(10, 0, 0, false, 0);

/// Marketable-limit buffer applied to the entry price.
const ENTRY_SLIPPAGE_BUFFER: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

const MAX_TICK_ATTEMPTS: usize = 8;

struct Endpoint {
    client: HyperliquidClient,
    meta: MetaCache,
}

#[derive(Debug)]
struct PlacedOrder {
    order_id: Option<String>,
    fill_price: Option<Decimal>,
}

pub struct HyperliquidConnector {
    mainnet: Endpoint,
    testnet: Endpoint,
    ticks: TickCache,
}

impl HyperliquidConnector {
    /// # Errors
    /// Returns `ConnectorError::Configuration` when the HTTP clients cannot
    /// be built.
    pub fn new(
        config: &HyperliquidConfig,
        limiter: Arc<ApiRateLimiter>,
        retry: RetryPolicy,
    ) -> Result<Self, ConnectorError> {
        Ok(Self {
            mainnet: Endpoint {
                client: HyperliquidClient::new(&config.api_url, limiter.clone(), retry.clone())?,
                meta: MetaCache::default(),
            },
            testnet: Endpoint {
                client: HyperliquidClient::new(&config.testnet_api_url, limiter, retry)?,
                meta: MetaCache::default(),
            },
            ticks: TickCache::load(&config.tick_cache_path),
        })
    }

    fn endpoint(&self, testnet: bool) -> &Endpoint {
        if testnet {
            &self.testnet
        } else {
            &self.mainnet
        }
    }

    async fn clearinghouse_state(
        &self,
        credentials: &Credentials,
    ) -> Result<Value, ConnectorError> {
        let endpoint = self.endpoint(credentials.testnet);
        endpoint
            .client
            .post_info(&json!({
                "type": "clearinghouseState",
                "user": credentials.api_key,
            }))
            .await
    }

    /// Symbol → asset metadata, or `SymbolNotAvailable` with near-matches.
    async fn resolve_asset(
        &self,
        endpoint: &Endpoint,
        symbol: &str,
    ) -> Result<AssetMeta, ConnectorError> {
        let assets = endpoint.meta.assets(&endpoint.client).await?;
        let upper = symbol.to_uppercase();
        if let Some(meta) = assets.get(&upper) {
            return Ok(meta.clone());
        }

        let mut suggestions: Vec<String> = assets
            .keys()
            .filter(|name| name.contains(&upper) || upper.contains(name.as_str()))
            .cloned()
            .collect();
        suggestions.sort();
        suggestions.truncate(5);

        Err(ConnectorError::SymbolNotAvailable {
            symbol: upper,
            suggestions,
        })
    }

    /// Signs and submits one exchange action.
    async fn place_action(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        action: &Value,
    ) -> Result<Value, ConnectorError> {
        let signing_wallet = wallet::wallet_from_private_key(credentials.expose_secret())
            .map_err(|e| ConnectorError::CredentialInvalid(e.to_string()))?;

        let nonce = chrono::Utc::now().timestamp_millis() as u64;
        let signature = sign_action(&signing_wallet, action, nonce)
            .await
            .map_err(|e| ConnectorError::CredentialInvalid(format!("signing failed: {e}")))?;

        let payload = json!({
            "action": action,
            "nonce": nonce,
            "signature": signature_to_hex(&signature),
            "vaultAddress": null,
        });

        let response = endpoint.client.post_exchange(&payload).await?;
        check_exchange_response(response)
    }

    async fn place_order(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        order: Value,
    ) -> Result<PlacedOrder, ConnectorError> {
        let action = json!({
            "type": "order",
            "orders": [order],
            "grouping": "na",
        });
        let response = self.place_action(endpoint, credentials, &action).await?;
        Ok(parse_order_response(&response))
    }

    /// Places the entry leg, walking the tick candidate ladder when the
    /// venue rejects the price grid, and caches the first accepted tick.
    async fn place_entry_with_tick_fallback(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        asset: &AssetMeta,
        symbol: &str,
        side: Side,
        size: Decimal,
        base_price: Decimal,
    ) -> Result<PlacedOrder, ConnectorError> {
        let candidates = ticks::candidate_ticks(symbol, Some(asset.px_decimals()), &self.ticks);
        let attempts = candidates.len().min(MAX_TICK_ATTEMPTS);
        let mut last_error = String::new();

        for (attempt, tick) in candidates.into_iter().take(MAX_TICK_ATTEMPTS).enumerate() {
            let snapped = ticks::snap_to_tick(base_price, tick, side);
            let order = build_limit_order(asset.asset_id, side == Side::Buy, snapped, size, false);

            tracing::debug!(symbol, attempt = attempt + 1, %tick, price = %snapped, "placing entry");
            match self.place_order(endpoint, credentials, order).await {
                Ok(placed) => {
                    if ticks::lookup_table_tick(symbol).is_none()
                        && self.ticks.get(symbol) != Some(tick)
                    {
                        self.ticks.record(symbol, tick);
                    }
                    return Ok(placed);
                }
                Err(ConnectorError::OrderRejected(message))
                    if ticks::is_tick_rejection(&message) =>
                {
                    tracing::warn!(symbol, %tick, %message, "tick rejected, trying next candidate");
                    last_error = message;
                }
                Err(other) => return Err(other),
            }
        }

        Err(ConnectorError::TickRejected {
            symbol: symbol.to_string(),
            attempts: attempts as u32,
            last_error,
        })
    }

    /// Reduce-only trigger leg (stop-loss or take-profit).
    async fn place_trigger_leg(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        asset: &AssetMeta,
        symbol: &str,
        exit_side: Side,
        size: Decimal,
        trigger_price: Decimal,
        kind: &str,
    ) -> Result<PlacedOrder, ConnectorError> {
        let tick = self.ticks.resolve(symbol, trigger_price);
        let snapped = ticks::snap_to_tick(trigger_price, tick, exit_side);
        let order = json!({
            "a": asset.asset_id,
            "b": exit_side == Side::Buy,
            "p": snapped.normalize().to_string(),
            "s": size.normalize().to_string(),
            "r": true,
            "t": {
                "trigger": {
                    "isMarket": true,
                    "triggerPx": snapped.normalize().to_string(),
                    "tpsl": kind,
                }
            },
        });
        self.place_order(endpoint, credentials, order).await
    }
}

#[async_trait]
impl ExchangeConnector for HyperliquidConnector {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Hyperliquid
    }

    async fn connect(&self, credentials: &Credentials) -> Result<bool, ConnectorError> {
        let state = self.clearinghouse_state(credentials).await?;
        Ok(state.get("marginSummary").is_some())
    }

    fn validate_credentials(&self, credentials: &Credentials) -> bool {
        credentials.is_usable() && wallet::looks_like_address(&credentials.api_key)
    }

    async fn get_balance(&self, credentials: &Credentials) -> Result<Balance, ConnectorError> {
        let state = self.clearinghouse_state(credentials).await?;
        let summary = state
            .get("marginSummary")
            .ok_or_else(|| ConnectorError::Serialization("missing marginSummary".to_string()))?;

        let total = decimal_field(summary, "accountValue").unwrap_or(Decimal::ZERO);
        let available = decimal_field(&state, "withdrawable").unwrap_or(total);

        Ok(Balance { total, available })
    }

    async fn get_positions(
        &self,
        credentials: &Credentials,
    ) -> Result<Vec<PositionSnapshot>, ConnectorError> {
        let state = self.clearinghouse_state(credentials).await?;
        let mut positions = Vec::new();

        let Some(asset_positions) = state.get("assetPositions").and_then(Value::as_array) else {
            return Ok(positions);
        };

        for entry in asset_positions {
            let Some(position) = entry.get("position") else {
                continue;
            };
            let Some(symbol) = position.get("coin").and_then(Value::as_str) else {
                continue;
            };
            let size = decimal_field(position, "szi").unwrap_or(Decimal::ZERO);
            if size.is_zero() {
                continue;
            }

            positions.push(PositionSnapshot {
                symbol: symbol.to_uppercase(),
                size,
                entry_price: decimal_field(position, "entryPx").unwrap_or(Decimal::ZERO),
                unrealized_pnl: decimal_field(position, "unrealizedPnl").unwrap_or(Decimal::ZERO),
                side: if size > Decimal::ZERO {
                    Side::Buy
                } else {
                    Side::Sell
                },
            });
        }

        Ok(positions)
    }

    async fn get_position(
        &self,
        credentials: &Credentials,
        symbol: &str,
    ) -> Result<Option<PositionSnapshot>, ConnectorError> {
        let upper = symbol.to_uppercase();
        let positions = self.get_positions(credentials).await?;
        Ok(positions.into_iter().find(|p| p.symbol == upper))
    }

    async fn get_mark_prices(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, Decimal>, ConnectorError> {
        let response = self
            .mainnet
            .client
            .post_info(&json!({"type": "allMids"}))
            .await?;

        let Some(mids) = response.as_object() else {
            return Err(ConnectorError::Serialization(
                "allMids response is not an object".to_string(),
            ));
        };

        let mut prices = HashMap::new();
        for symbol in symbols {
            let upper = symbol.to_uppercase();
            if let Some(price) = mids
                .get(&upper)
                .and_then(Value::as_str)
                .and_then(|p| Decimal::from_str(p).ok())
            {
                prices.insert(upper, price);
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
        let asset = self.resolve_asset(endpoint, &signal.symbol).await?;
        let entry = signal.primary_entry().ok_or_else(|| {
            ConnectorError::OrderRejected("signal has no entry price for order placement".to_string())
        })?;
        let is_buy = signal.side == Side::Buy;

        // Venue minimum: scale the order up when the sized notional is too
        // small, but only if the account can actually fund it.
        let mut unit_size = sized.unit_size;
        if sized.notional < MIN_NOTIONAL {
            let balance = self.get_balance(credentials).await?;
            let required_margin = MIN_NOTIONAL / Decimal::from(sized.leverage.max(1));
            if balance.available < required_margin {
                return Err(ConnectorError::BelowMinimumOrder {
                    notional: sized.notional,
                    minimum: MIN_NOTIONAL,
                });
            }
            tracing::info!(
                symbol = %signal.symbol,
                notional = %sized.notional,
                minimum = %MIN_NOTIONAL,
                "scaling order up to venue minimum notional"
            );
            unit_size = MIN_NOTIONAL / entry;
        }

        let unit_size = snap_lot(unit_size, asset.sz_decimals);
        if unit_size <= Decimal::ZERO {
            return Err(ConnectorError::BelowMinimumOrder {
                notional: sized.notional,
                minimum: MIN_NOTIONAL,
            });
        }

        // Leverage is account state on this venue; a rejection here falls
        // back to whatever the account already has.
        let leverage_action = json!({
            "type": "updateLeverage",
            "asset": asset.asset_id,
            "isCross": true,
            "leverage": sized.leverage,
        });
        if let Err(err) = self.place_action(endpoint, credentials, &leverage_action).await {
            tracing::warn!(symbol = %signal.symbol, error = %err, "leverage update failed, keeping account setting");
        }

        // Entry: GTC limit with a 1% marketable buffer for fill probability.
        let buffered_entry = if is_buy {
            entry * (Decimal::ONE + ENTRY_SLIPPAGE_BUFFER)
        } else {
            entry * (Decimal::ONE - ENTRY_SLIPPAGE_BUFFER)
        };
        let placed = self
            .place_entry_with_tick_fallback(
                endpoint,
                credentials,
                &asset,
                &signal.symbol,
                signal.side,
                unit_size,
                buffered_entry,
            )
            .await?;

        if let Some(fill) = placed.fill_price {
            enforce_slippage(entry, fill, MAX_SLIPPAGE_PERCENT)?;
        }

        let mut result = ExecutionResult {
            success: true,
            entry_order_id: placed.order_id,
            fill_price: placed.fill_price,
            executed_size: Some(unit_size),
            ..ExecutionResult::default()
        };

        // DCA legs: one limit per extra entry, same size and leverage. A
        // failed leg is reported, not fatal.
        for (index, dca_price) in signal.entries.iter().skip(1).enumerate() {
            let tick = self.ticks.resolve(&signal.symbol, *dca_price);
            let snapped = ticks::snap_to_tick(*dca_price, tick, signal.side);
            let order = build_limit_order(asset.asset_id, is_buy, snapped, unit_size, false);

            match self.place_order(endpoint, credentials, order).await {
                Ok(leg) => {
                    if let Some(id) = leg.order_id {
                        tracing::info!(symbol = %signal.symbol, leg = index + 2, price = %snapped, order_id = %id, "DCA entry placed");
                        result.dca_order_ids.push(id);
                    }
                }
                Err(err) => {
                    tracing::error!(symbol = %signal.symbol, leg = index + 2, error = %err, "DCA entry failed");
                }
            }
        }

        // Stop-loss: reduce-only trigger on the exit side.
        if let Some(stop) = signal.primary_stop() {
            match self
                .place_trigger_leg(
                    endpoint,
                    credentials,
                    &asset,
                    &signal.symbol,
                    signal.side.opposite(),
                    unit_size,
                    stop,
                    "sl",
                )
                .await
            {
                Ok(leg) => result.sl_order_id = leg.order_id,
                Err(err) => {
                    tracing::error!(symbol = %signal.symbol, error = %err, "stop-loss leg failed");
                }
            }
        }

        // Take-profits: even split, last leg absorbs the rounding remainder.
        let tp_count = signal.take_profits.len();
        if tp_count > 0 {
            let per_leg = snap_lot(
                unit_size / Decimal::from(tp_count as u64),
                asset.sz_decimals,
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

                match self
                    .place_trigger_leg(
                        endpoint,
                        credentials,
                        &asset,
                        &signal.symbol,
                        signal.side.opposite(),
                        leg_size,
                        *tp_price,
                        "tp",
                    )
                    .await
                {
                    Ok(leg) => {
                        if let Some(id) = leg.order_id {
                            tracing::info!(symbol = %signal.symbol, level = index + 1, price = %tp_price, size = %leg_size, "take-profit placed");
                            result.tp_order_ids.push(id);
                        }
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
        let asset = self.resolve_asset(endpoint, symbol).await?;
        let oid: u64 = order_id
            .parse()
            .map_err(|_| ConnectorError::OrderRejected(format!("invalid order id: {order_id}")))?;

        let action = json!({
            "type": "cancel",
            "cancels": [{"a": asset.asset_id, "o": oid}],
        });
        self.place_action(endpoint, credentials, &action).await?;
        Ok(())
    }
}

fn build_limit_order(
    asset_id: u32,
    is_buy: bool,
    price: Decimal,
    size: Decimal,
    reduce_only: bool,
) -> Value {
    json!({
        "a": asset_id,
        "b": is_buy,
        "p": price.normalize().to_string(),
        "s": size.normalize().to_string(),
        "r": reduce_only,
        "t": {"limit": {"tif": "Gtc"}},
    })
}

/// Size precision: round down to the asset's `szDecimals`.
fn snap_lot(size: Decimal, sz_decimals: u32) -> Decimal {
    size.round_dp_with_strategy(sz_decimals, RoundingStrategy::ToZero)
}

fn decimal_field(value: &Value, key: &str) -> Option<Decimal> {
    match value.get(key)? {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

/// Hyperliquid reports per-order errors inside an HTTP 200 body; surface
/// them as rejections.
fn check_exchange_response(response: Value) -> Result<Value, ConnectorError> {
    let status = response.get("status").and_then(Value::as_str);
    if status != Some("ok") {
        let detail = response
            .get("response")
            .and_then(Value::as_str)
            .map_or_else(|| response.to_string(), ToString::to_string);
        return Err(ConnectorError::OrderRejected(detail));
    }

    if let Some(statuses) = response
        .pointer("/response/data/statuses")
        .and_then(Value::as_array)
    {
        for entry in statuses {
            if let Some(error) = entry.get("error").and_then(Value::as_str) {
                return Err(ConnectorError::OrderRejected(error.to_string()));
            }
        }
    }

    Ok(response)
}

fn parse_order_response(response: &Value) -> PlacedOrder {
    let first = response.pointer("/response/data/statuses/0");

    let resting_oid = first
        .and_then(|s| s.pointer("/resting/oid"))
        .and_then(Value::as_u64)
        .map(|oid| oid.to_string());

    let filled = first.and_then(|s| s.get("filled"));
    let filled_oid = filled
        .and_then(|f| f.get("oid"))
        .and_then(Value::as_u64)
        .map(|oid| oid.to_string());
    let fill_price = filled
        .and_then(|f| f.get("avgPx"))
        .and_then(Value::as_str)
        .and_then(|p| Decimal::from_str(p).ok());

    PlacedOrder {
        order_id: resting_oid.or(filled_oid),
        fill_price,
    }
}
