//! The persistence boundary.
//!
//! The engine reads and writes trades through [`TradeStore`]; the concrete
//! relational store, its pool, and its migrations live outside this
//! workspace. [`MemoryTradeStore`] backs tests and single-process runs.
//!
//! Target levels are structured vectors end to end — the store contract
//! never sees stringified lists.

use crate::connector::ExchangeKind;
use crate::credentials::Credentials;
use crate::signal::{Side, SignalKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

/// Lifecycle of a persisted trade row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    WaitingEntry,
    Active,
    Completed,
}

/// Which targets of a signal have fired so far.
///
/// Mutated only by the monitoring engine's polling loop; everything else
/// reads. `tp` stores hit indices so re-checking a level is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetsHit {
    pub sl: bool,
    pub tp: BTreeSet<usize>,
    pub position_entered: bool,
    pub entry_fill_price: Option<Decimal>,
    pub position_size: Option<Decimal>,
    pub sl_moved_to_breakeven: bool,
}

impl TargetsHit {
    /// True once every one of `total_tps` take-profit levels has been hit.
    #[must_use]
    pub fn all_tps_hit(&self, total_tps: usize) -> bool {
        total_tps > 0 && self.tp.len() == total_tps
    }
}

/// A new trade row, as produced by the execution coordinator.
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub user_id: String,
    pub exchange: ExchangeKind,
    pub symbol: String,
    pub side: Side,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Vec<Decimal>,
    pub take_profits: Vec<Decimal>,
    pub channel_id: String,
    pub message_id: String,
    pub signal_key: SignalKey,
    pub entry_order_ids: Vec<String>,
}

/// A persisted trade row.
#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub id: u64,
    pub user_id: String,
    pub exchange: ExchangeKind,
    pub symbol: String,
    pub side: Side,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Vec<Decimal>,
    pub take_profits: Vec<Decimal>,
    pub channel_id: String,
    pub message_id: String,
    pub signal_key: SignalKey,
    pub entry_order_ids: Vec<String>,
    pub status: TradeStatus,
    pub targets_hit: TargetsHit,
    pub created_at: DateTime<Utc>,
}

/// Binding between one subscriber's executed trade and the signal it came
/// from. The monitoring engine groups these by signal key.
#[derive(Debug, Clone)]
pub struct TradeBinding {
    pub trade_id: u64,
    pub user_id: String,
    pub exchange: ExchangeKind,
    pub size: Decimal,
    pub entry_order_ids: Vec<String>,
    /// Present when this subscriber's credentials can be used for
    /// position-based monitoring.
    pub credentials: Option<Credentials>,
}

/// Trade persistence as seen by the engine.
#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn insert_trade(&self, trade: NewTrade) -> anyhow::Result<u64>;

    async fn update_targets_hit(&self, trade_id: u64, targets: &TargetsHit) -> anyhow::Result<()>;

    async fn set_status(&self, trade_id: u64, status: TradeStatus) -> anyhow::Result<()>;

    /// Every trade not yet completed, for monitor restart replay.
    async fn open_trades(&self) -> anyhow::Result<Vec<TradeRecord>>;

    async fn get_trade(&self, trade_id: u64) -> anyhow::Result<Option<TradeRecord>>;
}

/// In-memory [`TradeStore`] for tests and single-process runs.
#[derive(Default)]
pub struct MemoryTradeStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    next_id: u64,
    trades: HashMap<u64, TradeRecord>,
}

impl MemoryTradeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TradeStore for MemoryTradeStore {
    async fn insert_trade(&self, trade: NewTrade) -> anyhow::Result<u64> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.trades.insert(
            id,
            TradeRecord {
                id,
                user_id: trade.user_id,
                exchange: trade.exchange,
                symbol: trade.symbol,
                side: trade.side,
                size: trade.size,
                entry_price: trade.entry_price,
                stop_loss: trade.stop_loss,
                take_profits: trade.take_profits,
                channel_id: trade.channel_id,
                message_id: trade.message_id,
                signal_key: trade.signal_key,
                entry_order_ids: trade.entry_order_ids,
                status: TradeStatus::WaitingEntry,
                targets_hit: TargetsHit::default(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn update_targets_hit(&self, trade_id: u64, targets: &TargetsHit) -> anyhow::Result<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .trades
            .get_mut(&trade_id)
            .ok_or_else(|| anyhow::anyhow!("unknown trade id {trade_id}"))?;
        record.targets_hit = targets.clone();
        Ok(())
    }

    async fn set_status(&self, trade_id: u64, status: TradeStatus) -> anyhow::Result<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .trades
            .get_mut(&trade_id)
            .ok_or_else(|| anyhow::anyhow!("unknown trade id {trade_id}"))?;
        record.status = status;
        Ok(())
    }

    async fn open_trades(&self) -> anyhow::Result<Vec<TradeRecord>> {
        let inner = self.inner.read().await;
        let mut open: Vec<TradeRecord> = inner
            .trades
            .values()
            .filter(|t| t.status != TradeStatus::Completed)
            .cloned()
            .collect();
        open.sort_by_key(|t| t.id);
        Ok(open)
    }

    async fn get_trade(&self, trade_id: u64) -> anyhow::Result<Option<TradeRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.trades.get(&trade_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_trade(user: &str) -> NewTrade {
        NewTrade {
            user_id: user.to_string(),
            exchange: ExchangeKind::Hyperliquid,
            symbol: "BTC".to_string(),
            side: Side::Buy,
            size: dec!(0.01),
            entry_price: dec!(60000),
            stop_loss: vec![dec!(58000)],
            take_profits: vec![dec!(62000), dec!(64000)],
            channel_id: "c".to_string(),
            message_id: "m".to_string(),
            signal_key: SignalKey::new("c", "BTC", Some(dec!(60000)), "m"),
            entry_order_ids: vec!["oid-1".to_string()],
        }
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids() {
        let store = MemoryTradeStore::new();
        let a = store.insert_trade(new_trade("alice")).await.unwrap();
        let b = store.insert_trade(new_trade("bob")).await.unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn targets_hit_round_trip() {
        let store = MemoryTradeStore::new();
        let id = store.insert_trade(new_trade("alice")).await.unwrap();

        let mut targets = TargetsHit::default();
        targets.position_entered = true;
        targets.entry_fill_price = Some(dec!(59980));
        targets.tp.insert(0);
        store.update_targets_hit(id, &targets).await.unwrap();

        let record = store.get_trade(id).await.unwrap().unwrap();
        assert_eq!(record.targets_hit, targets);
    }

    #[tokio::test]
    async fn completed_trades_drop_out_of_open_set() {
        let store = MemoryTradeStore::new();
        let a = store.insert_trade(new_trade("alice")).await.unwrap();
        let b = store.insert_trade(new_trade("bob")).await.unwrap();

        store.set_status(a, TradeStatus::Completed).await.unwrap();
        let open = store.open_trades().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, b);
    }

    #[test]
    fn all_tps_hit_requires_every_index() {
        let mut targets = TargetsHit::default();
        assert!(!targets.all_tps_hit(2));
        targets.tp.insert(0);
        assert!(!targets.all_tps_hit(2));
        targets.tp.insert(1);
        assert!(targets.all_tps_hit(2));
        // A signal with no TP levels never "completes by TP".
        assert!(!TargetsHit::default().all_tps_hit(0));
    }

    #[test]
    fn targets_hit_serializes_structured() {
        let mut targets = TargetsHit::default();
        targets.tp.insert(1);
        targets.sl = false;
        let json = serde_json::to_string(&targets).unwrap();
        // Structured array, not a stringified list.
        assert!(json.contains("\"tp\":[1]"));
        let back: TargetsHit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, targets);
    }
}
