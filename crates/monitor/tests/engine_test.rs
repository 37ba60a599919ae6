//! End-to-end tests for the monitoring engine actor: scripted connectors,
//! in-memory store, virtual time.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;
use trade_relay_core::config::MonitorConfig;
use trade_relay_core::connector::{
    Balance, ConnectorRegistry, ExchangeConnector, ExchangeKind, ExecutionResult,
    PositionSnapshot,
};
use trade_relay_core::credentials::Credentials;
use trade_relay_core::error::ConnectorError;
use trade_relay_core::risk::SizedOrder;
use trade_relay_core::signal::{Side, Signal};
use trade_relay_core::store::{MemoryTradeStore, TradeBinding, TradeStatus, TradeStore};
use trade_relay_monitor::{MonitorEngine, MonitorEvent, TargetKind};

/// Scripted connector: a queue of mark prices (last one repeats) and a
/// queue of position-lookup results per credential key.
struct ScriptedConnector {
    prices: Mutex<Vec<Decimal>>,
    positions: Mutex<HashMap<String, Vec<Result<Option<PositionSnapshot>, ()>>>>,
    price_calls: AtomicUsize,
    symbols_per_call: Mutex<Vec<usize>>,
    cancelled: Mutex<Vec<String>>,
}

impl ScriptedConnector {
    fn new() -> Self {
        Self {
            prices: Mutex::new(Vec::new()),
            positions: Mutex::new(HashMap::new()),
            price_calls: AtomicUsize::new(0),
            symbols_per_call: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    /// Prices are consumed one per `get_mark_prices` call; the final price
    /// repeats forever.
    fn with_prices(self, prices: &[Decimal]) -> Self {
        *self.prices.lock().unwrap() = prices.to_vec();
        self
    }

    /// Scripts `get_position` results for one credential key. `Err(())`
    /// becomes a network error; the final entry repeats forever.
    fn with_positions(
        self,
        api_key: &str,
        results: Vec<Result<Option<PositionSnapshot>, ()>>,
    ) -> Self {
        self.positions
            .lock()
            .unwrap()
            .insert(api_key.to_string(), results);
        self
    }
}

#[async_trait]
impl ExchangeConnector for ScriptedConnector {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Hyperliquid
    }

    async fn connect(&self, _credentials: &Credentials) -> Result<bool, ConnectorError> {
        Ok(true)
    }

    fn validate_credentials(&self, credentials: &Credentials) -> bool {
        credentials.is_usable()
    }

    async fn get_balance(&self, _credentials: &Credentials) -> Result<Balance, ConnectorError> {
        Ok(Balance {
            total: dec!(1000),
            available: dec!(1000),
        })
    }

    async fn get_positions(
        &self,
        _credentials: &Credentials,
    ) -> Result<Vec<PositionSnapshot>, ConnectorError> {
        Ok(vec![])
    }

    async fn get_position(
        &self,
        credentials: &Credentials,
        symbol: &str,
    ) -> Result<Option<PositionSnapshot>, ConnectorError> {
        let mut positions = self.positions.lock().unwrap();
        let Some(script) = positions.get_mut(&credentials.api_key) else {
            return Err(ConnectorError::CredentialInvalid(format!(
                "no script for {}",
                credentials.api_key
            )));
        };
        let next = if script.len() > 1 {
            script.remove(0)
        } else {
            script.first().cloned().unwrap_or(Ok(None))
        };
        next.map_err(|()| ConnectorError::Network(format!("scripted failure for {symbol}")))
    }

    async fn get_mark_prices(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, Decimal>, ConnectorError> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        self.symbols_per_call.lock().unwrap().push(symbols.len());

        let mut prices = self.prices.lock().unwrap();
        let price = if prices.len() > 1 {
            prices.remove(0)
        } else {
            prices.first().copied().unwrap_or(dec!(0))
        };

        Ok(symbols.iter().map(|s| (s.clone(), price)).collect())
    }

    async fn execute_trade(
        &self,
        _credentials: &Credentials,
        _sized: &SizedOrder,
        _signal: &Signal,
    ) -> Result<ExecutionResult, ConnectorError> {
        unimplemented!("monitoring tests never execute trades")
    }

    async fn cancel_order(
        &self,
        _credentials: &Credentials,
        _symbol: &str,
        order_id: &str,
    ) -> Result<(), ConnectorError> {
        self.cancelled.lock().unwrap().push(order_id.to_string());
        Ok(())
    }
}

fn buy_signal() -> Signal {
    Signal {
        symbol: "BTC".to_string(),
        side: Side::Buy,
        entries: vec![dec!(60000)],
        stop_loss: vec![dec!(58000)],
        take_profits: vec![dec!(62000), dec!(64000)],
        leverage: Some(10),
        channel_id: "chan".to_string(),
        message_id: "msg".to_string(),
    }
}

fn binding(trade_id: u64, credentials: Option<Credentials>) -> TradeBinding {
    TradeBinding {
        trade_id,
        user_id: format!("user-{trade_id}"),
        exchange: ExchangeKind::Hyperliquid,
        size: dec!(0.01),
        entry_order_ids: vec![format!("oid-{trade_id}")],
        credentials,
    }
}

fn creds(name: &str) -> Credentials {
    Credentials::new(ExchangeKind::Hyperliquid, name, "secret")
}

async fn next_event(rx: &mut broadcast::Receiver<MonitorEvent>) -> MonitorEvent {
    tokio::time::timeout(Duration::from_secs(120), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

fn config() -> MonitorConfig {
    MonitorConfig {
        poll_interval_secs: 1,
        api_poll_interval_secs: 1,
        dedup_cap: 4096,
        rotation_failure_threshold: 3,
    }
}

async fn persist_trade(store: &MemoryTradeStore, signal: &Signal, user: &str) -> u64 {
    store
        .insert_trade(trade_relay_core::store::NewTrade {
            user_id: user.to_string(),
            exchange: ExchangeKind::Hyperliquid,
            symbol: signal.symbol.clone(),
            side: signal.side,
            size: dec!(0.01),
            entry_price: signal.entries.first().copied().unwrap_or(dec!(0)),
            stop_loss: signal.stop_loss.clone(),
            take_profits: signal.take_profits.clone(),
            channel_id: signal.channel_id.clone(),
            message_id: signal.message_id.clone(),
            signal_key: signal.key(),
            entry_order_ids: vec![format!("oid-{user}")],
        })
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn price_strategy_runs_full_lifecycle_without_duplicates() {
    // Prices: waiting → entry fill → TP0 (twice, dedup) → TP1 completes.
    let connector = Arc::new(
        ScriptedConnector::new().with_prices(&[
            dec!(61000), // above the buy limit, still waiting
            dec!(59900), // entry inferred
            dec!(62100), // TP0
            dec!(62100), // same level again: no duplicate
            dec!(64100), // TP1 → completed
        ]),
    );
    let store = Arc::new(MemoryTradeStore::new());
    let signal = buy_signal();
    let trade_a = persist_trade(&store, &signal, "alice").await;
    let trade_b = persist_trade(&store, &signal, "bob").await;

    let mut registry = ConnectorRegistry::new();
    registry.register(connector.clone());
    let (engine, handle) = MonitorEngine::new(config(), registry, store.clone());
    let mut rx = handle.subscribe();
    let join = engine.spawn();

    handle
        .track(
            signal.clone(),
            vec![binding(trade_a, None), binding(trade_b, None)],
        )
        .await
        .unwrap();

    // Entry first.
    let opened = next_event(&mut rx).await;
    match &opened {
        MonitorEvent::PositionOpened {
            fill_price,
            subscribers,
            ..
        } => {
            assert_eq!(*fill_price, dec!(60000));
            assert_eq!(*subscribers, 2);
        }
        other => panic!("expected PositionOpened, got {other:?}"),
    }

    // Then TP0, break-even, TP1, cancellation, completion, in order.
    let mut tp_hits = Vec::new();
    let mut breakeven = 0;
    let mut completed = false;
    while !completed {
        match next_event(&mut rx).await {
            MonitorEvent::TargetHit { kind, .. } => tp_hits.push(kind),
            MonitorEvent::StopMovedToBreakEven { new_stop, .. } => {
                breakeven += 1;
                assert_eq!(new_stop, dec!(60000));
            }
            MonitorEvent::SignalCompleted { .. } => completed = true,
            _ => {}
        }
    }

    assert_eq!(
        tp_hits,
        vec![TargetKind::TakeProfit(0), TargetKind::TakeProfit(1)]
    );
    assert_eq!(breakeven, 1);

    // Store mirrored the terminal state.
    let record = store.get_trade(trade_a).await.unwrap().unwrap();
    assert_eq!(record.status, TradeStatus::Completed);
    assert!(record.targets_hit.position_entered);
    assert!(record.targets_hit.sl_moved_to_breakeven);
    assert_eq!(record.targets_hit.tp.len(), 2);

    // The signal left the monitoring set.
    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.total, 0);

    handle.shutdown().await.unwrap();
    join.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn grouping_polls_once_per_tick_regardless_of_subscriber_count() {
    let connector = Arc::new(ScriptedConnector::new().with_prices(&[dec!(61000)]));
    let store = Arc::new(MemoryTradeStore::new());
    let signal = buy_signal();

    let mut trade_ids = Vec::new();
    for user in ["a", "b", "c", "d", "e"] {
        trade_ids.push(persist_trade(&store, &signal, user).await);
    }

    let mut registry = ConnectorRegistry::new();
    registry.register(connector.clone());
    let (engine, handle) = MonitorEngine::new(config(), registry, store);
    let join = engine.spawn();

    let bindings: Vec<TradeBinding> = trade_ids.iter().map(|&id| binding(id, None)).collect();
    handle.track(signal.clone(), bindings).await.unwrap();

    // Let several ticks elapse on virtual time.
    tokio::time::sleep(Duration::from_secs(5)).await;

    // Five subscriber trades → one monitored signal.
    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.subscribers, 5);

    // Every price fetch covered exactly one symbol; call count tracks
    // ticks, not subscribers.
    let calls = connector.price_calls.load(Ordering::SeqCst);
    assert!(calls >= 1, "no price fetches happened");
    assert!(calls <= 7, "price fetches scaled past tick count: {calls}");
    assert!(connector
        .symbols_per_call
        .lock()
        .unwrap()
        .iter()
        .all(|&n| n == 1));

    handle.shutdown().await.unwrap();
    join.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn api_strategy_detects_open_and_external_close() {
    let position = PositionSnapshot {
        symbol: "BTC".to_string(),
        size: dec!(0.02),
        entry_price: dec!(59985),
        unrealized_pnl: dec!(0),
        side: Side::Buy,
    };
    let connector = Arc::new(ScriptedConnector::new().with_positions(
        "monitor-a",
        vec![
            Ok(None),                 // waiting for entry
            Ok(Some(position.clone())), // filled at the real price
            Ok(None),                 // closed externally
        ],
    ));
    let store = Arc::new(MemoryTradeStore::new());
    let signal = buy_signal();
    let trade_a = persist_trade(&store, &signal, "alice").await;

    let mut registry = ConnectorRegistry::new();
    registry.register(connector);
    let (engine, handle) = MonitorEngine::new(config(), registry, store.clone());
    let mut rx = handle.subscribe();
    let join = engine.spawn();

    handle
        .track(signal.clone(), vec![binding(trade_a, Some(creds("monitor-a")))])
        .await
        .unwrap();

    match next_event(&mut rx).await {
        MonitorEvent::PositionOpened { fill_price, .. } => {
            // Real fill price from the venue, not the alert's entry level.
            assert_eq!(fill_price, dec!(59985));
        }
        other => panic!("expected PositionOpened, got {other:?}"),
    }

    let mut saw_close = false;
    let mut saw_completed = false;
    while !saw_completed {
        match next_event(&mut rx).await {
            MonitorEvent::PositionClosed { .. } => saw_close = true,
            MonitorEvent::SignalCompleted { .. } => saw_completed = true,
            _ => {}
        }
    }
    assert!(saw_close);

    let record = store.get_trade(trade_a).await.unwrap().unwrap();
    assert_eq!(record.status, TradeStatus::Completed);
    assert_eq!(record.targets_hit.entry_fill_price, Some(dec!(59985)));

    handle.shutdown().await.unwrap();
    join.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failing_monitor_rotates_without_dropping_the_signal() {
    let position = PositionSnapshot {
        symbol: "BTC".to_string(),
        size: dec!(0.01),
        entry_price: dec!(60000),
        unrealized_pnl: dec!(0),
        side: Side::Buy,
    };
    // First credential always fails; second works.
    let connector = Arc::new(
        ScriptedConnector::new()
            .with_positions("monitor-a", vec![Err(())])
            .with_positions("monitor-b", vec![Ok(Some(position))]),
    );
    let store = Arc::new(MemoryTradeStore::new());
    let signal = buy_signal();
    let trade_a = persist_trade(&store, &signal, "alice").await;
    let trade_b = persist_trade(&store, &signal, "bob").await;

    let mut registry = ConnectorRegistry::new();
    registry.register(connector);
    let (engine, handle) = MonitorEngine::new(config(), registry, store);
    let mut rx = handle.subscribe();
    let join = engine.spawn();

    handle
        .track(
            signal.clone(),
            vec![
                binding(trade_a, Some(creds("monitor-a"))),
                binding(trade_b, Some(creds("monitor-b"))),
            ],
        )
        .await
        .unwrap();

    // Three failed ticks rotate the monitor; the next tick opens the
    // position through the second credential.
    match next_event(&mut rx).await {
        MonitorEvent::MonitorRotated { from_user, to_user, .. } => {
            assert_eq!(from_user, "user-1");
            assert_eq!(to_user, "user-2");
        }
        other => panic!("expected MonitorRotated, got {other:?}"),
    }
    match next_event(&mut rx).await {
        MonitorEvent::PositionOpened { .. } => {}
        other => panic!("expected PositionOpened after rotation, got {other:?}"),
    }

    // Still monitored throughout.
    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.total, 1);

    handle.shutdown().await.unwrap();
    join.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn completion_cancels_open_entry_orders_once() {
    // Immediate SL hit after entry; DCA legs must be cancelled exactly once.
    let connector = Arc::new(ScriptedConnector::new().with_prices(&[
        dec!(59900), // entry inferred
        dec!(57900), // stop loss
        dec!(57900),
        dec!(57900),
    ]));
    let store = Arc::new(MemoryTradeStore::new());
    let signal = buy_signal();
    let trade_a = persist_trade(&store, &signal, "alice").await;

    let mut registry = ConnectorRegistry::new();
    registry.register(connector.clone());
    let (engine, handle) = MonitorEngine::new(config(), registry, store);
    let mut rx = handle.subscribe();
    let join = engine.spawn();

    let mut subscriber = binding(trade_a, None);
    subscriber.entry_order_ids = vec!["entry-1".to_string(), "dca-1".to_string()];
    handle.track(signal.clone(), vec![subscriber]).await.unwrap();

    let mut cancelled_events = 0;
    let mut sl_hits = 0;
    let mut completed = false;
    while !completed {
        match next_event(&mut rx).await {
            MonitorEvent::TargetHit {
                kind: TargetKind::StopLoss,
                ..
            } => sl_hits += 1,
            MonitorEvent::EntriesCancelled { .. } => cancelled_events += 1,
            MonitorEvent::SignalCompleted { .. } => completed = true,
            _ => {}
        }
    }

    assert_eq!(sl_hits, 1);
    assert_eq!(cancelled_events, 1);
    // No credentials → the venue cancel is skipped, but the event still
    // reports the cleanup pass.

    handle.shutdown().await.unwrap();
    join.await.unwrap();
}
