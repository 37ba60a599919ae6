//! The monitoring engine actor.
//!
//! Owns the in-memory map of monitored signals exclusively: all external
//! input arrives as [`MonitorCommand`]s, persisted state is loaded before
//! the loop starts, and a single polling loop performs every mutation.
//!
//! Each signal runs a small state machine, waiting-entry → active →
//! completed, polled by one of two interchangeable strategies: position
//! lookup through one subscriber's credentials (rotated on repeated
//! failure), or price inference when no credentials are usable. Within one
//! tick the stop-loss is always evaluated before the take-profit levels,
//! and take-profits in ascending index order — the break-even move on the
//! first take-profit depends on that ordering.

use crate::commands::{MonitorCommand, MonitorStats};
use crate::events::{self, CloseReason, MonitorEvent, TargetKind};
use crate::gate::NotificationGate;
use crate::handle::MonitorHandle;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use trade_relay_core::config::MonitorConfig;
use trade_relay_core::connector::{ConnectorRegistry, ExchangeKind, PositionSnapshot};
use trade_relay_core::credentials::Credentials;
use trade_relay_core::signal::{Side, Signal, SignalKey};
use trade_relay_core::store::{TargetsHit, TradeBinding, TradeStatus, TradeStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalStatus {
    WaitingEntry,
    Active,
    Completed,
}

/// How a signal is polled, chosen once when it enters monitoring.
enum PollStrategy {
    /// Query one subscriber's real position; rotate through the credential
    /// pool when the current monitor keeps failing.
    Api {
        /// Indices into `bindings` that carry usable credentials.
        pool: Vec<usize>,
        monitor_index: usize,
        consecutive_failures: u32,
    },
    /// Infer entry and exits from mark prices.
    Price,
}

struct MonitoredSignal {
    channel_id: String,
    symbol: String,
    side: Side,
    entries: Vec<Decimal>,
    /// Mutable: replaced by the entry price on break-even.
    stop_loss: Vec<Decimal>,
    take_profits: Vec<Decimal>,
    bindings: Vec<TradeBinding>,
    targets: TargetsHit,
    status: SignalStatus,
    strategy: PollStrategy,
    cancellation_sent: bool,
}

impl MonitoredSignal {
    fn total_size(&self) -> Decimal {
        self.bindings.iter().map(|b| b.size).sum()
    }

    /// Reference entry for PnL and the break-even stop: real fill when the
    /// API strategy recorded one, first signal entry otherwise.
    fn entry_reference(&self, fallback: Decimal) -> Decimal {
        self.targets
            .entry_fill_price
            .or_else(|| self.entries.first().copied())
            .unwrap_or(fallback)
    }

    fn close_reason(&self) -> CloseReason {
        if self.targets.sl {
            CloseReason::StopLoss
        } else if self.targets.all_tps_hit(self.take_profits.len()) {
            CloseReason::AllTargets
        } else if self.targets.tp.is_empty() {
            CloseReason::Manual
        } else {
            CloseReason::PartialTargets(self.targets.tp.len(), self.take_profits.len())
        }
    }
}

fn credential_pool(bindings: &[TradeBinding]) -> Vec<usize> {
    bindings
        .iter()
        .enumerate()
        .filter(|(_, b)| b.credentials.as_ref().is_some_and(Credentials::is_usable))
        .map(|(index, _)| index)
        .collect()
}

pub struct MonitorEngine {
    config: MonitorConfig,
    connectors: ConnectorRegistry,
    store: Arc<dyn TradeStore>,
    rx: mpsc::Receiver<MonitorCommand>,
    gate: NotificationGate,
    signals: HashMap<SignalKey, MonitoredSignal>,
    ticks: u64,
}

impl MonitorEngine {
    /// Creates the engine and its handle. Call [`Self::load_persisted`]
    /// before [`Self::spawn`] so restart replay happens before the loop
    /// owns the map.
    #[must_use]
    pub fn new(
        config: MonitorConfig,
        connectors: ConnectorRegistry,
        store: Arc<dyn TradeStore>,
    ) -> (Self, MonitorHandle) {
        let (tx, rx) = mpsc::channel(64);
        let (event_tx, _) = broadcast::channel(1024);
        let handle = MonitorHandle::new(tx, event_tx.clone());
        let gate = NotificationGate::new(event_tx, config.dedup_cap);

        (
            Self {
                config,
                connectors,
                store,
                rx,
                gate,
                signals: HashMap::new(),
                ticks: 0,
            },
            handle,
        )
    }

    /// Replays open trades from the store into the monitoring set and
    /// pre-seeds the notification gate with already-hit targets, so a
    /// restart cannot re-notify them.
    ///
    /// Credentials are not persisted, so replayed signals monitor by price
    /// until a fresh execution re-binds subscribers with credentials.
    ///
    /// # Errors
    /// Returns an error when the store cannot be read.
    pub async fn load_persisted(&mut self) -> anyhow::Result<usize> {
        let open = self.store.open_trades().await?;
        let mut grouped: HashMap<SignalKey, Vec<trade_relay_core::store::TradeRecord>> =
            HashMap::new();
        for record in open {
            grouped.entry(record.signal_key.clone()).or_default().push(record);
        }

        let count = grouped.len();
        for (key, records) in grouped {
            let first = &records[0];
            let targets = first.targets_hit.clone();

            if targets.sl {
                if let Some(stop) = first.stop_loss.first() {
                    self.gate.preseed(events::stop_loss_key(
                        &first.symbol,
                        first.side,
                        *stop,
                        &first.channel_id,
                    ));
                }
            }
            for &index in &targets.tp {
                if let Some(tp) = first.take_profits.get(index) {
                    self.gate.preseed(events::take_profit_key(
                        &first.symbol,
                        first.side,
                        index,
                        *tp,
                        &first.channel_id,
                    ));
                }
            }

            let bindings: Vec<TradeBinding> = records
                .iter()
                .map(|r| TradeBinding {
                    trade_id: r.id,
                    user_id: r.user_id.clone(),
                    exchange: r.exchange,
                    size: r.size,
                    entry_order_ids: r.entry_order_ids.clone(),
                    credentials: None,
                })
                .collect();

            let status = if targets.position_entered {
                SignalStatus::Active
            } else {
                SignalStatus::WaitingEntry
            };
            let entries = if first.entry_price > Decimal::ZERO {
                vec![first.entry_price]
            } else {
                Vec::new()
            };

            tracing::info!(signal = %key, subscribers = bindings.len(), "restored monitored signal");
            self.signals.insert(
                key,
                MonitoredSignal {
                    channel_id: first.channel_id.clone(),
                    symbol: first.symbol.clone(),
                    side: first.side,
                    entries,
                    stop_loss: first.stop_loss.clone(),
                    take_profits: first.take_profits.clone(),
                    bindings,
                    targets,
                    status,
                    strategy: PollStrategy::Price,
                    cancellation_sent: false,
                },
            );
        }

        Ok(count)
    }

    /// Runs the actor on a background task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// The actor loop. Exits on `Shutdown` or when every handle is gone;
    /// an in-flight tick always finishes before the loop returns.
    pub async fn run(mut self) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            poll_interval_secs = self.config.poll_interval_secs,
            api_poll_interval_secs = self.config.api_poll_interval_secs,
            "monitoring engine started"
        );

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(MonitorCommand::Track { signal, bindings }) => {
                        self.track(signal, bindings);
                    }
                    Some(MonitorCommand::GetStats(reply)) => {
                        let _ = reply.send(self.stats());
                    }
                    Some(MonitorCommand::Shutdown) | None => break,
                },
                _ = interval.tick() => {
                    self.ticks += 1;
                    let poll_api = self.ticks % self.api_tick_divisor() == 0;
                    self.poll_once(poll_api).await;
                }
            }
        }

        tracing::info!("monitoring engine stopped");
    }

    /// Position lookups run every Nth price tick.
    fn api_tick_divisor(&self) -> u64 {
        let price = self.config.poll_interval_secs.max(1);
        let api = self.config.api_poll_interval_secs.max(1);
        (api / price).max(1)
    }

    /// Adds a signal to monitoring, or joins additional subscribers onto a
    /// signal already being monitored (same grouping key → one signal, one
    /// upstream check, regardless of subscriber count).
    fn track(&mut self, signal: Signal, bindings: Vec<TradeBinding>) {
        let key = signal.key();

        if let Some(existing) = self.signals.get_mut(&key) {
            let known: HashSet<u64> = existing.bindings.iter().map(|b| b.trade_id).collect();
            for binding in bindings {
                if !known.contains(&binding.trade_id) {
                    existing.bindings.push(binding);
                }
            }

            // A later execution may bring the first usable credentials.
            let pool = credential_pool(&existing.bindings);
            match &mut existing.strategy {
                PollStrategy::Api {
                    pool: existing_pool,
                    monitor_index,
                    ..
                } => {
                    *existing_pool = pool;
                    if *monitor_index >= existing_pool.len() {
                        *monitor_index = 0;
                    }
                }
                PollStrategy::Price if !pool.is_empty() => {
                    existing.strategy = PollStrategy::Api {
                        pool,
                        monitor_index: 0,
                        consecutive_failures: 0,
                    };
                }
                PollStrategy::Price => {}
            }

            tracing::info!(
                signal = %key,
                subscribers = existing.bindings.len(),
                "added subscribers to monitored signal"
            );
            return;
        }

        let pool = credential_pool(&bindings);
        let strategy = if pool.is_empty() {
            PollStrategy::Price
        } else {
            PollStrategy::Api {
                pool,
                monitor_index: 0,
                consecutive_failures: 0,
            }
        };

        let mut targets = TargetsHit::default();
        let mut status = SignalStatus::WaitingEntry;
        // No entry levels means a market order; under price inference there
        // is nothing to wait for. The API strategy confirms entry from the
        // real position instead.
        if matches!(strategy, PollStrategy::Price) && signal.entries.is_empty() {
            targets.position_entered = true;
            status = SignalStatus::Active;
        }

        tracing::info!(
            signal = %key,
            symbol = %signal.symbol,
            subscribers = bindings.len(),
            strategy = if matches!(strategy, PollStrategy::Api { .. }) { "api" } else { "price" },
            "monitoring signal"
        );

        self.signals.insert(
            key,
            MonitoredSignal {
                channel_id: signal.channel_id,
                symbol: signal.symbol,
                side: signal.side,
                entries: signal.entries,
                stop_loss: signal.stop_loss,
                take_profits: signal.take_profits,
                bindings,
                targets,
                status,
                strategy,
                cancellation_sent: false,
            },
        );
    }

    fn stats(&self) -> MonitorStats {
        let mut stats = MonitorStats::default();
        for signal in self.signals.values() {
            stats.total += 1;
            stats.subscribers += signal.bindings.len();
            match signal.status {
                SignalStatus::WaitingEntry => stats.waiting_entry += 1,
                SignalStatus::Active => stats.active += 1,
                SignalStatus::Completed => {}
            }
            match signal.strategy {
                PollStrategy::Api { .. } => stats.api_strategy += 1,
                PollStrategy::Price => stats.price_strategy += 1,
            }
        }
        stats
    }

    /// One tick: fetch the distinct symbol set for price-monitored signals
    /// (never one fetch per subscriber), then evaluate every signal.
    /// Per-signal errors are logged and never stop the loop.
    async fn poll_once(&mut self, poll_api: bool) {
        if self.signals.is_empty() {
            return;
        }

        // Distinct symbols per venue for the price strategy.
        let mut symbols_by_exchange: HashMap<ExchangeKind, HashSet<String>> = HashMap::new();
        for signal in self.signals.values() {
            if matches!(signal.strategy, PollStrategy::Price)
                && signal.status != SignalStatus::Completed
            {
                if let Some(binding) = signal.bindings.first() {
                    symbols_by_exchange
                        .entry(binding.exchange)
                        .or_default()
                        .insert(signal.symbol.clone());
                }
            }
        }

        let mut prices: HashMap<String, Decimal> = HashMap::new();
        for (exchange, symbols) in symbols_by_exchange {
            let Some(connector) = self.connectors.get(exchange) else {
                tracing::warn!(%exchange, "no connector registered for price polling");
                continue;
            };
            let symbols: Vec<String> = symbols.into_iter().collect();
            match connector.get_mark_prices(&symbols).await {
                Ok(fetched) => prices.extend(fetched),
                Err(err) => {
                    tracing::warn!(%exchange, error = %err, "mark price fetch failed");
                }
            }
        }

        let keys: Vec<SignalKey> = self.signals.keys().cloned().collect();
        for key in keys {
            let Some(signal) = self.signals.get(&key) else {
                continue;
            };
            if signal.status == SignalStatus::Completed {
                continue;
            }
            match signal.strategy {
                PollStrategy::Price => {
                    if let Some(price) = prices.get(&signal.symbol).copied() {
                        self.check_price_signal(&key, price).await;
                    }
                }
                PollStrategy::Api { .. } => {
                    if poll_api {
                        self.check_api_signal(&key).await;
                    }
                }
            }
        }

        // Completed signals leave the map after the tick that finished them.
        let done: Vec<SignalKey> = self
            .signals
            .iter()
            .filter(|(_, s)| s.status == SignalStatus::Completed)
            .map(|(k, _)| k.clone())
            .collect();
        for key in done {
            if let Some(signal) = self.signals.remove(&key) {
                tracing::info!(
                    signal = %key,
                    subscribers = signal.bindings.len(),
                    "signal completed, monitoring stopped"
                );
                self.gate.emit(MonitorEvent::SignalCompleted {
                    key,
                    symbol: signal.symbol,
                    timestamp: Utc::now(),
                });
            }
        }
    }

    /// Price-inference tick for one signal.
    async fn check_price_signal(&mut self, key: &SignalKey, current: Decimal) {
        let completed = {
            let Some(signal) = self.signals.get_mut(key) else {
                return;
            };

            if !signal.targets.position_entered {
                // A buy limit fills once price trades at or below it, a
                // sell once at or above. No entry levels means a market
                // order, filled immediately.
                let crossed = if signal.entries.is_empty() {
                    Some(current)
                } else {
                    signal.entries.iter().copied().find(|entry| match signal.side {
                        Side::Buy => current <= *entry,
                        Side::Sell => current >= *entry,
                    })
                };
                let Some(level) = crossed else {
                    return; // still waiting for entry
                };

                signal.targets.position_entered = true;
                signal.status = SignalStatus::Active;
                tracing::info!(signal = %key, symbol = %signal.symbol, %level, "entry inferred from price");
                self.gate.emit(MonitorEvent::PositionOpened {
                    key: key.clone(),
                    channel_id: signal.channel_id.clone(),
                    symbol: signal.symbol.clone(),
                    side: signal.side,
                    fill_price: level,
                    size: signal.total_size(),
                    subscribers: signal.bindings.len(),
                    timestamp: Utc::now(),
                });
            }

            Self::evaluate_targets(key, signal, &mut self.gate, current)
        };

        self.persist_signal_targets(key).await;
        if completed {
            self.finalize_signal(key, "targets reached").await;
        }
    }

    /// Position-lookup tick for one signal.
    async fn check_api_signal(&mut self, key: &SignalKey) {
        let lookup = {
            let Some(signal) = self.signals.get(key) else {
                return;
            };
            let PollStrategy::Api {
                pool,
                monitor_index,
                ..
            } = &signal.strategy
            else {
                return;
            };
            let Some(&binding_index) = pool.get(*monitor_index) else {
                return;
            };
            let binding = &signal.bindings[binding_index];
            let Some(credentials) = binding.credentials.clone() else {
                return;
            };
            (credentials, binding.exchange, signal.symbol.clone())
        };
        let (credentials, exchange, symbol) = lookup;

        let Some(connector) = self.connectors.get(exchange) else {
            tracing::warn!(%exchange, "no connector registered for position polling");
            return;
        };

        match connector.get_position(&credentials, &symbol).await {
            Ok(position) => {
                if let Some(signal) = self.signals.get_mut(key) {
                    if let PollStrategy::Api {
                        consecutive_failures,
                        ..
                    } = &mut signal.strategy
                    {
                        *consecutive_failures = 0;
                    }
                }

                match position {
                    Some(position) => self.handle_position(key, position).await,
                    // Flat while waiting: still normal. Flat while active:
                    // the position was closed externally.
                    None => self.handle_flat_position(key).await,
                }
            }
            Err(err) => self.handle_monitor_failure(key, &err.to_string()),
        }
    }

    async fn handle_position(&mut self, key: &SignalKey, position: PositionSnapshot) {
        let completed = {
            let Some(signal) = self.signals.get_mut(key) else {
                return;
            };

            if !signal.targets.position_entered {
                signal.targets.position_entered = true;
                signal.targets.entry_fill_price = Some(position.entry_price);
                signal.targets.position_size = Some(position.size.abs());
                signal.status = SignalStatus::Active;
                tracing::info!(
                    signal = %key,
                    symbol = %signal.symbol,
                    fill_price = %position.entry_price,
                    size = %position.size.abs(),
                    "position opened"
                );
                self.gate.emit(MonitorEvent::PositionOpened {
                    key: key.clone(),
                    channel_id: signal.channel_id.clone(),
                    symbol: signal.symbol.clone(),
                    side: signal.side,
                    fill_price: position.entry_price,
                    size: position.size.abs(),
                    subscribers: signal.bindings.len(),
                    timestamp: Utc::now(),
                });
            }

            // Approximate mark from entry + PnL; inexact with multiple
            // fills at different prices, see PositionSnapshot docs.
            let current = position.approx_mark_price();
            Self::evaluate_targets(key, signal, &mut self.gate, current)
        };

        self.persist_signal_targets(key).await;
        if completed {
            self.finalize_signal(key, "targets reached").await;
        }
    }

    async fn handle_flat_position(&mut self, key: &SignalKey) {
        let close = {
            let Some(signal) = self.signals.get_mut(key) else {
                return;
            };
            if signal.status != SignalStatus::Active {
                return; // waiting for entry, nothing filled yet
            }
            let reason = signal.close_reason();
            tracing::info!(signal = %key, symbol = %signal.symbol, %reason, "position closed externally");
            self.gate.emit(MonitorEvent::PositionClosed {
                key: key.clone(),
                channel_id: signal.channel_id.clone(),
                symbol: signal.symbol.clone(),
                side: signal.side,
                reason,
                subscribers: signal.bindings.len(),
                timestamp: Utc::now(),
            });
            true
        };

        if close {
            self.finalize_signal(key, "position closed").await;
        }
    }

    fn handle_monitor_failure(&mut self, key: &SignalKey, error: &str) {
        let threshold = self.config.rotation_failure_threshold.max(1);
        let Some(signal) = self.signals.get_mut(key) else {
            return;
        };
        let PollStrategy::Api {
            pool,
            monitor_index,
            consecutive_failures,
        } = &mut signal.strategy
        else {
            return;
        };

        *consecutive_failures += 1;
        tracing::warn!(
            signal = %key,
            failures = *consecutive_failures,
            %error,
            "monitor credential check failed"
        );

        if *consecutive_failures < threshold {
            return;
        }

        if pool.len() > 1 {
            let from = pool[*monitor_index];
            *monitor_index = (*monitor_index + 1) % pool.len();
            let to = pool[*monitor_index];
            *consecutive_failures = 0;

            let from_user = signal.bindings[from].user_id.clone();
            let to_user = signal.bindings[to].user_id.clone();
            tracing::warn!(
                signal = %key,
                %from_user,
                %to_user,
                "rotating monitor credential"
            );
            self.gate.emit(MonitorEvent::MonitorRotated {
                key: key.clone(),
                symbol: signal.symbol.clone(),
                from_user,
                to_user,
                timestamp: Utc::now(),
            });
        } else {
            // Nobody to rotate to; keep trying the only credential.
            *consecutive_failures = 0;
            self.gate.emit(MonitorEvent::Error {
                key: Some(key.clone()),
                message: format!("sole monitor credential failing: {error}"),
                timestamp: Utc::now(),
            });
        }
    }

    /// Stop-loss first, then take-profits in ascending index order. Marks
    /// are idempotent; the first take-profit moves the stop to the entry
    /// reference exactly once. Returns whether the signal completed.
    fn evaluate_targets(
        key: &SignalKey,
        signal: &mut MonitoredSignal,
        gate: &mut NotificationGate,
        current: Decimal,
    ) -> bool {
        let entry = signal.entry_reference(current);
        let mut completed = false;

        if !signal.targets.sl {
            if let Some(stop) = signal.stop_loss.first().copied() {
                let hit = match signal.side {
                    Side::Buy => current <= stop,
                    Side::Sell => current >= stop,
                };
                if hit {
                    signal.targets.sl = true;
                    completed = true;
                    tracing::info!(signal = %key, symbol = %signal.symbol, %stop, %current, "stop loss hit");
                    gate.emit(MonitorEvent::TargetHit {
                        key: key.clone(),
                        channel_id: signal.channel_id.clone(),
                        symbol: signal.symbol.clone(),
                        side: signal.side,
                        kind: TargetKind::StopLoss,
                        target_price: stop,
                        current_price: current,
                        entry_price: entry,
                        pnl_percent: pnl_percent(signal.side, entry, current),
                        subscribers: signal.bindings.len(),
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        for index in 0..signal.take_profits.len() {
            if signal.targets.tp.contains(&index) {
                continue;
            }
            let target = signal.take_profits[index];
            let hit = match signal.side {
                Side::Buy => current >= target,
                Side::Sell => current <= target,
            };
            if !hit {
                continue;
            }

            signal.targets.tp.insert(index);
            tracing::info!(signal = %key, symbol = %signal.symbol, level = index, %target, %current, "take profit hit");
            gate.emit(MonitorEvent::TargetHit {
                key: key.clone(),
                channel_id: signal.channel_id.clone(),
                symbol: signal.symbol.clone(),
                side: signal.side,
                kind: TargetKind::TakeProfit(index),
                target_price: target,
                current_price: current,
                entry_price: entry,
                pnl_percent: pnl_percent(signal.side, entry, current),
                subscribers: signal.bindings.len(),
                timestamp: Utc::now(),
            });

            // One-way transition: first take-profit makes the rest of the
            // position risk-free.
            if index == 0 && !signal.targets.sl_moved_to_breakeven {
                let old_stop = signal.stop_loss.first().copied();
                signal.stop_loss = vec![entry];
                signal.targets.sl_moved_to_breakeven = true;
                tracing::info!(signal = %key, symbol = %signal.symbol, ?old_stop, new_stop = %entry, "stop moved to break-even");
                gate.emit(MonitorEvent::StopMovedToBreakEven {
                    key: key.clone(),
                    channel_id: signal.channel_id.clone(),
                    symbol: signal.symbol.clone(),
                    old_stop,
                    new_stop: entry,
                    timestamp: Utc::now(),
                });
            }
        }

        if signal.targets.all_tps_hit(signal.take_profits.len()) {
            completed = true;
        }
        completed
    }

    /// Mirrors the signal's `TargetsHit` to every bound trade row. Store
    /// errors are logged; state transitions stay authoritative.
    async fn persist_signal_targets(&self, key: &SignalKey) {
        let Some(signal) = self.signals.get(key) else {
            return;
        };
        let targets = signal.targets.clone();
        let trade_ids: Vec<u64> = signal.bindings.iter().map(|b| b.trade_id).collect();

        for trade_id in trade_ids {
            if let Err(err) = self.store.update_targets_hit(trade_id, &targets).await {
                tracing::error!(trade_id, error = %err, "failed to persist targets");
            }
        }
    }

    /// Terminal bookkeeping: completed status in the store, one-time
    /// cancellation of still-open entry/DCA orders, state → completed.
    async fn finalize_signal(&mut self, key: &SignalKey, reason: &str) {
        let (cancel_jobs, trade_ids, channel_id, symbol) = {
            let Some(signal) = self.signals.get_mut(key) else {
                return;
            };
            signal.status = SignalStatus::Completed;

            let jobs: Vec<(ExchangeKind, Option<Credentials>, Vec<String>)> =
                if signal.cancellation_sent {
                    Vec::new()
                } else {
                    signal.cancellation_sent = true;
                    signal
                        .bindings
                        .iter()
                        .filter(|b| !b.entry_order_ids.is_empty())
                        .map(|b| (b.exchange, b.credentials.clone(), b.entry_order_ids.clone()))
                        .collect()
                };

            (
                jobs,
                signal.bindings.iter().map(|b| b.trade_id).collect::<Vec<u64>>(),
                signal.channel_id.clone(),
                signal.symbol.clone(),
            )
        };

        for trade_id in trade_ids {
            if let Err(err) = self.store.set_status(trade_id, TradeStatus::Completed).await {
                tracing::error!(trade_id, error = %err, "failed to mark trade completed");
            }
        }

        if cancel_jobs.is_empty() {
            return;
        }

        let mut cancelled = 0usize;
        for (exchange, credentials, order_ids) in cancel_jobs {
            let Some(credentials) = credentials else {
                // Replayed bindings carry no credentials; their resting
                // orders must be cleaned up by the subscriber.
                continue;
            };
            let Some(connector) = self.connectors.get(exchange) else {
                continue;
            };
            for order_id in order_ids {
                match connector.cancel_order(&credentials, &symbol, &order_id).await {
                    Ok(()) => cancelled += 1,
                    Err(err) => {
                        // Already filled or already gone is the common case.
                        tracing::debug!(%order_id, error = %err, "entry order cancel skipped");
                    }
                }
            }
        }

        self.gate.emit(MonitorEvent::EntriesCancelled {
            key: key.clone(),
            channel_id,
            symbol,
            cancelled,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
    }
}

fn pnl_percent(side: Side, entry: Decimal, current: Decimal) -> Decimal {
    if entry <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    match side {
        Side::Buy => (current - entry) / entry * Decimal::ONE_HUNDRED,
        Side::Sell => (entry - current) / entry * Decimal::ONE_HUNDRED,
    }
}
