//! Execution fan-out.
//!
//! One parsed signal, many subscribers: each eligible subscriber gets its
//! own task that fetches balance, sizes the order, and calls the venue
//! connector. Failures stay scoped to their subscriber; the report carries
//! the aggregate plus the subscriber→trade bindings the monitoring engine
//! groups on.

use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::task::JoinSet;
use trade_relay_core::config::EngineConfig;
use trade_relay_core::connector::{ConnectorRegistry, ErrorInfo, ExchangeConnector, ExecutionResult};
use trade_relay_core::risk::{size_order, RiskSettings, SizedOrder};
use trade_relay_core::signal::{Signal, SignalKey};
use trade_relay_core::store::{NewTrade, TradeBinding, TradeStore};

/// One channel subscriber as the engine sees it: identity, ban flag, and
/// the risk settings (including credentials) configured for this channel.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub user_id: String,
    pub banned: bool,
    pub settings: RiskSettings,
}

/// Per-subscriber outcome of one signal execution.
#[derive(Debug, Clone)]
pub struct SubscriberOutcome {
    pub user_id: String,
    pub result: ExecutionResult,
    /// Persisted trade row, present on success.
    pub trade_id: Option<u64>,
}

/// Aggregate of one fan-out run.
#[derive(Debug)]
pub struct ExecutionReport {
    pub signal_key: SignalKey,
    pub outcomes: Vec<SubscriberOutcome>,
    /// Bindings for every successful execution, in subscriber order.
    pub bindings: Vec<TradeBinding>,
}

impl ExecutionReport {
    #[must_use]
    pub fn successful(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.success).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.successful()
    }

    /// One-line aggregate for the channel, with enough detail per failure
    /// for the subscriber to self-correct.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} trades executed, {} failed",
            self.successful(),
            self.failed()
        );
        for outcome in self.outcomes.iter().filter(|o| !o.result.success) {
            if let Some(error) = &outcome.result.error {
                summary.push_str(&format!(
                    "\n  {}: {} ({})",
                    outcome.user_id, error.message, error.code
                ));
            }
        }
        summary
    }
}

pub struct ExecutionCoordinator {
    connectors: ConnectorRegistry,
    store: Arc<dyn TradeStore>,
    default_leverage: u8,
    min_account_balance: Decimal,
}

impl ExecutionCoordinator {
    #[must_use]
    pub fn new(
        connectors: ConnectorRegistry,
        store: Arc<dyn TradeStore>,
        engine: &EngineConfig,
    ) -> Self {
        Self {
            connectors,
            store,
            default_leverage: engine.default_leverage,
            min_account_balance: engine.min_account_balance,
        }
    }

    /// Executes `signal` for every eligible subscriber concurrently and
    /// persists the successful trades.
    ///
    /// Eligibility: not banned, a connector exists for the subscriber's
    /// exchange, and the credentials pass the connector's local shape
    /// check. One subscriber's failure never aborts another's execution.
    pub async fn execute(&self, signal: &Signal, subscribers: &[Subscriber]) -> ExecutionReport {
        let mut tasks: JoinSet<SubscriberOutcome> = JoinSet::new();

        for subscriber in subscribers {
            if subscriber.banned {
                tracing::debug!(user = %subscriber.user_id, "skipping banned subscriber");
                continue;
            }
            let Some(connector) = self.connectors.get(subscriber.settings.exchange) else {
                tracing::warn!(
                    user = %subscriber.user_id,
                    exchange = %subscriber.settings.exchange,
                    "no connector for subscriber's exchange"
                );
                continue;
            };
            if !connector.validate_credentials(&subscriber.settings.credentials) {
                tracing::debug!(user = %subscriber.user_id, "skipping subscriber with malformed credentials");
                continue;
            }

            let subscriber = subscriber.clone();
            let signal = signal.clone();
            let default_leverage = self.default_leverage;
            let min_balance = self.min_account_balance;

            tasks.spawn(async move {
                execute_for_subscriber(connector, subscriber, signal, default_leverage, min_balance)
                    .await
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    // A panicking task loses its own outcome only.
                    tracing::error!(error = %err, "subscriber execution task failed");
                }
            }
        }
        // Task completion order is nondeterministic.
        outcomes.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        let mut bindings = Vec::new();
        for outcome in &mut outcomes {
            if !outcome.result.success {
                continue;
            }
            let Some(subscriber) = subscribers.iter().find(|s| s.user_id == outcome.user_id)
            else {
                continue;
            };

            let entry_price = outcome
                .result
                .fill_price
                .or_else(|| signal.primary_entry())
                .unwrap_or(Decimal::ZERO);
            let size = outcome.result.executed_size.unwrap_or(Decimal::ZERO);

            let new_trade = NewTrade {
                user_id: outcome.user_id.clone(),
                exchange: subscriber.settings.exchange,
                symbol: signal.symbol.clone(),
                side: signal.side,
                size,
                entry_price,
                stop_loss: signal.stop_loss.clone(),
                take_profits: signal.take_profits.clone(),
                channel_id: signal.channel_id.clone(),
                message_id: signal.message_id.clone(),
                signal_key: signal.key(),
                entry_order_ids: outcome.result.open_entry_order_ids(),
            };

            match self.store.insert_trade(new_trade).await {
                Ok(trade_id) => {
                    outcome.trade_id = Some(trade_id);
                    let credentials = subscriber
                        .settings
                        .credentials
                        .is_usable()
                        .then(|| subscriber.settings.credentials.clone());
                    bindings.push(TradeBinding {
                        trade_id,
                        user_id: outcome.user_id.clone(),
                        exchange: subscriber.settings.exchange,
                        size,
                        entry_order_ids: outcome.result.open_entry_order_ids(),
                        credentials,
                    });
                }
                Err(err) => {
                    // The venue order exists either way; monitoring will
                    // still cover the signal for other subscribers.
                    tracing::error!(user = %outcome.user_id, error = %err, "failed to persist trade");
                }
            }
        }

        let report = ExecutionReport {
            signal_key: signal.key(),
            outcomes,
            bindings,
        };
        tracing::info!(
            signal = %report.signal_key,
            successful = report.successful(),
            failed = report.failed(),
            "signal execution complete"
        );
        report
    }
}

async fn execute_for_subscriber(
    connector: Arc<dyn ExchangeConnector>,
    subscriber: Subscriber,
    signal: Signal,
    default_leverage: u8,
    min_balance: Decimal,
) -> SubscriberOutcome {
    let result =
        run_subscriber_pipeline(&connector, &subscriber.settings, &signal, default_leverage, min_balance)
            .await;

    let result = match result {
        Ok(result) => {
            tracing::info!(
                user = %subscriber.user_id,
                exchange = %subscriber.settings.exchange,
                symbol = %signal.symbol,
                "trade executed"
            );
            result
        }
        Err(error) => {
            tracing::warn!(
                user = %subscriber.user_id,
                symbol = %signal.symbol,
                code = %error.code,
                message = %error.message,
                "trade failed"
            );
            ExecutionResult {
                success: false,
                error: Some(error),
                ..ExecutionResult::default()
            }
        }
    };

    SubscriberOutcome {
        user_id: subscriber.user_id,
        result,
        trade_id: None,
    }
}

async fn run_subscriber_pipeline(
    connector: &Arc<dyn ExchangeConnector>,
    settings: &RiskSettings,
    signal: &Signal,
    default_leverage: u8,
    min_balance: Decimal,
) -> Result<ExecutionResult, ErrorInfo> {
    let balance = connector
        .get_balance(&settings.credentials)
        .await
        .map_err(|e| ErrorInfo::from(&e))?;

    let sized: SizedOrder = size_order(balance.total, signal, settings, default_leverage, min_balance)
        .map_err(|e| ErrorInfo {
            code: "risk_rejected".to_string(),
            message: e.to_string(),
        })?;

    connector
        .execute_trade(&settings.credentials, &sized, signal)
        .await
        .map_err(|e| ErrorInfo::from(&e))
}
