use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::io::Read;
use std::str::FromStr;
use std::sync::Arc;
use trade_relay_bybit::BybitConnector;
use trade_relay_core::config::AppConfig;
use trade_relay_core::config_loader::ConfigLoader;
use trade_relay_core::connector::{ConnectorRegistry, ExchangeKind};
use trade_relay_core::credentials::Credentials;
use trade_relay_core::limits::{ApiRateLimiter, RetryPolicy};
use trade_relay_core::risk::{RiskMode, RiskSettings};
use trade_relay_core::store::MemoryTradeStore;
use trade_relay_execution::{ExecutionCoordinator, Subscriber};
use trade_relay_hyperliquid::HyperliquidConnector;
use trade_relay_monitor::{MonitorEngine, MonitorEvent};
use trade_relay_signals::SignalParser;

/// Builds the connector registry from config, with one limiter instance per
/// venue injected at construction.
fn build_registry(config: &AppConfig) -> Result<ConnectorRegistry> {
    let retry = RetryPolicy::default();
    let mut registry = ConnectorRegistry::new();

    let hl_limiter = Arc::new(ApiRateLimiter::new(
        config.hyperliquid.calls_per_second,
        config.hyperliquid.burst,
    )?);
    registry.register(Arc::new(HyperliquidConnector::new(
        &config.hyperliquid,
        hl_limiter,
        retry.clone(),
    )?));

    let bybit_limiter = Arc::new(ApiRateLimiter::new(
        config.bybit.calls_per_second,
        config.bybit.burst,
    )?);
    registry.register(Arc::new(BybitConnector::new(
        &config.bybit,
        bybit_limiter,
        retry,
    )?));

    Ok(registry)
}

/// Runs the monitoring engine until ctrl-c, logging every published event.
pub async fn run(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    let registry = build_registry(&config)?;
    let store = Arc::new(MemoryTradeStore::new());

    let (mut engine, handle) = MonitorEngine::new(config.monitor.clone(), registry, store);
    let restored = engine.load_persisted().await?;
    tracing::info!(restored, "monitoring engine loaded");

    let mut events = handle.subscribe();
    let event_logger = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            log_event(&event);
        }
    });

    let join = engine.spawn();
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutting down");

    handle.shutdown().await?;
    join.await?;
    event_logger.abort();
    Ok(())
}

/// Parses alert text and prints the extracted signals as JSON.
pub fn parse(text: Option<String>) -> Result<()> {
    let text = match text {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("reading alert text from stdin")?;
            buffer
        }
    };

    let parser = SignalParser::new();
    let signals = parser.parse(&text, "cli", "cli");
    println!("{}", serde_json::to_string_pretty(&signals)?);
    Ok(())
}

/// Parses the alert, executes it for a single subscriber, and monitors the
/// resulting signal until it completes or ctrl-c.
pub async fn execute(
    text: &str,
    exchange: &str,
    api_key: &str,
    api_secret: &str,
    fixed_amount: &str,
    testnet: bool,
    config_path: &str,
) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    let exchange = ExchangeKind::from_str(exchange)?;
    let fixed_amount =
        Decimal::from_str(fixed_amount).context("fixed amount must be a decimal")?;

    let parser = SignalParser::new();
    let signals = parser.parse(text, "cli", "cli");
    if signals.is_empty() {
        anyhow::bail!("no signal found in the given text");
    }

    let registry = build_registry(&config)?;
    let store = Arc::new(MemoryTradeStore::new());
    let coordinator =
        ExecutionCoordinator::new(registry.clone(), store.clone(), &config.engine);

    let credentials = Credentials::new(exchange, api_key, api_secret).with_testnet(testnet);
    let subscriber = Subscriber {
        user_id: "cli".to_string(),
        banned: false,
        settings: RiskSettings {
            mode: RiskMode::Fixed,
            fixed_amount,
            percentage_of_balance: Decimal::ZERO,
            max_risk_percent: Decimal::TWO,
            exchange,
            credentials,
        },
    };

    let (engine, handle) = MonitorEngine::new(config.monitor.clone(), registry, store);
    let mut events = handle.subscribe();
    let join = engine.spawn();

    for signal in signals {
        let report = coordinator.execute(&signal, &[subscriber.clone()]).await;
        println!("{}", report.summary());
        if !report.bindings.is_empty() {
            handle.track(signal, report.bindings).await?;
        }
    }

    let stats = handle.stats().await?;
    if stats.total == 0 {
        tracing::warn!("nothing to monitor, exiting");
    } else {
        tracing::info!(signals = stats.total, "monitoring until completion (ctrl-c to stop)");
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => {
                        log_event(&event);
                        if matches!(event, MonitorEvent::SignalCompleted { .. })
                            && handle.stats().await?.total == 0
                        {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }
    }

    handle.shutdown().await?;
    join.await?;
    Ok(())
}

/// Queries the account balance on one venue.
pub async fn balance(
    exchange: &str,
    api_key: &str,
    api_secret: &str,
    testnet: bool,
    config_path: &str,
) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    let exchange = ExchangeKind::from_str(exchange)?;
    let registry = build_registry(&config)?;
    let connector = registry
        .get(exchange)
        .context("no connector for that exchange")?;

    let credentials = Credentials::new(exchange, api_key, api_secret).with_testnet(testnet);
    let balance = connector.get_balance(&credentials).await?;
    println!(
        "{}: total {}, available {}",
        exchange, balance.total, balance.available
    );
    Ok(())
}

fn log_event(event: &MonitorEvent) {
    match event {
        MonitorEvent::PositionOpened {
            symbol,
            side,
            fill_price,
            subscribers,
            ..
        } => tracing::info!(%symbol, %side, %fill_price, subscribers, "position opened"),
        MonitorEvent::TargetHit {
            symbol,
            side,
            kind,
            target_price,
            current_price,
            pnl_percent,
            subscribers,
            ..
        } => tracing::info!(
            %symbol, %side, target = %kind.label(), %target_price, %current_price,
            %pnl_percent, subscribers, "target hit"
        ),
        MonitorEvent::StopMovedToBreakEven {
            symbol, new_stop, ..
        } => tracing::info!(%symbol, %new_stop, "stop moved to break-even"),
        MonitorEvent::PositionClosed {
            symbol, reason, ..
        } => tracing::info!(%symbol, %reason, "position closed"),
        MonitorEvent::SignalCompleted { key, symbol, .. } => {
            tracing::info!(%key, %symbol, "signal completed");
        }
        MonitorEvent::EntriesCancelled {
            symbol, cancelled, reason, ..
        } => tracing::info!(%symbol, cancelled, %reason, "entry orders cancelled"),
        MonitorEvent::MonitorRotated {
            symbol, from_user, to_user, ..
        } => tracing::warn!(%symbol, %from_user, %to_user, "monitor credential rotated"),
        MonitorEvent::Error { message, .. } => tracing::error!(%message, "monitoring error"),
    }
}
