//! Typed events published by the monitoring engine.
//!
//! The engine never talks to a chat platform. It publishes these on a
//! broadcast channel; whatever delivers notifications subscribes. Events
//! that notify users carry a deterministic dedup key so delivery is
//! at-most-once per signal per target.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trade_relay_core::signal::{Side, SignalKey};

/// Which target level fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    StopLoss,
    /// Zero-based take-profit index.
    TakeProfit(usize),
}

impl TargetKind {
    #[must_use]
    pub fn label(self) -> String {
        match self {
            Self::StopLoss => "SL".to_string(),
            Self::TakeProfit(index) => format!("TP{index}"),
        }
    }
}

/// Why a monitored position stopped being monitored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    AllTargets,
    /// Hit / total take-profit counts at close time.
    PartialTargets(usize, usize),
    Manual,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopLoss => write!(f, "stop loss"),
            Self::AllTargets => write!(f, "all take profits"),
            Self::PartialTargets(hit, total) => write!(f, "partial close ({hit}/{total} TPs)"),
            Self::Manual => write!(f, "manual close"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MonitorEvent {
    /// A real or inferred fill moved the signal from waiting to active.
    PositionOpened {
        key: SignalKey,
        channel_id: String,
        symbol: String,
        side: Side,
        fill_price: Decimal,
        size: Decimal,
        subscribers: usize,
        timestamp: DateTime<Utc>,
    },

    /// A stop-loss or take-profit level fired.
    TargetHit {
        key: SignalKey,
        channel_id: String,
        symbol: String,
        side: Side,
        kind: TargetKind,
        target_price: Decimal,
        current_price: Decimal,
        entry_price: Decimal,
        pnl_percent: Decimal,
        subscribers: usize,
        timestamp: DateTime<Utc>,
    },

    /// First take-profit hit moved the stop to the entry price.
    StopMovedToBreakEven {
        key: SignalKey,
        channel_id: String,
        symbol: String,
        old_stop: Option<Decimal>,
        new_stop: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// Position disappeared or finished while being monitored.
    PositionClosed {
        key: SignalKey,
        channel_id: String,
        symbol: String,
        side: Side,
        reason: CloseReason,
        subscribers: usize,
        timestamp: DateTime<Utc>,
    },

    /// Terminal: the signal left the monitoring set.
    SignalCompleted {
        key: SignalKey,
        symbol: String,
        timestamp: DateTime<Utc>,
    },

    /// Still-open entry/DCA orders were cancelled after completion.
    EntriesCancelled {
        key: SignalKey,
        channel_id: String,
        symbol: String,
        cancelled: usize,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The monitoring credential rotated after repeated failures.
    MonitorRotated {
        key: SignalKey,
        symbol: String,
        from_user: String,
        to_user: String,
        timestamp: DateTime<Utc>,
    },

    /// A per-signal monitoring error (logged, loop keeps running).
    Error {
        key: Option<SignalKey>,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl MonitorEvent {
    /// Deterministic dedup key for events that must be delivered at most
    /// once. Events returning `None` are not deduplicated.
    #[must_use]
    pub fn dedup_key(&self) -> Option<String> {
        match self {
            Self::TargetHit {
                channel_id,
                symbol,
                side,
                kind,
                target_price,
                ..
            } => Some(format!(
                "{symbol}:{side}:{}:{}:{channel_id}",
                kind.label(),
                target_price.normalize()
            )),
            Self::PositionClosed {
                channel_id,
                symbol,
                side,
                ..
            } => Some(format!("{symbol}:{side}:CLOSED:{channel_id}")),
            Self::EntriesCancelled { key, .. } => Some(format!("{key}:DCA_CANCEL")),
            _ => None,
        }
    }
}

/// Dedup key for a stop-loss level, used to pre-seed the gate when
/// partially-hit state is reloaded from storage.
#[must_use]
pub fn stop_loss_key(symbol: &str, side: Side, price: Decimal, channel_id: &str) -> String {
    format!("{symbol}:{side}:SL:{}:{channel_id}", price.normalize())
}

/// Dedup key for a take-profit level by zero-based index.
#[must_use]
pub fn take_profit_key(
    symbol: &str,
    side: Side,
    index: usize,
    price: Decimal,
    channel_id: &str,
) -> String {
    format!("{symbol}:{side}:TP{index}:{}:{channel_id}", price.normalize())
}
