use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use trade_relay_core::signal::Signal;
use trade_relay_core::store::TradeBinding;

/// Commands accepted by the monitoring engine actor.
#[derive(Debug)]
pub enum MonitorCommand {
    /// Start (or extend) monitoring for one executed signal.
    Track {
        signal: Signal,
        bindings: Vec<TradeBinding>,
    },

    /// Snapshot of the monitoring set.
    GetStats(oneshot::Sender<MonitorStats>),

    /// Stop the loop after the in-flight tick finishes.
    Shutdown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStats {
    pub waiting_entry: usize,
    pub active: usize,
    pub total: usize,
    pub api_strategy: usize,
    pub price_strategy: usize,
    pub subscribers: usize,
}
