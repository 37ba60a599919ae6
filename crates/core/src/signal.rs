use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trade direction, normalized from LONG/BUY and SHORT/SELL keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured trade idea extracted from free text.
///
/// Immutable once parsed. `symbol` is the normalized base asset with any
/// quote suffix (USDT/USD/PERP) stripped. Entries beyond the first are
/// DCA levels; take-profit levels are kept in the order they appeared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub side: Side,
    pub entries: Vec<Decimal>,
    pub stop_loss: Vec<Decimal>,
    pub take_profits: Vec<Decimal>,
    pub leverage: Option<u8>,
    pub channel_id: String,
    pub message_id: String,
}

impl Signal {
    /// First entry price, when the signal is not a market order.
    #[must_use]
    pub fn primary_entry(&self) -> Option<Decimal> {
        self.entries.first().copied()
    }

    /// First stop-loss level, when one was given.
    #[must_use]
    pub fn primary_stop(&self) -> Option<Decimal> {
        self.stop_loss.first().copied()
    }

    /// Grouping key under which all subscriber trades for this signal are
    /// monitored together.
    #[must_use]
    pub fn key(&self) -> SignalKey {
        SignalKey::new(
            &self.channel_id,
            &self.symbol,
            self.primary_entry(),
            &self.message_id,
        )
    }
}

/// Identity of a monitored signal: (channel, symbol, first entry, message).
///
/// Two subscribers executing the same alert produce the same key, which is
/// what lets the monitoring engine poll once per signal instead of once per
/// subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalKey(String);

impl SignalKey {
    #[must_use]
    pub fn new(channel_id: &str, symbol: &str, first_entry: Option<Decimal>, message_id: &str) -> Self {
        let entry = first_entry.map_or_else(|| "0".to_string(), |p| p.normalize().to_string());
        Self(format!("{channel_id}:{symbol}:{entry}:{message_id}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SignalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
