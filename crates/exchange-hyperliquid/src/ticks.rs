//! Tick size resolution and discovery.
//!
//! Hyperliquid rejects prices that are not a multiple of an asset's tick,
//! and does not publish ticks directly. Resolution order: a lookup table of
//! observed ticks for major assets, then the write-through cache of ticks
//! discovered at order time, then a price-magnitude heuristic. When an order
//! is rejected for a tick reason, the connector walks [`candidate_ticks`]
//! and records the first size that the venue accepts.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use trade_relay_core::connector::{snap_to_increment, SnapDirection};
use trade_relay_core::signal::Side;

/// Observed tick sizes for known assets.
const TICK_SIZE_TABLE: &[(&str, &str)] = &[
    ("BTC", "0.5"),
    ("ETH", "0.05"),
    ("SOL", "0.001"),
    ("BNB", "0.01"),
    ("AVAX", "0.001"),
    ("DOGE", "0.00001"),
    ("ARB", "0.0001"),
    ("OP", "0.0001"),
    ("SUI", "0.0001"),
    ("MATIC", "0.0001"),
    ("ATOM", "0.001"),
    ("LTC", "0.01"),
    ("INJ", "0.001"),
    ("DYDX", "0.001"),
    ("APE", "0.001"),
];

/// Ticks seen across venues, most common first. Tried last during discovery.
const COMMON_TICKS: &[&str] = &[
    "0.01", "0.001", "0.0001", "0.5", "0.05", "0.00001", "0.1", "1.0",
];

#[must_use]
pub fn lookup_table_tick(symbol: &str) -> Option<Decimal> {
    let upper = symbol.to_uppercase();
    TICK_SIZE_TABLE
        .iter()
        .find(|(name, _)| *name == upper)
        .and_then(|(_, tick)| Decimal::from_str(tick).ok())
}

/// Price-magnitude fallback when nothing is known about the asset.
#[must_use]
pub fn heuristic_tick(price: Decimal) -> Decimal {
    let thresholds: &[(&str, &str)] = &[
        ("10000", "0.5"),
        ("1000", "0.1"),
        ("100", "0.01"),
        ("10", "0.001"),
        ("1", "0.0001"),
    ];
    for (bound, tick) in thresholds {
        let bound = Decimal::from_str(bound).expect("threshold literal");
        if price >= bound {
            return Decimal::from_str(tick).expect("tick literal");
        }
    }
    Decimal::from_str("0.00001").expect("tick literal")
}

/// Snaps a price to the tick grid: buys round up, sells round down, so the
/// snapped order is always at least as marketable as the requested one.
#[must_use]
pub fn snap_to_tick(price: Decimal, tick: Decimal, side: Side) -> Decimal {
    let direction = match side {
        Side::Buy => SnapDirection::Up,
        Side::Sell => SnapDirection::Down,
    };
    snap_to_increment(price, tick, direction)
}

/// Write-through cache of ticks discovered at order time, persisted as JSON
/// so restarts keep the knowledge.
pub struct TickCache {
    path: PathBuf,
    discovered: RwLock<HashMap<String, Decimal>>,
}

impl TickCache {
    /// Loads the cache file when present; a missing or unreadable file is an
    /// empty cache, not an error.
    #[must_use]
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let discovered = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(map) => {
                    let parsed: HashMap<String, Decimal> = map
                        .into_iter()
                        .filter_map(|(symbol, tick)| {
                            Decimal::from_str(&tick).ok().map(|t| (symbol, t))
                        })
                        .collect();
                    tracing::info!(count = parsed.len(), path = %path.display(), "loaded discovered ticks");
                    parsed
                }
                Err(err) => {
                    tracing::warn!(error = %err, path = %path.display(), "tick cache unreadable, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self {
            path,
            discovered: RwLock::new(discovered),
        }
    }

    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<Decimal> {
        self.discovered.read().get(&symbol.to_uppercase()).copied()
    }

    /// Records a venue-accepted tick and writes the cache through to disk.
    pub fn record(&self, symbol: &str, tick: Decimal) {
        let snapshot = {
            let mut guard = self.discovered.write();
            guard.insert(symbol.to_uppercase(), tick);
            guard
                .iter()
                .map(|(s, t)| (s.clone(), t.to_string()))
                .collect::<HashMap<String, String>>()
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        match serde_json::to_string_pretty(&snapshot) {
            Ok(serialized) => {
                if let Err(err) = std::fs::write(&self.path, serialized) {
                    tracing::warn!(error = %err, path = %self.path.display(), "could not persist tick cache");
                }
            }
            Err(err) => tracing::warn!(error = %err, "could not serialize tick cache"),
        }
        tracing::info!(symbol, %tick, "discovered tick size cached");
    }

    /// Resolution used for a first attempt: table, then cache, then price
    /// heuristic.
    #[must_use]
    pub fn resolve(&self, symbol: &str, price: Decimal) -> Decimal {
        if let Some(tick) = lookup_table_tick(symbol) {
            return tick;
        }
        if let Some(tick) = self.get(symbol) {
            return tick;
        }
        let tick = heuristic_tick(price);
        tracing::debug!(symbol, %price, %tick, "no known tick, using heuristic");
        tick
    }

    /// True when the tick came from discovery rather than the static table.
    #[must_use]
    pub fn is_discovered(&self, symbol: &str) -> bool {
        lookup_table_tick(symbol).is_none() && self.get(symbol).is_some()
    }
}

/// Candidate ticks for discovery, in priority order: table, cache,
/// metadata-derived, then the common ladder. Deduplicated.
#[must_use]
pub fn candidate_ticks(
    symbol: &str,
    metadata_px_decimals: Option<u32>,
    cache: &TickCache,
) -> Vec<Decimal> {
    let mut candidates: Vec<Decimal> = Vec::new();
    let mut push = |tick: Decimal, list: &mut Vec<Decimal>| {
        if !list.contains(&tick) {
            list.push(tick);
        }
    };

    if let Some(tick) = lookup_table_tick(symbol) {
        push(tick, &mut candidates);
    }
    if let Some(tick) = cache.get(symbol) {
        push(tick, &mut candidates);
    }
    if let Some(decimals) = metadata_px_decimals {
        let tick = Decimal::new(1, decimals);
        push(tick, &mut candidates);
    }
    for tick in COMMON_TICKS {
        let tick = Decimal::from_str(tick).expect("tick literal");
        push(tick, &mut candidates);
    }

    candidates
}

/// Venue rejections that mean "wrong tick, try another" rather than a real
/// order failure.
#[must_use]
pub fn is_tick_rejection(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("tick") || lower.contains("divisible")
}
