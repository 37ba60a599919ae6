//! Asset metadata cache.
//!
//! Hyperliquid addresses assets by index into the `meta` universe, and order
//! sizes must respect each asset's `szDecimals`. The universe changes rarely,
//! so responses are cached for five minutes.

use crate::client::HyperliquidClient;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use trade_relay_core::error::ConnectorError;

/// Hyperliquid perp prices carry at most `6 - szDecimals` decimal places.
const MAX_PERP_DECIMALS: u32 = 6;

#[derive(Debug, Clone)]
pub struct AssetMeta {
    pub asset_id: u32,
    pub sz_decimals: u32,
}

impl AssetMeta {
    /// Price decimals implied by the venue's size precision.
    #[must_use]
    pub fn px_decimals(&self) -> u32 {
        MAX_PERP_DECIMALS.saturating_sub(self.sz_decimals)
    }
}

struct CachedUniverse {
    assets: Arc<HashMap<String, AssetMeta>>,
    fetched_at: Instant,
}

/// Five-minute cache over the `meta` endpoint.
pub struct MetaCache {
    ttl: Duration,
    inner: RwLock<Option<CachedUniverse>>,
}

impl Default for MetaCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl MetaCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(None),
        }
    }

    /// Returns the symbol → metadata map, refreshing when stale.
    ///
    /// # Errors
    /// Returns an error when no cached copy exists and the refresh fails.
    pub async fn assets(
        &self,
        client: &HyperliquidClient,
    ) -> Result<Arc<HashMap<String, AssetMeta>>, ConnectorError> {
        {
            let guard = self.inner.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(cached.assets.clone());
                }
            }
        }

        let mut guard = self.inner.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = guard.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.assets.clone());
            }
        }

        match Self::fetch(client).await {
            Ok(assets) => {
                let assets = Arc::new(assets);
                *guard = Some(CachedUniverse {
                    assets: assets.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(assets)
            }
            Err(err) => {
                // A stale universe beats none at all.
                if let Some(cached) = guard.as_ref() {
                    tracing::warn!(error = %err, "meta refresh failed, serving stale universe");
                    return Ok(cached.assets.clone());
                }
                Err(err)
            }
        }
    }

    async fn fetch(
        client: &HyperliquidClient,
    ) -> Result<HashMap<String, AssetMeta>, ConnectorError> {
        let response = client.post_info(&json!({"type": "meta"})).await?;
        Ok(parse_universe(&response))
    }
}

/// Parses the `meta` response's `universe` array into a symbol-keyed map.
#[must_use]
pub fn parse_universe(response: &serde_json::Value) -> HashMap<String, AssetMeta> {
    let mut assets = HashMap::new();
    let Some(universe) = response.get("universe").and_then(|u| u.as_array()) else {
        return assets;
    };

    for (index, asset) in universe.iter().enumerate() {
        let Some(name) = asset.get("name").and_then(|n| n.as_str()) else {
            continue;
        };
        let sz_decimals = asset
            .get("szDecimals")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as u32;

        assets.insert(
            name.to_uppercase(),
            AssetMeta {
                asset_id: index as u32,
                sz_decimals,
            },
        );
    }
    assets
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_universe_with_indices() {
        let response = json!({
            "universe": [
                {"name": "BTC", "szDecimals": 5, "maxLeverage": 50},
                {"name": "ETH", "szDecimals": 4},
                {"name": "SOL", "szDecimals": 2},
            ]
        });

        let assets = parse_universe(&response);
        assert_eq!(assets.len(), 3);
        assert_eq!(assets["BTC"].asset_id, 0);
        assert_eq!(assets["ETH"].asset_id, 1);
        assert_eq!(assets["SOL"].asset_id, 2);
        assert_eq!(assets["BTC"].sz_decimals, 5);
    }

    #[test]
    fn px_decimals_derived_from_size_precision() {
        let meta = AssetMeta {
            asset_id: 0,
            sz_decimals: 5,
        };
        assert_eq!(meta.px_decimals(), 1);

        let coarse = AssetMeta {
            asset_id: 1,
            sz_decimals: 0,
        };
        assert_eq!(coarse.px_decimals(), 6);
    }

    #[test]
    fn malformed_response_yields_empty_map() {
        assert!(parse_universe(&json!({})).is_empty());
        assert!(parse_universe(&json!({"universe": "nope"})).is_empty());
        let partial = json!({"universe": [{"szDecimals": 3}, {"name": "BTC"}]});
        let assets = parse_universe(&partial);
        assert_eq!(assets.len(), 1);
        assert_eq!(assets["BTC"].asset_id, 1);
        assert_eq!(assets["BTC"].sz_decimals, 0);
    }
}
