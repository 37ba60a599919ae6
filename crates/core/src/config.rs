use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub monitor: MonitorConfig,
    pub hyperliquid: HyperliquidConfig,
    pub bybit: BybitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Leverage applied when a signal does not specify one.
    pub default_leverage: u8,
    /// Accounts below this balance are rejected before sizing.
    pub min_account_balance: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_leverage: 20,
            min_account_balance: Decimal::TEN,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Price-based polling interval.
    pub poll_interval_secs: u64,
    /// Position-based polling interval.
    pub api_poll_interval_secs: u64,
    /// Bound on the notification dedup set.
    pub dedup_cap: usize,
    /// Consecutive failures before rotating the monitor credential.
    pub rotation_failure_threshold: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1,
            api_poll_interval_secs: 3,
            dedup_cap: 4096,
            rotation_failure_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HyperliquidConfig {
    pub api_url: String,
    pub testnet_api_url: String,
    /// Discovered tick sizes are persisted here across restarts.
    pub tick_cache_path: String,
    pub calls_per_second: u32,
    pub burst: u32,
}

impl Default for HyperliquidConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.hyperliquid.xyz".to_string(),
            testnet_api_url: "https://api.hyperliquid-testnet.xyz".to_string(),
            tick_cache_path: "data/discovered_ticks.json".to_string(),
            calls_per_second: 20,
            burst: 40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BybitConfig {
    pub api_url: String,
    pub testnet_api_url: String,
    pub recv_window_ms: u64,
    pub calls_per_second: u32,
    pub burst: u32,
}

impl Default for BybitConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.bybit.com".to_string(),
            testnet_api_url: "https://api-testnet.bybit.com".to_string(),
            recv_window_ms: 5000,
            calls_per_second: 10,
            burst: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.engine.default_leverage, 20);
        assert_eq!(config.engine.min_account_balance, dec!(10));
        assert_eq!(config.monitor.rotation_failure_threshold, 3);
        assert!(config.hyperliquid.api_url.starts_with("https://"));
        assert_eq!(config.bybit.recv_window_ms, 5000);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        use figment::providers::{Format, Toml};
        use figment::Figment;

        let config: AppConfig = Figment::new()
            .merge(Toml::string(
                r#"
                [engine]
                default_leverage = 5
                "#,
            ))
            .extract()
            .unwrap();
        assert_eq!(config.engine.default_leverage, 5);
        // Untouched sections keep their defaults.
        assert_eq!(config.monitor.dedup_cap, 4096);
        assert_eq!(config.hyperliquid.calls_per_second, 20);
    }
}
