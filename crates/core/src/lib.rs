pub mod config;
pub mod config_loader;
pub mod connector;
pub mod credentials;
pub mod error;
pub mod limits;
pub mod risk;
pub mod signal;
pub mod store;

pub use config::{AppConfig, BybitConfig, EngineConfig, HyperliquidConfig, MonitorConfig};
pub use config_loader::ConfigLoader;
pub use connector::{
    enforce_slippage, snap_to_increment, Balance, ConnectorRegistry, ErrorInfo,
    ExchangeConnector, ExchangeKind, ExecutionResult, PositionSnapshot, SnapDirection,
    MAX_SLIPPAGE_PERCENT,
};
pub use credentials::Credentials;
pub use error::{ConnectorError, RiskError};
pub use limits::{ApiRateLimiter, RetryPolicy};
pub use risk::{size_order, RiskMode, RiskSettings, SizedOrder};
pub use signal::{Side, Signal, SignalKey};
pub use store::{
    MemoryTradeStore, NewTrade, TargetsHit, TradeBinding, TradeRecord, TradeStatus, TradeStore,
};
