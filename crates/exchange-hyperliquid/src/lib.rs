pub mod client;
pub mod connector;
pub mod meta;
pub mod signing;
pub mod ticks;
pub mod wallet;

pub use client::HyperliquidClient;
pub use connector::HyperliquidConnector;
pub use ticks::TickCache;
