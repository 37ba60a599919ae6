pub mod auth;
pub mod client;
pub mod connector;
pub mod types;

pub use client::BybitClient;
pub use connector::BybitConnector;
