//! Metrics Module
//!
//! Prometheus counters for every relay channel and the scrape endpoint.

pub mod collector;
pub mod server;

pub use collector::{ChannelMetrics, RelayMetrics};
pub use server::MetricsServer;
