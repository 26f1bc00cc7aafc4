//! Configuration Types

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::protocol::constants::*;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub relay: RelaySettings,
    pub channels: Vec<ChannelConfig>,
    pub monitoring: MonitoringConfig,
}

/// Settings shared by every relay channel
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Largest frame accepted from a producer, in bytes
    pub max_frame_size: usize,
    /// Window length for throughput rate lines
    #[serde(with = "humantime_serde")]
    pub report_interval: Duration,
    /// Disable Nagle's algorithm on producer and subscriber sockets
    pub tcp_nodelay: bool,
}

/// One relay channel: an inbound/outbound address pair
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelConfig {
    pub name: String,
    pub inbound_addr: SocketAddr,
    pub outbound_addr: SocketAddr,
    #[serde(default)]
    pub monitored: bool,
}

/// Logging and metrics export configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub metrics_addr: Option<SocketAddr>,
}

impl ChannelConfig {
    /// Create a channel record
    pub fn new(
        name: impl Into<String>,
        inbound_addr: SocketAddr,
        outbound_addr: SocketAddr,
        monitored: bool,
    ) -> Self {
        Self {
            name: name.into(),
            inbound_addr,
            outbound_addr,
            monitored,
        }
    }

    /// The video channel on its fixed address pair
    pub fn video() -> Self {
        Self::new(
            VIDEO_CHANNEL,
            any_interface(VIDEO_INBOUND_PORT),
            any_interface(VIDEO_OUTBOUND_PORT),
            true,
        )
    }

    /// The metadata channel on its fixed address pair
    pub fn metadata() -> Self {
        Self::new(
            METADATA_CHANNEL,
            any_interface(METADATA_INBOUND_PORT),
            any_interface(METADATA_OUTBOUND_PORT),
            false,
        )
    }
}

fn any_interface(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay: RelaySettings::default(),
            channels: vec![ChannelConfig::video(), ChannelConfig::metadata()],
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            report_interval: Duration::from_secs(DEFAULT_REPORT_INTERVAL_SECS),
            tcp_nodelay: true, // Frames are latency sensitive
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_addr: None,
        }
    }
}
