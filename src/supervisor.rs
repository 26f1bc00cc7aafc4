//! Relay Supervisor
//!
//! Binds every configured channel up front, then runs them as independent
//! tasks. The first channel runs on the caller's task; the rest are spawned in
//! the background. Nothing runs unless every channel bound successfully.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::Config;
use crate::metrics::RelayMetrics;
use crate::relay::RelayChannel;
use crate::Result;

/// Bound addresses of one running channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAddrs {
    pub name: String,
    pub inbound: SocketAddr,
    pub outbound: SocketAddr,
    pub monitored: bool,
}

/// Owns every relay channel for the lifetime of the process
pub struct Supervisor {
    channels: Vec<RelayChannel>,
    metrics: Arc<RelayMetrics>,
}

impl Supervisor {
    /// Bind all configured channels.
    ///
    /// Fails on the first channel that cannot bind; channels already bound are
    /// released before returning.
    pub async fn start(config: &Config, metrics: Arc<RelayMetrics>) -> Result<Self> {
        if config.channels.is_empty() {
            anyhow::bail!("No relay channels configured");
        }

        let mut channels = Vec::with_capacity(config.channels.len());
        for channel_config in &config.channels {
            let channel = RelayChannel::start(channel_config, &config.relay, &metrics)
                .await
                .with_context(|| format!("Failed to start {} relay", channel_config.name))?;
            channels.push(channel);
        }

        Ok(Self { channels, metrics })
    }

    /// Addresses every channel is bound to, in configuration order
    pub fn channel_addrs(&self) -> Vec<ChannelAddrs> {
        self.channels
            .iter()
            .map(|channel| ChannelAddrs {
                name: channel.name().to_string(),
                inbound: channel.inbound_addr(),
                outbound: channel.outbound_addr(),
                monitored: channel.is_monitored(),
            })
            .collect()
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    /// Log the startup banner naming every bound address
    pub fn log_banner(&self) {
        info!("flycam relay running");
        for addrs in self.channel_addrs() {
            info!(
                "  {:<8} inbound {}  outbound {}{}",
                addrs.name,
                addrs.inbound,
                addrs.outbound,
                if addrs.monitored { "  (monitored)" } else { "" }
            );
        }
    }

    /// Run every channel. Never returns under normal operation.
    pub async fn run(self) {
        self.run_until(std::future::pending()).await
    }

    /// Run every channel until `shutdown` resolves, then stop them all
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut channels = self.channels.into_iter();
        let Some(primary) = channels.next() else {
            return;
        };

        let mut background = JoinSet::new();
        for channel in channels {
            let name = channel.name().to_string();
            background.spawn(async move {
                channel.run().await;
                name
            });
        }

        let primary_name = primary.name().to_string();
        let primary_loop = primary.run();
        tokio::pin!(primary_loop);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down relay channels");
                    break;
                }
                _ = &mut primary_loop => {
                    error!(channel = %primary_name, "Primary relay channel exited");
                    break;
                }
                Some(result) = background.join_next() => match result {
                    Ok(name) => error!(channel = %name, "Relay channel exited"),
                    Err(e) => error!(error = %e, "Relay channel task failed"),
                },
            }
        }

        background.shutdown().await;
    }
}
