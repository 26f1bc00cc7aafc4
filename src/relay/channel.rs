//! Relay Channel
//!
//! Moves the newest frame from an inbound endpoint to an outbound endpoint,
//! forever. The channel owns both endpoints privately; once it is moved into
//! its task nothing else can touch them.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;

use anyhow::Context;
use tracing::{debug, info, warn};

use super::endpoint::{FrameSink, FrameSource, InboundEndpoint, OutboundEndpoint};
use super::monitor::ThroughputMonitor;
use crate::config::{ChannelConfig, RelaySettings};
use crate::metrics::{ChannelMetrics, RelayMetrics};
use crate::Result;

/// Result of one pass through the relay loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// A frame of `bytes` length reached the outbound endpoint
    Forwarded { bytes: usize },
    /// Receiving failed; nothing was forwarded
    ReceiveFailed,
    /// Sending failed; the frame was dropped
    SendFailed,
}

/// A relay channel: one frame source, one frame sink, and the loop between them
pub struct RelayChannel<S = InboundEndpoint, K = OutboundEndpoint> {
    name: String,
    source: S,
    sink: K,
    monitor: Option<ThroughputMonitor>,
    metrics: ChannelMetrics,
}

impl RelayChannel {
    /// Bind both endpoints of a configured channel.
    ///
    /// A bind failure on either side is returned as an error and the channel
    /// is never created.
    pub async fn start(
        config: &ChannelConfig,
        settings: &RelaySettings,
        metrics: &RelayMetrics,
    ) -> Result<Self> {
        let channel_metrics = metrics.channel(&config.name);

        let inbound = InboundEndpoint::bind(
            &config.name,
            config.inbound_addr,
            settings,
            channel_metrics.clone(),
        )
        .await
        .with_context(|| {
            format!(
                "Failed to bind {} inbound endpoint on {}",
                config.name, config.inbound_addr
            )
        })?;

        let outbound = OutboundEndpoint::bind(
            &config.name,
            config.outbound_addr,
            settings,
            channel_metrics.clone(),
        )
        .await
        .with_context(|| {
            format!(
                "Failed to bind {} outbound endpoint on {}",
                config.name, config.outbound_addr
            )
        })?;

        info!(
            channel = %config.name,
            inbound = %inbound.local_addr(),
            outbound = %outbound.local_addr(),
            "Relay channel bound"
        );

        let monitor = config
            .monitored
            .then(|| ThroughputMonitor::new(config.name.clone(), settings.report_interval));

        Ok(Self::new(
            config.name.clone(),
            inbound,
            outbound,
            monitor,
            channel_metrics,
        ))
    }

    /// Address producers connect to
    pub fn inbound_addr(&self) -> SocketAddr {
        self.source.local_addr()
    }

    /// Address subscribers connect to
    pub fn outbound_addr(&self) -> SocketAddr {
        self.sink.local_addr()
    }
}

impl<S: FrameSource, K: FrameSink> RelayChannel<S, K> {
    /// Assemble a channel from an arbitrary source and sink
    pub fn new(
        name: impl Into<String>,
        source: S,
        sink: K,
        monitor: Option<ThroughputMonitor>,
        metrics: ChannelMetrics,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            sink,
            monitor,
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_monitored(&self) -> bool {
        self.monitor.is_some()
    }

    /// Run one iteration of the relay loop
    pub async fn forward_once(&mut self) -> ForwardOutcome {
        let frame = match self.source.recv().await {
            Ok(frame) => frame,
            Err(e) => {
                warn!(channel = %self.name, error = %e, "Receive error");
                self.metrics.receive_errors.inc();
                return ForwardOutcome::ReceiveFailed;
            }
        };

        let bytes = frame.len();
        if let Err(e) = self.sink.send(frame).await {
            warn!(channel = %self.name, error = %e, "Send error, frame dropped");
            self.metrics.send_errors.inc();
            return ForwardOutcome::SendFailed;
        }

        self.metrics.frames_forwarded.inc();
        self.metrics.bytes_forwarded.inc_by(bytes as u64);

        if let Some(monitor) = self.monitor.as_mut() {
            monitor.record(bytes);
            monitor.maybe_report(Instant::now());
        }

        ForwardOutcome::Forwarded { bytes }
    }

    /// Relay frames forever. Failures are logged and the loop keeps going.
    pub async fn run(mut self) {
        debug!(channel = %self.name, "Relay loop started");
        loop {
            self.forward_once().await;
        }
    }

    /// Relay frames until `shutdown` resolves
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let name = self.name.clone();
        debug!(channel = %name, "Relay loop started");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.forward_once() => {}
            }
        }

        info!(channel = %name, "Relay loop stopped");
    }
}
