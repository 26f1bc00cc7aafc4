//! Metrics Collector

use prometheus::{IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use tracing::error;

use crate::Result;

/// Per-channel relay metrics backed by a Prometheus registry
pub struct RelayMetrics {
    registry: Registry,
    frames_forwarded: IntCounterVec,
    bytes_forwarded: IntCounterVec,
    frames_conflated: IntCounterVec,
    receive_errors: IntCounterVec,
    send_errors: IntCounterVec,
    producers: IntGaugeVec,
    subscribers: IntGaugeVec,
}

/// Counter handles for a single channel.
///
/// Cloning is cheap: every handle shares the underlying atomic with the
/// registry, so endpoint tasks can each hold their own copy.
#[derive(Clone)]
pub struct ChannelMetrics {
    pub frames_forwarded: IntCounter,
    pub bytes_forwarded: IntCounter,
    pub frames_conflated: IntCounter,
    pub receive_errors: IntCounter,
    pub send_errors: IntCounter,
    pub producers: IntGauge,
    pub subscribers: IntGauge,
}

impl RelayMetrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let frames_forwarded = IntCounterVec::new(
            Opts::new(
                "flycam_frames_forwarded_total",
                "Frames forwarded from inbound to outbound",
            ),
            &["channel"],
        )?;
        let bytes_forwarded = IntCounterVec::new(
            Opts::new(
                "flycam_bytes_forwarded_total",
                "Payload bytes forwarded from inbound to outbound",
            ),
            &["channel"],
        )?;
        let frames_conflated = IntCounterVec::new(
            Opts::new(
                "flycam_frames_conflated_total",
                "Inbound frames replaced by a newer frame before being relayed",
            ),
            &["channel"],
        )?;
        let receive_errors = IntCounterVec::new(
            Opts::new("flycam_receive_errors_total", "Transient receive failures"),
            &["channel"],
        )?;
        let send_errors = IntCounterVec::new(
            Opts::new("flycam_send_errors_total", "Transient send failures"),
            &["channel"],
        )?;
        let producers = IntGaugeVec::new(
            Opts::new("flycam_producers", "Connected producers"),
            &["channel"],
        )?;
        let subscribers = IntGaugeVec::new(
            Opts::new("flycam_subscribers", "Connected subscribers"),
            &["channel"],
        )?;

        registry.register(Box::new(frames_forwarded.clone()))?;
        registry.register(Box::new(bytes_forwarded.clone()))?;
        registry.register(Box::new(frames_conflated.clone()))?;
        registry.register(Box::new(receive_errors.clone()))?;
        registry.register(Box::new(send_errors.clone()))?;
        registry.register(Box::new(producers.clone()))?;
        registry.register(Box::new(subscribers.clone()))?;

        Ok(Self {
            registry,
            frames_forwarded,
            bytes_forwarded,
            frames_conflated,
            receive_errors,
            send_errors,
            producers,
            subscribers,
        })
    }

    /// Get the counter handles labelled for one channel
    pub fn channel(&self, name: &str) -> ChannelMetrics {
        let labels = [name];
        ChannelMetrics {
            frames_forwarded: self.frames_forwarded.with_label_values(&labels),
            bytes_forwarded: self.bytes_forwarded.with_label_values(&labels),
            frames_conflated: self.frames_conflated.with_label_values(&labels),
            receive_errors: self.receive_errors.with_label_values(&labels),
            send_errors: self.send_errors.with_label_values(&labels),
            producers: self.producers.with_label_values(&labels),
            subscribers: self.subscribers.with_label_values(&labels),
        }
    }

    /// Render all metrics in the Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        match encoder.encode_to_string(&metric_families) {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Failed to encode metrics");
                String::new()
            }
        }
    }
}
