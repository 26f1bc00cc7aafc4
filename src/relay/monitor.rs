//! Throughput monitor
//!
//! Counts forwarded bytes and frames and logs a rate line once per window.
//! Observation only: it never delays or alters forwarding.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::info;

use crate::protocol::constants::BYTES_PER_KB;

/// Rate computed over one completed window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputReport {
    pub kbps: f64,
    pub fps: f64,
    pub bytes: u64,
    pub frames: u64,
    pub elapsed: Duration,
}

impl fmt::Display for ThroughputReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} KB/s  {:.1} fps", self.kbps, self.fps)
    }
}

/// Rolling byte/frame accumulator for one channel
#[derive(Debug)]
pub struct ThroughputMonitor {
    channel: String,
    interval: Duration,
    byte_total: u64,
    frame_total: u64,
    window_start: Instant,
}

impl ThroughputMonitor {
    /// Create a monitor whose first window starts now
    pub fn new(channel: impl Into<String>, interval: Duration) -> Self {
        Self::starting_at(channel, interval, Instant::now())
    }

    /// Create a monitor whose first window starts at `start`
    pub fn starting_at(channel: impl Into<String>, interval: Duration, start: Instant) -> Self {
        Self {
            channel: channel.into(),
            interval,
            byte_total: 0,
            frame_total: 0,
            window_start: start,
        }
    }

    /// Account one forwarded frame
    pub fn record(&mut self, frame_len: usize) {
        self.byte_total += frame_len as u64;
        self.frame_total += 1;
    }

    /// Log and return the rate if the current window has elapsed, then start
    /// a new window at `now`
    pub fn maybe_report(&mut self, now: Instant) -> Option<ThroughputReport> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval || elapsed.is_zero() {
            return None;
        }

        let secs = elapsed.as_secs_f64();
        let report = ThroughputReport {
            kbps: self.byte_total as f64 / secs / BYTES_PER_KB,
            fps: self.frame_total as f64 / secs,
            bytes: self.byte_total,
            frames: self.frame_total,
            elapsed,
        };

        info!("[{}]  {}", self.channel, report);

        self.byte_total = 0;
        self.frame_total = 0;
        self.window_start = now;

        Some(report)
    }
}
