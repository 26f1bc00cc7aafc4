//! flycam-relay
//!
//! Latest-wins frame relay for live video and telemetry. Each relay channel
//! accepts frames from producers on an inbound endpoint and publishes them to
//! every connected subscriber on an outbound endpoint. Both sides keep at most
//! one pending frame, so a slow consumer sees fresher frames instead of a
//! growing backlog.

pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod relay;
pub mod supervisor;

pub use config::Config;
pub use error::{RelayError, RelayResult};
pub use supervisor::Supervisor;

/// Common error type for startup and configuration paths
pub type Result<T> = anyhow::Result<T>;
