//! Frame Relay Module
//!
//! Latest-wins forwarding from an inbound endpoint to an outbound endpoint.

pub mod channel;
pub mod endpoint;
pub mod monitor;
pub mod slot;

pub use channel::{ForwardOutcome, RelayChannel};
pub use endpoint::{FrameSink, FrameSource, InboundEndpoint, OutboundEndpoint};
pub use monitor::{ThroughputMonitor, ThroughputReport};
pub use slot::ConflatedSlot;
