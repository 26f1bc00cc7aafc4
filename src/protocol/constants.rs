//! Relay Protocol Constants

// Frame header
pub const LENGTH_PREFIX_SIZE: usize = 4;

// Payload buffer growth step while a frame is arriving
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

// Frame size limits
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
pub const MAX_FRAME_SIZE_LIMIT: usize = 256 * 1024 * 1024;

// Default channel names
pub const VIDEO_CHANNEL: &str = "video";
pub const METADATA_CHANNEL: &str = "metadata";

// Default ports, bound on all interfaces
pub const VIDEO_INBOUND_PORT: u16 = 5555;
pub const VIDEO_OUTBOUND_PORT: u16 = 5556;
pub const METADATA_INBOUND_PORT: u16 = 5557;
pub const METADATA_OUTBOUND_PORT: u16 = 5558;

// Throughput reporting window
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 1;

// Bytes per kilobyte in rate lines
pub const BYTES_PER_KB: f64 = 1024.0;
