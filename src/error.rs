//! Relay error types
//!
//! Steady-state failures surfaced by endpoints and the frame codec. These are
//! transient: the relay loop logs them and keeps going. Startup failures are
//! reported through `anyhow` instead.

/// Errors raised while moving frames through an endpoint
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("frame of {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    #[error("connection closed in the middle of a frame")]
    TruncatedFrame,

    #[error("{0} endpoint closed")]
    EndpointClosed(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for endpoint and codec operations
pub type RelayResult<T> = std::result::Result<T, RelayError>;
