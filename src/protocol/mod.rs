//! Wire Protocol Module
//!
//! Frames travel over plain TCP as a 4-byte big-endian length followed by the
//! opaque payload.

pub mod constants;
pub mod frame;

pub use frame::{read_frame, write_frame};
