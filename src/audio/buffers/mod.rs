//! Frame buffering for the receive and send paths.
//!
//! - [`JitterBuffer`] - Per-speaker bounded queues plus the stream mixer
//! - [`LookbackRing`] - Recently processed frames retained for speech onsets

pub mod jitter_buffer;
pub mod lookback;

pub use jitter_buffer::JitterBuffer;
pub use lookback::LookbackRing;
