//! The two directed halves of the voice pipeline.
//!
//! - [`send::SendPipeline`] - capture frame → enhance → voice gate → encode → transport
//! - [`receive::ReceivePipeline`] - transport → demux → decode → jitter buffer
//!
//! Each half runs in its own execution context and never blocks the other;
//! the jitter buffer is the only structure they share with playback.

pub mod receive;
pub mod send;

pub use receive::ReceivePipeline;
pub use send::SendPipeline;
