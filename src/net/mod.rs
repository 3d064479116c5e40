//! The wire boundary: packet layout and the transport capability.
//!
//! - [`packet::VoicePacket`] - `[speaker][reset][payload]` framing
//! - [`transport::Transport`] - Topic-addressed pub/sub the pipelines run on
//! - [`transport::LocalTransport`] - In-process bus for tests and loopback

pub mod packet;
pub mod transport;

pub use packet::VoicePacket;
pub use transport::{LocalTransport, Transport};
