//! Real-time multi-party voice streaming.
//!
//! `partyline` is the frame pipeline for a voice room: it enhances and
//! gates captured audio, compresses it with per-speaker stateful codecs,
//! frames it onto a topic-addressed transport, and on the receiving side
//! decodes, jitter-buffers, mixes and schedules playback for any number of
//! concurrent speakers - all with bounded memory and bounded latency.
//!
//! Device capture/playback, real DSP backends and real brokers live behind
//! the [`audio::AudioProcessor`], [`audio::AudioCodec`] and
//! [`net::Transport`] capabilities; the crate ships working in-process
//! implementations of each.
//!
//! Start with [`session::VoiceSession`]: one instance per participant,
//! built from a [`config::VoiceConfig`].

pub mod audio;
pub mod config;
pub mod net;
pub mod pipeline;
pub mod session;

pub use audio::{
    AudioCodec, AudioFormat, AudioProcessor, JitterBuffer, PlaybackScheduler, SpeakerId,
};
pub use config::VoiceConfig;
pub use net::{LocalTransport, Transport, VoicePacket};
pub use session::VoiceSession;

/// Initialize logging for binaries and examples embedding the pipeline.
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}
