//! Audio data types, codecs, enhancement and buffering.
//!
//! This module contains the session-local half of the voice pipeline:
//!
//! # Data Types
//! - [`format::AudioFormat`] - Per-session audio geometry, shared by reference
//!
//! # Capabilities
//! - [`codec::AudioCodec`] - Per-speaker stateful compression with explicit resets
//! - [`processor::AudioProcessor`] - Enhancement (denoise/AGC/VAD/echo) with voice gating
//!
//! # Buffers
//! - [`buffers::JitterBuffer`] - Per-speaker bounded queues plus the stream mixer
//! - [`buffers::LookbackRing`] - Speech-onset retention for the send path
//!
//! # Playback
//! - [`playback::PlaybackScheduler`] - Circular output buffer driven by an external clock

pub mod buffers;
pub mod codec;
pub mod format;
pub mod playback;
pub mod processor;

pub use buffers::{JitterBuffer, LookbackRing};
pub use codec::{AudioCodec, OpusVoiceCodec, PcmCodec};
pub use format::AudioFormat;
pub use playback::{PlaybackScheduler, Tick, circular_distance};
pub use processor::{AudioProcessor, DspProcessor, DspSettings, PassthroughProcessor};

/// Identifies one speaker on the wire. A single byte, matching the packet
/// header.
pub type SpeakerId = u8;
