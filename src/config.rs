//! Session configuration.
//!
//! The recognized options mirror the knobs a voice session actually has:
//! audio geometry, buffering allowance, codec selection, enhancement
//! toggles and their tuning, and whether a participant hears themselves.
//! Validation happens once, before a session is built; a bad configuration
//! is fatal to construction, never to a running session.

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::audio::processor::DspSettings;

/// Everything needed to build a [`VoiceSession`](crate::session::VoiceSession).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Samples per second.
    pub sample_rate: u32,
    /// Frame duration in milliseconds.
    pub ms_per_frame: u32,
    /// Channel count.
    pub channels: u16,
    /// Jitter-buffer allowance per speaker, in milliseconds.
    pub buffer_ms: u32,
    /// Compress with Opus; uncompressed PCM otherwise.
    pub compression: bool,
    /// Opus bitrate in bits per second.
    pub bitrate: i32,
    /// Play this session's own audio back to itself.
    pub play_self: bool,
    /// Frames retained before a speech onset.
    pub lookback_frames: usize,
    /// How many frames the playback schedule stays ahead of the clock.
    pub lookahead_frames: usize,
    /// Size of the circular output buffer, in frames.
    pub output_buffer_frames: usize,
    /// Enhancement stage toggles and tuning.
    pub processing: DspSettings,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            ms_per_frame: 20,
            channels: 1,
            buffer_ms: 500,
            compression: true,
            bitrate: 14000,
            play_self: false,
            lookback_frames: 10,
            lookahead_frames: 10,
            output_buffer_frames: 50,
            processing: DspSettings::default(),
        }
    }
}

impl VoiceConfig {
    /// Load from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse voice config")?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the pipeline depends on. Called by session
    /// construction; callers building components by hand should call it
    /// themselves.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_ms < self.ms_per_frame {
            bail!(
                "Buffer allowance {} ms is shorter than one {} ms frame",
                self.buffer_ms,
                self.ms_per_frame
            );
        }
        if self.lookback_frames == 0 {
            bail!("Look-back window must hold at least one frame");
        }
        if self.lookahead_frames == 0 {
            bail!("Playback look-ahead must be at least one frame");
        }
        if self.output_buffer_frames <= self.lookahead_frames + 1 {
            bail!(
                "Output buffer of {} frames cannot hold a {}-frame look-ahead",
                self.output_buffer_frames,
                self.lookahead_frames
            );
        }
        if self.compression && !(500..=512_000).contains(&self.bitrate) {
            bail!("Bitrate {} bit/s out of range", self.bitrate);
        }
        Ok(())
    }
}
