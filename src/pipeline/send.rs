//! Capture-side pipeline: enhance, gate on voice activity, encode, send.
//!
//! Voice gating is the bandwidth lever: frames with no voice in them cost
//! zero network traffic. Two pieces of bookkeeping make the gating sound
//! right on the far end:
//!
//! - The look-back ring retains the frames just before an onset, so the
//!   start of speech is transmitted instead of clipped.
//! - Once a silent stretch outlasts the ring, the encoder state is stale;
//!   the next transmitted packet carries a reset flag so both sides start
//!   the codec fresh.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, bail};
use tracing::debug;

use crate::audio::buffers::LookbackRing;
use crate::audio::codec::AudioCodec;
use crate::audio::format::AudioFormat;
use crate::audio::processor::AudioProcessor;
use crate::audio::SpeakerId;
use crate::net::packet::VoicePacket;
use crate::net::transport::Transport;

struct SendState {
    lookback: LookbackRing,
    pending_reset: bool,
}

/// Turns captured frames into voice packets on a topic.
pub struct SendPipeline {
    format: Arc<AudioFormat>,
    processor: Arc<dyn AudioProcessor>,
    codec: Arc<dyn AudioCodec>,
    transport: Arc<dyn Transport>,
    topic: String,
    speaker: SpeakerId,
    muted: AtomicBool,
    state: Mutex<SendState>,
}

impl SendPipeline {
    pub fn new(
        format: Arc<AudioFormat>,
        processor: Arc<dyn AudioProcessor>,
        codec: Arc<dyn AudioCodec>,
        transport: Arc<dyn Transport>,
        topic: String,
        speaker: SpeakerId,
        lookback_frames: usize,
    ) -> Self {
        Self {
            format,
            processor,
            codec,
            transport,
            topic,
            speaker,
            muted: AtomicBool::new(false),
            state: Mutex::new(SendState {
                lookback: LookbackRing::new(lookback_frames),
                pending_reset: false,
            }),
        }
    }

    /// Stop or resume transmitting. While muted, captured frames are
    /// dropped and the next transmitted packet will carry a codec reset.
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Feed one captured frame through the pipeline. Called by the capture
    /// collaborator once per frame tick.
    pub fn capture_frame(&self, frame: &[i16]) -> Result<()> {
        if frame.len() != self.format.samples_per_frame {
            bail!(
                "Captured frame holds {} samples, expected {}",
                frame.len(),
                self.format.samples_per_frame
            );
        }

        if self.muted.load(Ordering::Relaxed) {
            let mut state = self.state.lock().unwrap();
            state.lookback.clear();
            state.pending_reset = true;
            return Ok(());
        }

        let (processed, is_voice) = self.processor.process(frame);

        let mut state = self.state.lock().unwrap();
        state.lookback.push(processed);

        if !is_voice {
            // The gap only matters once it outlasts the look-back window:
            // shorter pauses are still shipped whole when the gate reopens.
            if state.lookback.is_full() {
                if !state.pending_reset {
                    debug!("Transmission gap for speaker {}", self.speaker);
                }
                state.pending_reset = true;
            }
            return Ok(());
        }

        let frames: Vec<Vec<i16>> = state.lookback.drain().collect();
        for buffered in frames {
            let reset = state.pending_reset;
            let payload = self.codec.encode(&buffered, self.speaker, reset)?;
            let packet = VoicePacket {
                speaker: self.speaker,
                reset,
                payload,
            };
            self.transport.send(&self.topic, packet.encode())?;
            state.pending_reset = false;
        }
        Ok(())
    }
}
