//! Audio codec capability with per-speaker state.
//!
//! Compressed voice codecs carry inter-frame prediction state, so every
//! speaker needs an encoder/decoder pair of its own; sharing one across
//! speakers corrupts both streams. State is created lazily on first use and
//! reset explicitly when a stream gap occurs (see the reset flag in
//! [`crate::net::packet::VoicePacket`]).

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use opus::{Application, Bitrate, Channels, Decoder, Encoder};
use tracing::{debug, warn};

use super::SpeakerId;
use super::format::AudioFormat;

const MAX_OPUS_PACKET_SIZE: usize = 4000;

const VALID_OPUS_RATES: [u32; 5] = [8000, 12000, 16000, 24000, 48000];
const VALID_OPUS_FRAME_MS: [u32; 5] = [5, 10, 20, 40, 60];

/// Per-speaker stateful encode/decode with explicit reset.
///
/// `reset_first` on [`encode`](AudioCodec::encode) resets the speaker's
/// encoder state before the frame is encoded; the matching packet must carry
/// the reset flag so the receiver resets its decoder before decoding.
pub trait AudioCodec: Send + Sync {
    /// Compress one frame for the given speaker.
    fn encode(&self, frame: &[i16], speaker: SpeakerId, reset_first: bool) -> Result<Vec<u8>>;

    /// Decompress one frame from the given speaker.
    fn decode(&self, payload: &[u8], speaker: SpeakerId) -> Result<Vec<i16>>;

    /// Reset the encoder state for one speaker.
    fn reset_encoder(&self, speaker: SpeakerId);

    /// Reset the decoder state for one speaker.
    fn reset_decoder(&self, speaker: SpeakerId);

    /// Reset every encoder and decoder. Used at session teardown.
    fn reset_all(&self);
}

fn channels_to_opus(channels: u16) -> Result<Channels> {
    match channels {
        1 => Ok(Channels::Mono),
        2 => Ok(Channels::Stereo),
        _ => bail!("Opus only supports 1 or 2 channels, got {}", channels),
    }
}

/// Opus-backed codec. One encoder and one decoder per speaker, created on
/// first use.
pub struct OpusVoiceCodec {
    format: Arc<AudioFormat>,
    bitrate: i32,
    encoders: DashMap<SpeakerId, Mutex<Encoder>>,
    decoders: DashMap<SpeakerId, Mutex<Decoder>>,
}

impl OpusVoiceCodec {
    pub fn new(format: Arc<AudioFormat>, bitrate: i32) -> Result<Self> {
        if !VALID_OPUS_RATES.contains(&format.sampling_rate) {
            bail!(
                "Sampling rate {} not supported by Opus (valid: {:?})",
                format.sampling_rate,
                VALID_OPUS_RATES
            );
        }
        if !VALID_OPUS_FRAME_MS.contains(&format.ms_per_frame) {
            bail!(
                "Frame duration {} ms not supported by Opus (valid: {:?})",
                format.ms_per_frame,
                VALID_OPUS_FRAME_MS
            );
        }

        debug!("Created Opus codec for {} at {} bit/s", format, bitrate);

        Ok(Self {
            format,
            bitrate,
            encoders: DashMap::new(),
            decoders: DashMap::new(),
        })
    }

    fn new_encoder(&self) -> Result<Encoder> {
        let channels = channels_to_opus(self.format.channels)?;
        let mut encoder = Encoder::new(self.format.sampling_rate, channels, Application::Voip)
            .context("Failed to create Opus encoder")?;
        encoder
            .set_bitrate(Bitrate::Bits(self.bitrate))
            .context("Failed to set bitrate")?;
        Ok(encoder)
    }

    fn new_decoder(&self) -> Result<Decoder> {
        let channels = channels_to_opus(self.format.channels)?;
        Decoder::new(self.format.sampling_rate, channels).context("Failed to create Opus decoder")
    }
}

impl AudioCodec for OpusVoiceCodec {
    fn encode(&self, frame: &[i16], speaker: SpeakerId, reset_first: bool) -> Result<Vec<u8>> {
        let entry = match self.encoders.entry(speaker) {
            Entry::Occupied(occupied) => occupied.into_ref(),
            Entry::Vacant(vacant) => {
                debug!("Creating encoder for speaker {}", speaker);
                vacant.insert(Mutex::new(self.new_encoder()?))
            }
        };
        let mut encoder = entry.lock().unwrap();

        if reset_first {
            encoder
                .reset_state()
                .context("Failed to reset encoder state")?;
        }

        let mut output = vec![0u8; MAX_OPUS_PACKET_SIZE];
        let len = encoder
            .encode(frame, &mut output)
            .context("Opus encoding failed")?;
        output.truncate(len);
        Ok(output)
    }

    fn decode(&self, payload: &[u8], speaker: SpeakerId) -> Result<Vec<i16>> {
        let entry = match self.decoders.entry(speaker) {
            Entry::Occupied(occupied) => occupied.into_ref(),
            Entry::Vacant(vacant) => {
                debug!("Creating decoder for speaker {}", speaker);
                vacant.insert(Mutex::new(self.new_decoder()?))
            }
        };
        let mut decoder = entry.lock().unwrap();

        let mut frame = vec![0i16; self.format.samples_per_frame];
        let samples_per_channel = decoder
            .decode(payload, &mut frame, false)
            .context("Opus decoding failed")?;
        frame.truncate(samples_per_channel * self.format.channels as usize);
        Ok(frame)
    }

    fn reset_encoder(&self, speaker: SpeakerId) {
        if let Some(entry) = self.encoders.get(&speaker)
            && let Err(e) = entry.lock().unwrap().reset_state()
        {
            warn!("Failed to reset encoder for speaker {}: {}", speaker, e);
        }
    }

    fn reset_decoder(&self, speaker: SpeakerId) {
        if let Some(entry) = self.decoders.get(&speaker)
            && let Err(e) = entry.lock().unwrap().reset_state()
        {
            warn!("Failed to reset decoder for speaker {}: {}", speaker, e);
        }
    }

    fn reset_all(&self) {
        for entry in self.encoders.iter() {
            if let Err(e) = entry.lock().unwrap().reset_state() {
                warn!("Failed to reset encoder for speaker {}: {}", entry.key(), e);
            }
        }
        for entry in self.decoders.iter() {
            if let Err(e) = entry.lock().unwrap().reset_state() {
                warn!("Failed to reset decoder for speaker {}: {}", entry.key(), e);
            }
        }
    }
}

/// Uncompressed little-endian PCM. Stateless, so every reset is a no-op.
pub struct PcmCodec {
    format: Arc<AudioFormat>,
}

impl PcmCodec {
    pub fn new(format: Arc<AudioFormat>) -> Self {
        Self { format }
    }
}

impl AudioCodec for PcmCodec {
    fn encode(&self, frame: &[i16], _speaker: SpeakerId, _reset_first: bool) -> Result<Vec<u8>> {
        let mut payload = Vec::with_capacity(frame.len() * 2);
        for sample in frame {
            payload.extend_from_slice(&sample.to_le_bytes());
        }
        Ok(payload)
    }

    fn decode(&self, payload: &[u8], _speaker: SpeakerId) -> Result<Vec<i16>> {
        if payload.len() % 2 != 0 {
            bail!("PCM payload length {} is not sample-aligned", payload.len());
        }
        let frame: Vec<i16> = payload
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        if frame.len() != self.format.samples_per_frame {
            bail!(
                "PCM payload holds {} samples, expected {}",
                frame.len(),
                self.format.samples_per_frame
            );
        }
        Ok(frame)
    }

    fn reset_encoder(&self, _speaker: SpeakerId) {}

    fn reset_decoder(&self, _speaker: SpeakerId) {}

    fn reset_all(&self) {}
}
