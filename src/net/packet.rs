//! Voice packet framing.
//!
//! Every transmitted frame is wrapped as `[speaker id: 1 byte]
//! [reset flag: 1 byte][codec payload]`. The reset flag tells the receiver
//! that the sender's encoder state was fresh for this packet, so the
//! matching decoder must be reset before the payload is decoded.

use anyhow::{Result, bail};

use crate::audio::SpeakerId;

/// One framed voice payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoicePacket {
    pub speaker: SpeakerId,
    pub reset: bool,
    pub payload: Vec<u8>,
}

impl VoicePacket {
    /// Serialize to the wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(2 + self.payload.len());
        bytes.push(self.speaker);
        bytes.push(self.reset as u8);
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Parse a received message. Anything shorter than the two header bytes
    /// is malformed.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 {
            bail!("Voice packet too short: {} bytes", bytes.len());
        }
        Ok(Self {
            speaker: bytes[0],
            reset: bytes[1] != 0,
            payload: bytes[2..].to_vec(),
        })
    }
}
