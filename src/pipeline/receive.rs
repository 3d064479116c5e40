//! Receive-side pipeline: consume a topic, demultiplex by speaker, decode,
//! buffer.
//!
//! Runs as a dedicated tokio task per session so that slow decoding can
//! never stall the send path or the playback path. Malformed or
//! undecodable messages are logged and dropped; a lost packet is a jitter
//! problem, not an error.

use std::sync::Arc;

use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::audio::buffers::JitterBuffer;
use crate::audio::codec::AudioCodec;
use crate::net::packet::VoicePacket;

/// Consumes a transport subscription into the jitter buffer.
pub struct ReceivePipeline;

impl ReceivePipeline {
    /// Spawn the consumer task. It runs until `shutdown` is notified or the
    /// subscription closes, finishing whatever message it is on before
    /// exiting.
    pub fn start(
        jitter: Arc<JitterBuffer>,
        codec: Arc<dyn AudioCodec>,
        mut messages: mpsc::UnboundedReceiver<Vec<u8>>,
        shutdown: Arc<Notify>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Receive pipeline started");
            loop {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    message = messages.recv() => {
                        match message {
                            Some(bytes) => Self::handle_message(&bytes, &jitter, &codec),
                            None => break,
                        }
                    }
                }
            }
            info!("Receive pipeline stopped");
        })
    }

    fn handle_message(bytes: &[u8], jitter: &JitterBuffer, codec: &Arc<dyn AudioCodec>) {
        let packet = match VoicePacket::parse(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping malformed voice message: {}", e);
                return;
            }
        };

        if packet.reset {
            codec.reset_decoder(packet.speaker);
        }

        match codec.decode(&packet.payload, packet.speaker) {
            Ok(frame) => jitter.add_frame(packet.speaker, frame),
            Err(e) => warn!(
                "Dropping undecodable frame from speaker {}: {}",
                packet.speaker, e
            ),
        }
    }
}
