//! Session wiring: one object owning a complete pipeline set.
//!
//! A [`VoiceSession`] builds every component from a validated
//! [`VoiceConfig`], joins one room topic on the given transport, and owns
//! its codec/processor pair outright - nothing in this crate is a
//! process-wide singleton, so two sessions in one process never share
//! codec state.
//!
//! Three execution contexts meet here: the capture collaborator calls
//! [`VoiceSession::capture_frame`], the receive task runs on its own tokio
//! task, and the playback collaborator drives the scheduler against its
//! clock. The jitter buffer is the only structure shared between them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::info;

use crate::audio::SpeakerId;
use crate::audio::buffers::JitterBuffer;
use crate::audio::codec::{AudioCodec, OpusVoiceCodec, PcmCodec};
use crate::audio::format::AudioFormat;
use crate::audio::playback::PlaybackScheduler;
use crate::audio::processor::{AudioProcessor, DspProcessor, PassthroughProcessor};
use crate::config::VoiceConfig;
use crate::net::transport::Transport;
use crate::pipeline::receive::ReceivePipeline;
use crate::pipeline::send::SendPipeline;

/// One participant's end of a voice room.
pub struct VoiceSession {
    format: Arc<AudioFormat>,
    codec: Arc<dyn AudioCodec>,
    jitter: Arc<JitterBuffer>,
    playback: Arc<PlaybackScheduler>,
    send: SendPipeline,
    receive_task: Option<JoinHandle<()>>,
    receive_shutdown: Arc<Notify>,
    playback_stop: Arc<AtomicBool>,
    speaker: SpeakerId,
    topic: String,
}

impl VoiceSession {
    /// Build the pipeline set and start consuming the room topic. Must be
    /// called from within a tokio runtime.
    pub fn start(
        config: &VoiceConfig,
        transport: Arc<dyn Transport>,
        room: u32,
        speaker: SpeakerId,
    ) -> Result<Self> {
        config.validate()?;

        let format = AudioFormat::shared(config.sample_rate, config.ms_per_frame, config.channels)?;

        let codec: Arc<dyn AudioCodec> = if config.compression {
            Arc::new(OpusVoiceCodec::new(format.clone(), config.bitrate)?)
        } else {
            Arc::new(PcmCodec::new(format.clone()))
        };

        let processor: Arc<dyn AudioProcessor> = if config.processing.enabled() {
            Arc::new(DspProcessor::new(config.processing.clone()))
        } else {
            Arc::new(PassthroughProcessor)
        };

        let jitter = Arc::new(JitterBuffer::new(format.clone()));
        jitter.set_buffer_size_ms(config.buffer_ms)?;

        let playback = Arc::new(PlaybackScheduler::new(
            format.clone(),
            jitter.clone(),
            processor.clone(),
            config.lookahead_frames,
            config.output_buffer_frames,
        ));
        if !config.play_self {
            playback.mute(speaker);
        }

        let topic = format!("room-audio-{}", room);
        let receive_shutdown = Arc::new(Notify::new());
        let receive_task = ReceivePipeline::start(
            jitter.clone(),
            codec.clone(),
            transport.subscribe(&topic),
            receive_shutdown.clone(),
        );

        let send = SendPipeline::new(
            format.clone(),
            processor,
            codec.clone(),
            transport,
            topic.clone(),
            speaker,
            config.lookback_frames,
        );

        info!("Session for speaker {} joined {}", speaker, topic);

        Ok(Self {
            format,
            codec,
            jitter,
            playback,
            send,
            receive_task: Some(receive_task),
            receive_shutdown,
            playback_stop: Arc::new(AtomicBool::new(false)),
            speaker,
            topic,
        })
    }

    pub fn format(&self) -> &Arc<AudioFormat> {
        &self.format
    }

    pub fn jitter(&self) -> &Arc<JitterBuffer> {
        &self.jitter
    }

    pub fn playback(&self) -> &Arc<PlaybackScheduler> {
        &self.playback
    }

    pub fn speaker(&self) -> SpeakerId {
        self.speaker
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Feed one captured frame into the send path.
    pub fn capture_frame(&self, frame: &[i16]) -> Result<()> {
        self.send.capture_frame(frame)
    }

    /// Stop or resume transmitting this session's own voice.
    pub fn set_muted(&self, muted: bool) {
        self.send.set_muted(muted);
    }

    /// Silence a remote speaker locally.
    pub fn mute_speaker(&self, speaker: SpeakerId) {
        self.playback.mute(speaker);
    }

    /// Hear a remote speaker again.
    pub fn unmute_speaker(&self, speaker: SpeakerId) {
        self.playback.unmute(speaker);
    }

    /// Spawn a driver task that keeps the playback schedule filled against
    /// the collaborator's clock. Stopped by [`VoiceSession::shutdown`].
    pub fn start_playback_driver<F>(&self, clock: F) -> JoinHandle<()>
    where
        F: Fn() -> usize + Send + Sync + 'static,
    {
        let playback = self.playback.clone();
        let stop = self.playback_stop.clone();
        tokio::spawn(async move {
            playback.drive(clock, &stop).await;
        })
    }

    /// Tear the session down: stop accepting capture and receive work, let
    /// in-flight frames finish, then release codec state.
    pub async fn shutdown(mut self) {
        info!("Shutting down session for speaker {}", self.speaker);
        self.send.set_muted(true);
        self.playback_stop.store(true, Ordering::Relaxed);
        self.receive_shutdown.notify_one();
        if let Some(task) = self.receive_task.take() {
            let _ = task.await;
        }
        self.codec.reset_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::transport::LocalTransport;
    use std::time::Duration;

    fn test_config() -> VoiceConfig {
        let mut config = VoiceConfig::default();
        // PCM keeps sample values exact so the mix can be asserted on.
        config.compression = false;
        config.processing.denoise = false;
        config.processing.agc = false;
        config.processing.vad = false;
        config.processing.aec = false;
        config
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_two_sessions_hear_each_other() {
        let transport = Arc::new(LocalTransport::new());
        let config = test_config();
        let alice = VoiceSession::start(&config, transport.clone(), 1, 1).unwrap();
        let bob = VoiceSession::start(&config, transport.clone(), 1, 2).unwrap();

        alice.capture_frame(&vec![100i16; 320]).unwrap();
        wait_until(|| bob.jitter().frame_count(1) == 1).await;

        // Bob mixes Alice's frame; Alice's own copy is muted for herself
        // but still buffered.
        assert_eq!(bob.playback().tick(0), crate::audio::playback::Tick::Wrote);
        let mut out = vec![0i16; 320];
        bob.playback().read(0, &mut out);
        assert!(out.iter().all(|&s| s == 100));

        wait_until(|| alice.jitter().frame_count(1) == 1).await;
        alice.playback().tick(0);
        alice.playback().read(0, &mut out);
        assert!(out.iter().all(|&s| s == 0));

        alice.shutdown().await;
        bob.shutdown().await;
    }

    #[tokio::test]
    async fn test_sessions_in_different_rooms_are_isolated() {
        let transport = Arc::new(LocalTransport::new());
        let config = test_config();
        let alice = VoiceSession::start(&config, transport.clone(), 1, 1).unwrap();
        let bob = VoiceSession::start(&config, transport.clone(), 2, 2).unwrap();

        alice.capture_frame(&vec![100i16; 320]).unwrap();
        wait_until(|| alice.jitter().frame_count(1) == 1).await;

        assert_eq!(bob.jitter().frame_count(1), 0);

        alice.shutdown().await;
        bob.shutdown().await;
    }

    #[tokio::test]
    async fn test_play_self_keeps_own_voice_audible() {
        let transport = Arc::new(LocalTransport::new());
        let mut config = test_config();
        config.play_self = true;
        let session = VoiceSession::start(&config, transport, 1, 1).unwrap();

        session.capture_frame(&vec![42i16; 320]).unwrap();
        wait_until(|| session.jitter().frame_count(1) == 1).await;

        session.playback().tick(0);
        let mut out = vec![0i16; 320];
        session.playback().read(0, &mut out);
        assert!(out.iter().all(|&s| s == 42));

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_remote_mute_and_unmute() {
        let transport = Arc::new(LocalTransport::new());
        let config = test_config();
        let alice = VoiceSession::start(&config, transport.clone(), 1, 1).unwrap();
        let bob = VoiceSession::start(&config, transport.clone(), 1, 2).unwrap();

        bob.mute_speaker(1);
        alice.capture_frame(&vec![100i16; 320]).unwrap();
        wait_until(|| bob.jitter().frame_count(1) == 1).await;

        bob.playback().tick(0);
        let mut out = vec![0i16; 320];
        bob.playback().read(0, &mut out);
        assert!(out.iter().all(|&s| s == 0));

        bob.unmute_speaker(1);
        alice.capture_frame(&vec![7i16; 320]).unwrap();
        wait_until(|| bob.jitter().frame_count(1) == 1).await;
        bob.playback().tick(320);
        bob.playback().read(320, &mut out);
        assert!(out.iter().all(|&s| s == 7));

        alice.shutdown().await;
        bob.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let transport = Arc::new(LocalTransport::new());
        let config = VoiceConfig {
            buffer_ms: 1,
            ..VoiceConfig::default()
        };
        assert!(VoiceSession::start(&config, transport, 1, 1).is_err());
    }

    #[tokio::test]
    async fn test_shutdown_joins_receive_task() {
        let transport = Arc::new(LocalTransport::new());
        let session = VoiceSession::start(&test_config(), transport, 1, 1).unwrap();
        // Returning at all proves the task exited; nothing to assert.
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_opus_sessions_roundtrip() {
        let transport = Arc::new(LocalTransport::new());
        let mut config = test_config();
        config.compression = true;
        let alice = VoiceSession::start(&config, transport.clone(), 1, 1).unwrap();
        let bob = VoiceSession::start(&config, transport.clone(), 1, 2).unwrap();

        for _ in 0..5 {
            alice.capture_frame(&vec![1000i16; 320]).unwrap();
        }
        wait_until(|| bob.jitter().frame_count(1) == 5).await;

        assert_eq!(bob.playback().tick(0), crate::audio::playback::Tick::Wrote);

        alice.shutdown().await;
        bob.shutdown().await;
    }
}
