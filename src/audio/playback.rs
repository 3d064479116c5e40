//! Playback scheduling against a free-running output clock.
//!
//! The playback collaborator owns a read cursor that advances at the native
//! play rate through a circular sample buffer. [`PlaybackScheduler`] keeps
//! that buffer filled a bounded look-ahead in front of the cursor: enough to
//! hide arrival jitter, never so much that latency grows without bound.
//!
//! The scheduler does not block anywhere. [`PlaybackScheduler::tick`] either
//! writes one mixed frame or reports [`Tick::Saturated`], meaning "call me
//! again once the clock has advanced". [`PlaybackScheduler::drive`] wraps
//! that contract in a cooperative yield loop for callers running under
//! tokio.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::DashSet;
use tracing::info;

use crate::audio::SpeakerId;
use crate::audio::buffers::JitterBuffer;
use crate::audio::format::AudioFormat;
use crate::audio::processor::AudioProcessor;

/// Wrap-aware distance from `from` forward to `to` on a circle of
/// `circumference` positions.
///
/// Precondition: `to` is ahead of or equal to `from` in clock order. The
/// result is meaningless if the caller violates that; it is not defended
/// against.
pub fn circular_distance(from: usize, to: usize, circumference: usize) -> usize {
    if to >= from {
        to - from
    } else {
        circumference - (from - to)
    }
}

/// Outcome of one scheduling tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// One mixed frame was written at the write cursor.
    Wrote,
    /// The buffer is already far enough ahead of the read cursor.
    Saturated,
}

/// Keeps a circular output buffer filled just ahead of the playback clock.
pub struct PlaybackScheduler {
    format: Arc<AudioFormat>,
    jitter: Arc<JitterBuffer>,
    processor: Arc<dyn AudioProcessor>,
    buffer: Mutex<Vec<i16>>,
    write_cursor: AtomicUsize,
    lookahead_samples: usize,
    muted: DashSet<SpeakerId>,
}

impl PlaybackScheduler {
    /// `lookahead_frames` is how many frames to stay ahead of the read
    /// cursor; `output_buffer_frames` sizes the circular buffer and must
    /// leave room beyond the look-ahead.
    pub fn new(
        format: Arc<AudioFormat>,
        jitter: Arc<JitterBuffer>,
        processor: Arc<dyn AudioProcessor>,
        lookahead_frames: usize,
        output_buffer_frames: usize,
    ) -> Self {
        let buffer = vec![0i16; format.samples_per_frame * output_buffer_frames];
        let lookahead_samples = format.samples_per_frame * lookahead_frames;
        Self {
            format,
            jitter,
            processor,
            buffer: Mutex::new(buffer),
            write_cursor: AtomicUsize::new(0),
            lookahead_samples,
            muted: DashSet::new(),
        }
    }

    /// Stop including this speaker in the mix.
    pub fn mute(&self, speaker: SpeakerId) {
        self.muted.insert(speaker);
    }

    /// Include this speaker in the mix again.
    pub fn unmute(&self, speaker: SpeakerId) {
        self.muted.remove(&speaker);
    }

    /// Advance the schedule by at most one frame.
    ///
    /// `read_cursor` is the playback collaborator's current position in the
    /// circular buffer. While the write cursor is more than the configured
    /// look-ahead in front of it, nothing is written and the caller should
    /// try again after the clock has moved. Otherwise one mixed frame is
    /// pulled from the jitter buffer, registered with the processor as the
    /// echo reference, and written at the write cursor.
    pub fn tick(&self, read_cursor: usize) -> Tick {
        let write_cursor = self.write_cursor.load(Ordering::Acquire);
        let buffer_len = self.format.samples_per_frame * self.output_frames();
        if circular_distance(read_cursor, write_cursor, buffer_len) > self.lookahead_samples {
            return Tick::Saturated;
        }

        let exclude: Vec<SpeakerId> = self.muted.iter().map(|id| *id).collect();
        let frame = self.jitter.next_frame(&exclude);
        self.processor.register_played_frame(&frame);

        let mut buffer = self.buffer.lock().unwrap();
        // The buffer length is a multiple of the frame size and the write
        // cursor only moves in whole frames, so a frame never wraps.
        buffer[write_cursor..write_cursor + frame.len()].copy_from_slice(&frame);
        let next = (write_cursor + frame.len()) % buffer.len();
        self.write_cursor.store(next, Ordering::Release);
        Tick::Wrote
    }

    /// Run the tick loop until `shutdown` is set, yielding to the runtime
    /// whenever the buffer is saturated. The yield (not a sleep) keeps
    /// teardown prompt.
    pub async fn drive<F>(&self, clock: F, shutdown: &AtomicBool)
    where
        F: Fn() -> usize,
    {
        info!("Playback scheduler started");
        while !shutdown.load(Ordering::Relaxed) {
            match self.tick(clock()) {
                Tick::Wrote => {}
                Tick::Saturated => tokio::task::yield_now().await,
            }
        }
        info!("Playback scheduler stopped");
    }

    /// Copy samples out of the circular buffer, wrapping as needed. This is
    /// what the playback collaborator calls from its output callback.
    pub fn read(&self, cursor: usize, out: &mut [i16]) {
        let buffer = self.buffer.lock().unwrap();
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = buffer[(cursor + i) % buffer.len()];
        }
    }

    /// The most recently scheduled frame. Callers wiring explicit-echo
    /// enhancement use this as the reference instead of registered frames.
    pub fn last_frame(&self) -> Vec<i16> {
        let buffer = self.buffer.lock().unwrap();
        let spf = self.format.samples_per_frame;
        let write_cursor = self.write_cursor.load(Ordering::Acquire);
        let start = (write_cursor + buffer.len() - spf) % buffer.len();
        buffer[start..start + spf].to_vec()
    }

    /// Current write cursor position, in samples.
    pub fn write_cursor(&self) -> usize {
        self.write_cursor.load(Ordering::Acquire)
    }

    fn output_frames(&self) -> usize {
        self.buffer.lock().unwrap().len() / self.format.samples_per_frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::processor::PassthroughProcessor;

    fn scheduler() -> (Arc<JitterBuffer>, PlaybackScheduler) {
        let format = AudioFormat::shared(16000, 20, 1).unwrap();
        let jitter = Arc::new(JitterBuffer::new(format.clone()));
        let scheduler = PlaybackScheduler::new(
            format,
            jitter.clone(),
            Arc::new(PassthroughProcessor),
            3,
            50,
        );
        (jitter, scheduler)
    }

    #[test]
    fn test_circular_distance_identities() {
        for n in [1usize, 7, 16000] {
            for a in [0usize, 1, n - 1] {
                assert_eq!(circular_distance(a, a, n), 0);
            }
        }
        assert_eq!(circular_distance(0, 9, 10), 9);
        assert_eq!(circular_distance(9, 0, 10), 1);
        assert_eq!(circular_distance(15999, 0, 16000), 1);
    }

    #[test]
    fn test_tick_fills_up_to_lookahead_then_saturates() {
        let (_, scheduler) = scheduler();

        // 3 frames of look-ahead: the distance check admits writes until the
        // write cursor is strictly more than 960 samples ahead.
        assert_eq!(scheduler.tick(0), Tick::Wrote);
        assert_eq!(scheduler.tick(0), Tick::Wrote);
        assert_eq!(scheduler.tick(0), Tick::Wrote);
        assert_eq!(scheduler.tick(0), Tick::Wrote);
        assert_eq!(scheduler.tick(0), Tick::Saturated);
        assert_eq!(scheduler.write_cursor(), 4 * 320);

        // Once the clock advances a frame, one more write fits.
        assert_eq!(scheduler.tick(320), Tick::Wrote);
        assert_eq!(scheduler.tick(320), Tick::Saturated);
    }

    #[test]
    fn test_tick_writes_mixed_audio() {
        let (jitter, scheduler) = scheduler();
        jitter.add_frame(1, vec![100; 320]);
        jitter.add_frame(2, vec![23; 320]);

        scheduler.tick(0);

        let mut out = vec![0i16; 320];
        scheduler.read(0, &mut out);
        assert!(out.iter().all(|&s| s == 123));
    }

    #[test]
    fn test_muted_speaker_is_excluded() {
        let (jitter, scheduler) = scheduler();
        jitter.add_frame(1, vec![100; 320]);
        jitter.add_frame(2, vec![23; 320]);
        scheduler.mute(1);

        scheduler.tick(0);
        let mut out = vec![0i16; 320];
        scheduler.read(0, &mut out);
        assert!(out.iter().all(|&s| s == 23));

        scheduler.unmute(1);
        jitter.add_frame(1, vec![7; 320]);
        scheduler.tick(0);
        scheduler.read(320, &mut out);
        assert!(out.iter().all(|&s| s == 7));
    }

    #[test]
    fn test_last_frame_returns_latest_write() {
        let (jitter, scheduler) = scheduler();
        jitter.add_frame(1, vec![55; 320]);
        scheduler.tick(0);
        assert!(scheduler.last_frame().iter().all(|&s| s == 55));
    }

    #[test]
    fn test_write_cursor_wraps() {
        let (_, scheduler) = scheduler();
        let mut read_cursor = 0;
        // 50-frame buffer, walk well past one revolution.
        for _ in 0..120 {
            assert_eq!(scheduler.tick(read_cursor), Tick::Wrote);
            read_cursor = (read_cursor + 320) % (320 * 50);
        }
        assert!(scheduler.write_cursor() < 320 * 50);
    }

    #[tokio::test]
    async fn test_drive_stops_on_shutdown() {
        let (_, scheduler) = scheduler();
        let shutdown = AtomicBool::new(true);
        // Flag already set: returns without a single tick.
        scheduler.drive(|| 0, &shutdown).await;
        assert_eq!(scheduler.write_cursor(), 0);
    }
}
