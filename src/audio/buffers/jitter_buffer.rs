//! Per-speaker jitter buffering and mixing.
//!
//! Each speaker gets a bounded FIFO of decoded frames, created lazily when
//! the first frame arrives. The network side pushes with
//! [`JitterBuffer::add_frame`] while the playback side drains one frame per
//! speaker per tick with [`JitterBuffer::next_frame`], which also mixes the
//! dequeued frames sample-wise. Speakers with nothing buffered contribute
//! silence for that tick, so packet loss degrades into quiet rather than a
//! stall.
//!
//! Synchronization is per speaker: every queue has its own lock, so one
//! speaker's traffic never serializes against another's. The map itself is
//! only written on first contact with a new speaker.

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::{collections::VecDeque, sync::Arc};

use anyhow::{Context, Result, bail};
use dashmap::DashMap;
use tracing::{info, warn};

use crate::audio::SpeakerId;
use crate::audio::format::AudioFormat;

/// Default buffering allowance when none is configured.
const DEFAULT_BUFFER_MS: u32 = 500;
/// Frame cap fallback for formats too coarse for the millisecond default.
const DEFAULT_MAX_FRAMES: usize = 10;

/// Bounded per-speaker frame queues with a sample-accurate mixer.
pub struct JitterBuffer {
    format: Arc<AudioFormat>,
    max_frames: AtomicUsize,
    queues: DashMap<SpeakerId, Mutex<VecDeque<Vec<i16>>>>,
}

impl JitterBuffer {
    pub fn new(format: Arc<AudioFormat>) -> Self {
        let max_frames = if format.ms_per_frame <= 100 {
            (DEFAULT_BUFFER_MS / format.ms_per_frame) as usize
        } else {
            DEFAULT_MAX_FRAMES
        };
        Self {
            format,
            max_frames: AtomicUsize::new(max_frames),
            queues: DashMap::new(),
        }
    }

    /// Derive the frame cap from a buffering duration.
    ///
    /// Rejects targets shorter than a single frame: that would leave the
    /// buffer unable to hold anything, which is a configuration error, not a
    /// runtime condition.
    pub fn set_buffer_size_ms(&self, target_ms: u32) -> Result<()> {
        if target_ms < self.format.ms_per_frame {
            bail!(
                "Buffer target {} ms is shorter than one {} ms frame",
                target_ms,
                self.format.ms_per_frame
            );
        }
        self.max_frames.store(
            (target_ms / self.format.ms_per_frame) as usize,
            Ordering::Relaxed,
        );
        Ok(())
    }

    /// The current per-speaker frame cap.
    pub fn max_frames(&self) -> usize {
        self.max_frames.load(Ordering::Relaxed)
    }

    /// Enqueue a decoded frame for a speaker. Never blocks; safe to call
    /// from the network-receive task while playback is mixing.
    ///
    /// When the speaker's queue has already reached the cap, the oldest
    /// frames are dropped in bulk down to half the cap before the new frame
    /// goes in. One audible jump instead of chronic lag.
    pub fn add_frame(&self, speaker: SpeakerId, frame: Vec<i16>) {
        let entry = self.queues.entry(speaker).or_insert_with(|| {
            info!("Created a new buffer for speaker {}", speaker);
            Mutex::new(VecDeque::new())
        });
        let mut queue = entry.lock().unwrap();

        let max = self.max_frames.load(Ordering::Relaxed);
        if queue.len() >= max {
            warn!(
                "Buffer for speaker {} is full ({} frames), skipping ahead",
                speaker,
                queue.len()
            );
            while queue.len() + 1 > max / 2 {
                queue.pop_front();
            }
        }
        queue.push_back(frame);
    }

    /// Dequeue one frame from every speaker and mix the non-excluded ones
    /// into a single frame.
    ///
    /// Excluded speakers still have a frame dequeued (and discarded) so
    /// their queues keep draining while muted; an excluded id that is not a
    /// known speaker is simply ignored. Empty queues contribute silence.
    ///
    /// Mixing is plain 16-bit addition without saturation: concurrent loud
    /// speakers can wrap instead of clipping.
    pub fn next_frame(&self, exclude: &[SpeakerId]) -> Vec<i16> {
        let mut mixed = self.format.silence();
        for entry in self.queues.iter() {
            let frame = {
                let mut queue = entry.value().lock().unwrap();
                match queue.pop_front() {
                    Some(frame) => frame,
                    None => continue,
                }
            };
            if exclude.contains(entry.key()) {
                continue;
            }
            for (acc, &sample) in mixed.iter_mut().zip(frame.iter()) {
                *acc = acc.wrapping_add(sample);
            }
        }
        mixed
    }

    /// Buffered frame count for one speaker. Zero for unknown speakers.
    pub fn frame_count(&self, speaker: SpeakerId) -> usize {
        self.queues
            .get(&speaker)
            .map(|queue| queue.lock().unwrap().len())
            .unwrap_or(0)
    }

    /// The longest queue across all speakers.
    pub fn frame_count_max(&self) -> usize {
        self.queues
            .iter()
            .map(|entry| entry.value().lock().unwrap().len())
            .max()
            .unwrap_or(0)
    }

    /// Speaker ids currently tracked by the buffer.
    pub fn speakers(&self) -> Vec<SpeakerId> {
        self.queues.iter().map(|entry| *entry.key()).collect()
    }

    /// Drain every queue into one WAV file per speaker, for listening to
    /// what the buffer held. Useful when debugging echo cancellation.
    pub fn save_buffers(&self, folder: &Path) -> Result<()> {
        let spec = hound::WavSpec {
            channels: self.format.channels,
            sample_rate: self.format.sampling_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        for entry in self.queues.iter() {
            let path = folder.join(format!("speaker-{}.wav", entry.key()));
            let mut writer = hound::WavWriter::create(&path, spec)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut queue = entry.value().lock().unwrap();
            while let Some(frame) = queue.pop_front() {
                for sample in frame {
                    writer.write_sample(sample)?;
                }
            }
            writer.finalize()?;
        }
        Ok(())
    }
}
