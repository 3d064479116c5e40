use std::sync::Arc;

use anyhow::{Result, bail};

/// Describes the audio geometry shared by every component of a session:
/// sampling rate, frame duration and the values derived from them.
///
/// A format is constructed once per session and passed around as
/// [`Arc<AudioFormat>`]; all components must agree on the same instance so
/// that the integer truncation in the derived fields is consistent
/// everywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFormat {
    /// Samples per second.
    pub sampling_rate: u32,
    /// Milliseconds per frame.
    pub ms_per_frame: u32,
    /// Number of samples in one frame.
    pub samples_per_frame: usize,
    /// Frames per second.
    pub frames_per_second: u32,
    /// Channel count. Voice chat is effectively always mono.
    pub channels: u16,
}

impl AudioFormat {
    /// Create a format from a sampling rate and a frame duration in
    /// milliseconds.
    ///
    /// Returns an error if the geometry is unusable; a bad format is fatal
    /// at session construction, never mid-stream.
    pub fn new(sampling_rate: u32, ms_per_frame: u32, channels: u16) -> Result<Self> {
        if sampling_rate == 0 {
            bail!("Sampling rate must be non-zero");
        }
        if ms_per_frame == 0 || ms_per_frame > 1000 {
            bail!("Frame duration {} ms out of range (1-1000)", ms_per_frame);
        }
        if !(1..=2).contains(&channels) {
            bail!("Only 1 or 2 channels supported, got {}", channels);
        }

        let frames_per_second = 1000 / ms_per_frame;
        let samples_per_frame = (sampling_rate / frames_per_second) as usize * channels as usize;

        Ok(Self {
            sampling_rate,
            ms_per_frame,
            samples_per_frame,
            frames_per_second,
            channels,
        })
    }

    /// Same as [`AudioFormat::new`] but wrapped for sharing.
    pub fn shared(sampling_rate: u32, ms_per_frame: u32, channels: u16) -> Result<Arc<Self>> {
        Ok(Arc::new(Self::new(sampling_rate, ms_per_frame, channels)?))
    }

    /// Number of samples covering the given time span.
    pub fn samples_in_ms(&self, ms: u32) -> usize {
        (self.sampling_rate as u64 * ms as u64 / 1000) as usize * self.channels as usize
    }

    /// An all-zero frame of [`samples_per_frame`](Self::samples_per_frame)
    /// samples.
    pub fn silence(&self) -> Vec<i16> {
        vec![0i16; self.samples_per_frame]
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AudioFormat[rate:{}, ms/frame:{}, channels:{}]",
            self.sampling_rate, self.ms_per_frame, self.channels
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_fields() {
        let format = AudioFormat::new(16000, 20, 1).unwrap();
        assert_eq!(format.frames_per_second, 50);
        assert_eq!(format.samples_per_frame, 320);
        assert_eq!(
            format.samples_per_frame as u32 * format.frames_per_second,
            format.sampling_rate
        );
    }

    #[test]
    fn test_samples_in_ms() {
        let format = AudioFormat::new(16000, 20, 1).unwrap();
        assert_eq!(format.samples_in_ms(20), 320);
        assert_eq!(format.samples_in_ms(500), 8000);
    }

    #[test]
    fn test_stereo_doubles_frame_size() {
        let format = AudioFormat::new(48000, 20, 2).unwrap();
        assert_eq!(format.samples_per_frame, 1920);
    }

    #[test]
    fn test_rejects_bad_geometry() {
        assert!(AudioFormat::new(0, 20, 1).is_err());
        assert!(AudioFormat::new(16000, 0, 1).is_err());
        assert!(AudioFormat::new(16000, 20, 3).is_err());
        assert!(AudioFormat::new(16000, 2000, 1).is_err());
    }

    #[test]
    fn test_silence_length() {
        let format = AudioFormat::new(16000, 20, 1).unwrap();
        let frame = format.silence();
        assert_eq!(frame.len(), 320);
        assert!(frame.iter().all(|&s| s == 0));
    }
}
