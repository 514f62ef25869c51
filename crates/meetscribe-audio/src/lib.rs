//! Audio decode crate for MeetScribe
//!
//! Loads a recorded meeting from disk into the 16 kHz mono sample stream
//! the diarization core operates on. WAV files are read with hound;
//! mp3/m4a/ogg/flac go through symphonia; everything is downmixed to mono
//! and resampled with rubato.

pub mod decode;
pub mod resampling;

use thiserror::Error;

/// Target sample rate for all downstream processing
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Audio ingestion failure
///
/// `Unreadable` is the one condition the meeting pipeline propagates to its
/// caller; everything downstream of a successful load degrades instead of
/// failing.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio input unreadable: {0}")]
    Unreadable(String),
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),
    #[error("resampling failed: {0}")]
    Resample(String),
}

/// A decoded mono audio stream
///
/// Immutable once loaded; the diarization core only ever reads it.
#[derive(Debug, Clone)]
pub struct AudioClip {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples covering `[start, end)` seconds, clamped to the clip bounds
    pub fn slice_seconds(&self, start: f64, end: f64) -> &[f32] {
        let rate = self.sample_rate as f64;
        let lo = ((start * rate) as usize).min(self.samples.len());
        let hi = ((end * rate) as usize).min(self.samples.len());
        if hi <= lo {
            &[]
        } else {
            &self.samples[lo..hi]
        }
    }
}

/// Load an audio file as a 16 kHz mono clip
pub fn load_audio_file(path: &str) -> Result<AudioClip, AudioError> {
    decode::load_audio_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_seconds_clamps() {
        let clip = AudioClip::new(vec![0.0; 16_000], 16_000);
        assert_eq!(clip.slice_seconds(0.0, 0.5).len(), 8_000);
        assert_eq!(clip.slice_seconds(0.5, 10.0).len(), 8_000);
        assert!(clip.slice_seconds(2.0, 3.0).is_empty());
        assert!(clip.slice_seconds(0.5, 0.5).is_empty());
    }

    #[test]
    fn test_duration() {
        let clip = AudioClip::new(vec![0.0; 24_000], 16_000);
        assert!((clip.duration_seconds() - 1.5).abs() < 1e-9);
    }
}
