//! Silence-based speech segmentation
//!
//! Scans the clip in short frames and keeps the stretches whose energy sits
//! above an amplitude floor. Two stretches are only split when the silence
//! between them is long enough; shorter dips are bridged.

use meetscribe_audio::AudioClip;

/// Silence detection configuration
#[derive(Debug, Clone)]
pub struct SilenceConfig {
    /// Amplitude floor relative to full scale (dB); frames below are silence
    pub silence_threshold_db: f32,
    /// Minimum silence run required to split two speech stretches (ms)
    pub min_silence_ms: u32,
    /// Scan granularity (ms); bounds boundary precision
    pub seek_step_ms: u32,
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            silence_threshold_db: -40.0,
            min_silence_ms: 500,
            seek_step_ms: 10,
        }
    }
}

/// A candidate speech interval, `start < end`, in seconds
///
/// Construction rejects malformed ranges so nothing zero-length or inverted
/// ever reaches feature extraction or clustering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeechInterval {
    start: f64,
    end: f64,
}

impl SpeechInterval {
    /// Returns `None` for malformed ranges (end <= start or negative start)
    pub fn new(start: f64, end: f64) -> Option<Self> {
        if start >= 0.0 && end > start {
            Some(Self { start, end })
        } else {
            None
        }
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Detect non-silent intervals in a clip
///
/// Returns an empty vector when no speech is found; that is a valid
/// terminal state for the caller, not an error.
pub fn detect_speech_intervals(clip: &AudioClip, config: &SilenceConfig) -> Vec<SpeechInterval> {
    let step = (clip.sample_rate() as u64 * config.seek_step_ms as u64 / 1000) as usize;
    if step == 0 || clip.is_empty() {
        return Vec::new();
    }

    let step_seconds = config.seek_step_ms as f64 / 1000.0;
    let min_silence_frames =
        (config.min_silence_ms as f64 / config.seek_step_ms as f64).ceil() as usize;

    let mut intervals = Vec::new();
    let mut speech_start: Option<usize> = None;
    let mut last_speech_end = 0usize;
    let mut silence_run = 0usize;

    for (i, frame) in clip.samples().chunks(step).enumerate() {
        let loud = frame_db(frame) >= config.silence_threshold_db;

        if loud {
            if speech_start.is_none() {
                speech_start = Some(i);
            }
            last_speech_end = i + 1;
            silence_run = 0;
        } else if let Some(start) = speech_start {
            silence_run += 1;
            if silence_run >= min_silence_frames {
                push_interval(&mut intervals, start, last_speech_end, step_seconds);
                speech_start = None;
                silence_run = 0;
            }
        }
    }

    if let Some(start) = speech_start {
        push_interval(&mut intervals, start, last_speech_end, step_seconds);
    }

    tracing::debug!(
        "Silence scan: {} speech intervals over {:.1}s",
        intervals.len(),
        clip.duration_seconds()
    );

    intervals
}

fn push_interval(
    intervals: &mut Vec<SpeechInterval>,
    start_frame: usize,
    end_frame: usize,
    step_seconds: f64,
) {
    let start = start_frame as f64 * step_seconds;
    let end = end_frame as f64 * step_seconds;
    if let Some(interval) = SpeechInterval::new(start, end) {
        intervals.push(interval);
    }
}

/// RMS level of a frame in dB relative to full scale
fn frame_db(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return f32::NEG_INFINITY;
    }
    let mean_square = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
    let rms = mean_square.sqrt();
    20.0 * rms.max(1e-10).log10()
}
