//! Energy-based diarization backend
//!
//! The CPU-only path: silence segmentation, MFCC fingerprints, and
//! agglomerative clustering. No pretrained model, no credential. Output
//! quality is below the neural backend; availability is unconditional.

use crate::cluster::{agglomerative_cluster, default_speaker_count, SpeakerCountEstimator};
use crate::features::{MfccExtractor, MIN_INTERVAL_SECONDS};
use crate::segmenter::{detect_speech_intervals, SilenceConfig, SpeechInterval};
use crate::traits::DiarizationBackend;
use anyhow::Result;
use meetscribe_audio::AudioClip;
use meetscribe_types::{DiarizationSegment, SpeakerLabel};

/// Energy diarizer configuration
#[derive(Debug, Clone)]
pub struct EnergyDiarizerConfig {
    /// Silence detection parameters
    pub silence: SilenceConfig,
    /// Intervals shorter than this are dropped before clustering (seconds)
    pub min_interval_seconds: f64,
    /// Speaker-count policy used when the caller gives no expected count
    pub speaker_estimator: SpeakerCountEstimator,
}

impl Default for EnergyDiarizerConfig {
    fn default() -> Self {
        Self {
            silence: SilenceConfig::default(),
            min_interval_seconds: MIN_INTERVAL_SECONDS,
            speaker_estimator: default_speaker_count,
        }
    }
}

/// Energy-based speaker diarization engine
pub struct EnergyDiarizer {
    config: EnergyDiarizerConfig,
}

impl EnergyDiarizer {
    pub fn new(config: EnergyDiarizerConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(EnergyDiarizerConfig::default())
    }

    fn try_diarize(
        &self,
        clip: &AudioClip,
        expected_speakers: Option<usize>,
    ) -> Result<Vec<DiarizationSegment>> {
        let intervals = detect_speech_intervals(clip, &self.config.silence);

        if intervals.is_empty() {
            tracing::warn!("No speech detected in audio");
            return Ok(Vec::new());
        }

        let extractor = MfccExtractor::new(clip.sample_rate());

        let mut kept: Vec<SpeechInterval> = Vec::new();
        let mut fingerprints: Vec<Vec<f32>> = Vec::new();

        for interval in intervals {
            if interval.duration() < self.config.min_interval_seconds {
                continue;
            }
            let samples = clip.slice_seconds(interval.start(), interval.end());
            if let Some(fingerprint) = extractor.fingerprint(samples) {
                kept.push(interval);
                fingerprints.push(fingerprint);
            }
        }

        if kept.is_empty() {
            tracing::warn!("No intervals long enough to fingerprint");
            return Ok(Vec::new());
        }

        if kept.len() == 1 {
            // A single interval needs no clustering
            return Ok(vec![segment(&kept[0], SpeakerLabel::new(0))]);
        }

        let k = expected_speakers
            .unwrap_or_else(|| (self.config.speaker_estimator)(kept.len()))
            .min(kept.len())
            .max(1);

        let labels = agglomerative_cluster(&fingerprints, k);

        let segments: Vec<DiarizationSegment> = kept
            .iter()
            .zip(labels.iter())
            .map(|(interval, &label)| segment(interval, SpeakerLabel::new(label)))
            .collect();

        let num_speakers = labels.iter().max().map(|m| m + 1).unwrap_or(0);
        tracing::info!(
            "Energy diarization complete: {} segments, {} speakers",
            segments.len(),
            num_speakers
        );

        Ok(segments)
    }
}

fn segment(interval: &SpeechInterval, speaker: SpeakerLabel) -> DiarizationSegment {
    DiarizationSegment::new(interval.start(), interval.end(), speaker)
}

impl DiarizationBackend for EnergyDiarizer {
    fn name(&self) -> &str {
        "energy"
    }

    /// Never fails outright: any internal error degrades to a single
    /// pseudo-segment spanning the whole clip.
    fn diarize(
        &self,
        clip: &AudioClip,
        expected_speakers: Option<usize>,
    ) -> Result<Vec<DiarizationSegment>> {
        match self.try_diarize(clip, expected_speakers) {
            Ok(segments) => Ok(segments),
            Err(e) => {
                tracing::warn!("Energy diarization degraded to single speaker: {}", e);
                Ok(vec![DiarizationSegment::new(
                    0.0,
                    clip.duration_seconds(),
                    SpeakerLabel::new(0),
                )])
            }
        }
    }
}
