//! Neural diarization backend using ONNX Runtime
//!
//! Two pretrained networks: a powerset segmentation model scanned over 10 s
//! windows, and a speaker-embedding model applied to the active regions.
//! Region embeddings are matched into run-local speakers by cosine
//! similarity against incrementally updated centroids.
//!
//! Both model files live in the models directory and are gated weights;
//! the backend is only selected when the files are present and the access
//! token is set (see the selector).

use crate::features::log_mel_frames;
use crate::traits::DiarizationBackend;
use anyhow::{Context, Result};
use meetscribe_audio::AudioClip;
use meetscribe_types::{DiarizationSegment, SpeakerLabel};
use ndarray::{Array2, Array3};
use ort::session::{builder::GraphOptimizationLevel, Session};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

pub const SEGMENTATION_MODEL_FILE: &str = "segmentation.onnx";
pub const EMBEDDING_MODEL_FILE: &str = "embedding.onnx";
/// Credential gating access to the pretrained weights
pub const ACCESS_TOKEN_ENV: &str = "HF_TOKEN";

const WINDOW_SECONDS: f64 = 10.0;
/// Local speaker slots the segmentation model distinguishes per window
const LOCAL_SPEAKERS: usize = 3;
/// Per-frame powerset classes: silence, three single speakers, and the
/// three pairwise overlaps
const POWERSET: [&[usize]; 7] = [&[], &[0], &[1], &[2], &[0, 1], &[0, 2], &[1, 2]];
const EMBEDDING_MELS: usize = 80;

/// Neural diarizer configuration
#[derive(Debug, Clone)]
pub struct NeuralDiarizerConfig {
    /// Directory holding both ONNX model files
    pub models_dir: PathBuf,
    /// Cosine similarity needed to match a region to a known run speaker
    pub match_threshold: f32,
    /// Speaker cap when the caller gives no expected count
    pub max_speakers: usize,
    /// Regions shorter than this are too short to embed and are skipped
    pub min_region_seconds: f64,
}

impl NeuralDiarizerConfig {
    pub fn for_dir(models_dir: &Path) -> Self {
        Self {
            models_dir: models_dir.to_path_buf(),
            match_threshold: 0.5,
            max_speakers: 10,
            min_region_seconds: 0.5,
        }
    }
}

/// ONNX-based speaker diarization engine
pub struct NeuralDiarizer {
    segmentation: Mutex<Session>,
    embedding: Mutex<Session>,
    config: NeuralDiarizerConfig,
}

impl NeuralDiarizer {
    /// Check whether both model files are present
    pub fn is_available(models_dir: &Path) -> bool {
        models_dir.join(SEGMENTATION_MODEL_FILE).exists()
            && models_dir.join(EMBEDDING_MODEL_FILE).exists()
    }

    /// Check whether the model-access credential is set
    pub fn credential_present() -> bool {
        std::env::var(ACCESS_TOKEN_ENV)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn new(config: NeuralDiarizerConfig) -> Result<Self> {
        let segmentation_path = config.models_dir.join(SEGMENTATION_MODEL_FILE);
        let embedding_path = config.models_dir.join(EMBEDDING_MODEL_FILE);

        tracing::info!(
            "Loading diarization models from {:?} (threshold={:.2}, maxSpeakers={})",
            config.models_dir,
            config.match_threshold,
            config.max_speakers
        );

        let segmentation = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(&segmentation_path)
            .context("Failed to load segmentation model")?;

        let embedding = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(&embedding_path)
            .context("Failed to load embedding model")?;

        Ok(Self {
            segmentation: Mutex::new(segmentation),
            embedding: Mutex::new(embedding),
            config,
        })
    }

    fn diarize_clip(
        &self,
        clip: &AudioClip,
        expected_speakers: Option<usize>,
    ) -> Result<Vec<DiarizationSegment>> {
        if clip.is_empty() {
            return Ok(Vec::new());
        }

        let sample_rate = clip.sample_rate() as usize;
        let window_len = (WINDOW_SECONDS * sample_rate as f64) as usize;
        let speaker_cap = expected_speakers.unwrap_or(self.config.max_speakers).max(1);

        let mut matcher = CentroidMatcher::new(self.config.match_threshold, speaker_cap);
        let mut segments: Vec<DiarizationSegment> = Vec::new();

        for (w, chunk) in clip.samples().chunks(window_len).enumerate() {
            let offset = (w * window_len) as f64 / sample_rate as f64;
            let real_end = offset + chunk.len() as f64 / sample_rate as f64;

            let activations = self.run_segmentation(chunk, window_len)?;
            if activations.is_empty() {
                continue;
            }
            let frame_duration = WINDOW_SECONDS / activations.len() as f64;

            for local in 0..LOCAL_SPEAKERS {
                for (run_start, run_end) in active_runs(&activations, local, frame_duration) {
                    let start = offset + run_start;
                    let end = (offset + run_end).min(real_end);

                    if end - start < self.config.min_region_seconds {
                        continue;
                    }

                    let embedding =
                        self.run_embedding(clip.slice_seconds(start, end), clip.sample_rate())?;
                    let speaker = matcher.assign(&embedding);

                    segments.push(DiarizationSegment::new(
                        start,
                        end,
                        SpeakerLabel::new(speaker),
                    ));
                }
            }
        }

        segments.sort_by(|a, b| a.start.total_cmp(&b.start));

        tracing::info!(
            "Neural diarization complete: {} segments from {} speakers over {:.1}s",
            segments.len(),
            matcher.num_speakers(),
            clip.duration_seconds()
        );

        Ok(segments)
    }

    /// Per-frame local speaker activations for one window
    fn run_segmentation(&self, chunk: &[f32], window_len: usize) -> Result<Vec<[bool; LOCAL_SPEAKERS]>> {
        let mut padded = chunk.to_vec();
        padded.resize(window_len, 0.0);

        let input = Array3::from_shape_vec((1, 1, window_len), padded)
            .context("Failed to shape segmentation input")?;
        let input_tensor = ort::value::Tensor::from_array(input)?;

        let mut session = self.segmentation.lock();
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .context("Segmentation model has no outputs")?;

        let outputs = session.run(ort::inputs![input_tensor]?)?;
        let (shape, data) = outputs
            .get(output_name.as_str())
            .context("No segmentation output tensor")?
            .try_extract_raw_tensor::<f32>()?;

        // [1, frames, classes]
        let frames = shape[1] as usize;
        let classes = shape[2] as usize;

        let logits: Vec<Vec<f32>> = (0..frames)
            .map(|t| data[t * classes..(t + 1) * classes].to_vec())
            .collect();

        Ok(decode_powerset(&logits))
    }

    /// Speaker embedding for one region
    fn run_embedding(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
        let frames = log_mel_frames(samples, sample_rate, EMBEDDING_MELS);
        if frames.is_empty() {
            anyhow::bail!("Region too short for embedding features");
        }

        let t = frames.len();
        let flat: Vec<f32> = frames.concat();
        let input = Array2::from_shape_vec((t, EMBEDDING_MELS), flat)
            .context("Failed to shape embedding input")?
            .insert_axis(ndarray::Axis(0));
        let input_tensor = ort::value::Tensor::from_array(input)?;

        let mut session = self.embedding.lock();
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .context("Embedding model has no outputs")?;

        let outputs = session.run(ort::inputs![input_tensor]?)?;
        let (_, data) = outputs
            .get(output_name.as_str())
            .context("No embedding output tensor")?
            .try_extract_raw_tensor::<f32>()?;

        Ok(data.to_vec())
    }
}

impl DiarizationBackend for NeuralDiarizer {
    fn name(&self) -> &str {
        "neural"
    }

    fn diarize(
        &self,
        clip: &AudioClip,
        expected_speakers: Option<usize>,
    ) -> Result<Vec<DiarizationSegment>> {
        self.diarize_clip(clip, expected_speakers)
    }
}

/// Argmax powerset class per frame, expanded to local speaker flags
fn decode_powerset(logits: &[Vec<f32>]) -> Vec<[bool; LOCAL_SPEAKERS]> {
    logits
        .iter()
        .map(|frame| {
            let class = frame
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
                .map(|(i, _)| i)
                .unwrap_or(0);

            let mut flags = [false; LOCAL_SPEAKERS];
            if let Some(active) = POWERSET.get(class) {
                for &s in active.iter() {
                    flags[s] = true;
                }
            }
            flags
        })
        .collect()
}

/// Contiguous active runs for one local speaker, in window-relative seconds
fn active_runs(
    activations: &[[bool; LOCAL_SPEAKERS]],
    local: usize,
    frame_duration: f64,
) -> Vec<(f64, f64)> {
    let mut runs = Vec::new();
    let mut run_start: Option<usize> = None;

    for (i, flags) in activations.iter().enumerate() {
        if flags[local] {
            if run_start.is_none() {
                run_start = Some(i);
            }
        } else if let Some(start) = run_start.take() {
            runs.push((start as f64 * frame_duration, i as f64 * frame_duration));
        }
    }

    if let Some(start) = run_start {
        runs.push((
            start as f64 * frame_duration,
            activations.len() as f64 * frame_duration,
        ));
    }

    runs
}

/// Incremental matcher of region embeddings into run-local speakers
///
/// The first region opens `SPEAKER_0`; later regions join the most similar
/// centroid when it clears the threshold, or open a new speaker until the
/// cap is reached.
struct CentroidMatcher {
    threshold: f32,
    cap: usize,
    centroids: Vec<Vec<f32>>,
    counts: Vec<usize>,
}

impl CentroidMatcher {
    fn new(threshold: f32, cap: usize) -> Self {
        Self {
            threshold,
            cap,
            centroids: Vec::new(),
            counts: Vec::new(),
        }
    }

    fn num_speakers(&self) -> usize {
        self.centroids.len()
    }

    fn assign(&mut self, embedding: &[f32]) -> usize {
        let best = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, cosine_similarity(embedding, c)))
            .max_by(|(_, a), (_, b)| a.total_cmp(b));

        if let Some((idx, similarity)) = best {
            if similarity >= self.threshold || self.centroids.len() >= self.cap {
                self.update_centroid(idx, embedding);
                return idx;
            }
        }

        self.centroids.push(embedding.to_vec());
        self.counts.push(1);
        self.centroids.len() - 1
    }

    /// Running-mean centroid update
    fn update_centroid(&mut self, idx: usize, embedding: &[f32]) {
        let count = self.counts[idx] as f32;
        for (old, &new) in self.centroids[idx].iter_mut().zip(embedding.iter()) {
            *old = (*old * count + new) / (count + 1.0);
        }
        self.counts[idx] += 1;
    }
}

/// Cosine similarity between two vectors (-1..1, 1 = identical)
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot_product: f64 = 0.0;
    let mut norm_a: f64 = 0.0;
    let mut norm_b: f64 = 0.0;

    for i in 0..a.len() {
        let a_val = a[i] as f64;
        let b_val = b[i] as f64;
        dot_product += a_val * b_val;
        norm_a += a_val * a_val;
        norm_b += b_val * b_val;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_available_needs_both_models() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!NeuralDiarizer::is_available(dir.path()));

        std::fs::write(dir.path().join(SEGMENTATION_MODEL_FILE), b"x").unwrap();
        assert!(!NeuralDiarizer::is_available(dir.path()));

        std::fs::write(dir.path().join(EMBEDDING_MODEL_FILE), b"x").unwrap();
        assert!(NeuralDiarizer::is_available(dir.path()));
    }

    #[test]
    fn test_decode_powerset() {
        // silence, speaker 1, overlap of speakers 0 and 2
        let logits = vec![
            vec![9.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            vec![0.0, 0.0, 9.0, 0.0, 0.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0, 0.0, 9.0, 0.0],
        ];
        let flags = decode_powerset(&logits);
        assert_eq!(flags[0], [false, false, false]);
        assert_eq!(flags[1], [false, true, false]);
        assert_eq!(flags[2], [true, false, true]);
    }

    #[test]
    fn test_active_runs() {
        let mut activations = vec![[false; LOCAL_SPEAKERS]; 10];
        for frame in &mut activations[2..5] {
            frame[1] = true;
        }
        activations[8][1] = true;
        activations[9][1] = true;

        let runs = active_runs(&activations, 1, 0.1);
        assert_eq!(runs.len(), 2);
        assert!((runs[0].0 - 0.2).abs() < 1e-9);
        assert!((runs[0].1 - 0.5).abs() < 1e-9);
        // trailing run closes at the window edge
        assert!((runs[1].1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_centroid_matcher_separates_and_matches() {
        let mut matcher = CentroidMatcher::new(0.5, 10);
        assert_eq!(matcher.assign(&[1.0, 0.0, 0.0]), 0);
        assert_eq!(matcher.assign(&[0.0, 1.0, 0.0]), 1);
        // Close to the first centroid: matches speaker 0
        assert_eq!(matcher.assign(&[0.9, 0.1, 0.0]), 0);
        assert_eq!(matcher.num_speakers(), 2);
    }

    #[test]
    fn test_centroid_matcher_respects_cap() {
        let mut matcher = CentroidMatcher::new(0.9, 1);
        assert_eq!(matcher.assign(&[1.0, 0.0]), 0);
        // Dissimilar, but the cap forces assignment to the best existing speaker
        assert_eq!(matcher.assign(&[0.0, 1.0]), 0);
        assert_eq!(matcher.num_speakers(), 1);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-3);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-3);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-3);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
