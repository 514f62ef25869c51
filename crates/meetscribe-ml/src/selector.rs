//! Diarization backend selection
//!
//! Chooses between the neural backend and the unconditional energy backend.
//! The choice is a pure function of (requested mode, model availability,
//! credential presence) re-evaluated per call; loaded neural sessions are
//! cached for the life of the process.

use crate::fallback::EnergyDiarizer;
use crate::neural::{NeuralDiarizer, NeuralDiarizerConfig};
use crate::traits::DiarizationBackend;
use anyhow::Result;
use meetscribe_audio::AudioClip;
use meetscribe_types::{DiarizationMode, DiarizationSegment};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Global cache of loaded neural diarizers, keyed by models directory
///
/// Read-only after a directory's first load; safe for concurrent pipeline
/// instances.
static NEURAL_CACHE: OnceLock<RwLock<HashMap<PathBuf, Arc<NeuralDiarizer>>>> = OnceLock::new();

fn neural_cache() -> &'static RwLock<HashMap<PathBuf, Arc<NeuralDiarizer>>> {
    NEURAL_CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Default models directory, `<data-local>/meetscribe/models`
pub fn default_models_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("meetscribe").join("models"))
        .unwrap_or_else(|| PathBuf::from("models"))
}

/// Backend picked for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendChoice {
    Neural,
    Energy,
}

/// Pure selection policy
///
/// The neural backend needs its model files and the access credential;
/// either one missing means the energy backend, for every mode. Diarization
/// always produces a result, so no mode can fail selection.
pub fn choose_backend(
    mode: DiarizationMode,
    neural_available: bool,
    credential_present: bool,
) -> BackendChoice {
    match mode {
        DiarizationMode::Fallback => BackendChoice::Energy,
        DiarizationMode::Auto | DiarizationMode::HighAccuracy => {
            if neural_available && credential_present {
                BackendChoice::Neural
            } else {
                BackendChoice::Energy
            }
        }
    }
}

/// Per-call diarization options
#[derive(Debug, Clone, Default)]
pub struct DiarizationOptions {
    pub mode: DiarizationMode,
    /// Expected speaker count, when the operator knows it
    pub num_speakers: Option<usize>,
    /// Override for the models directory (defaults to [`default_models_dir`])
    pub models_dir: Option<PathBuf>,
}

/// Get a neural diarizer from the global cache, loading it on first use
fn get_or_load_neural(models_dir: &Path) -> Result<Arc<NeuralDiarizer>> {
    // Fast path with read lock
    {
        let cache = neural_cache().read();
        if let Some(diarizer) = cache.get(models_dir) {
            tracing::debug!("Neural diarizer cache hit for {:?}", models_dir);
            return Ok(Arc::clone(diarizer));
        }
    }

    let mut cache = neural_cache().write();

    // Double-check after acquiring the write lock
    if let Some(diarizer) = cache.get(models_dir) {
        return Ok(Arc::clone(diarizer));
    }

    let diarizer = Arc::new(NeuralDiarizer::new(NeuralDiarizerConfig::for_dir(
        models_dir,
    ))?);
    cache.insert(models_dir.to_path_buf(), Arc::clone(&diarizer));
    tracing::info!("Neural diarizer cached for {:?}", models_dir);

    Ok(diarizer)
}

/// Diarize a meeting clip
///
/// Never fails outright: a missing model or credential downgrades the mode,
/// and a neural inference error is caught, logged, and retried on the
/// energy backend with the same clip — the subsystem's only retry.
pub fn diarize_meeting_audio(
    clip: &AudioClip,
    options: &DiarizationOptions,
) -> Result<Vec<DiarizationSegment>> {
    let models_dir = options
        .models_dir
        .clone()
        .unwrap_or_else(default_models_dir);

    let available = NeuralDiarizer::is_available(&models_dir);
    let credential = NeuralDiarizer::credential_present();
    let choice = choose_backend(options.mode, available, credential);

    if choice == BackendChoice::Energy && options.mode == DiarizationMode::HighAccuracy {
        tracing::warn!(
            "High-accuracy diarization unavailable (models present: {}, credential: {}); using energy backend",
            available,
            credential
        );
    }

    if choice == BackendChoice::Neural {
        match get_or_load_neural(&models_dir)
            .and_then(|diarizer| diarizer.diarize(clip, options.num_speakers))
        {
            Ok(segments) => return Ok(segments),
            Err(e) => {
                tracing::error!("Neural diarization failed: {}", e);
                tracing::info!("Falling back to energy diarization");
            }
        }
    }

    EnergyDiarizer::with_defaults().diarize(clip, options.num_speakers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_backend_policy() {
        use BackendChoice::*;
        use DiarizationMode::*;

        assert_eq!(choose_backend(Auto, true, true), Neural);
        assert_eq!(choose_backend(Auto, true, false), Energy);
        assert_eq!(choose_backend(Auto, false, true), Energy);
        assert_eq!(choose_backend(HighAccuracy, true, true), Neural);
        assert_eq!(choose_backend(HighAccuracy, false, true), Energy);
        assert_eq!(choose_backend(HighAccuracy, true, false), Energy);
        // Explicit fallback ignores availability entirely
        assert_eq!(choose_backend(Fallback, true, true), Energy);
    }

    #[test]
    fn test_high_accuracy_downgrades_without_models() {
        let dir = tempfile::tempdir().unwrap();
        let clip = AudioClip::new(vec![0.0; 16_000], 16_000);

        let options = DiarizationOptions {
            mode: DiarizationMode::HighAccuracy,
            num_speakers: None,
            models_dir: Some(dir.path().to_path_buf()),
        };

        // Silent clip through the energy backend: empty diarization, no error
        let segments = diarize_meeting_audio(&clip, &options).unwrap();
        assert!(segments.is_empty());
    }

    #[test]
    fn test_fallback_mode_runs_energy_backend() {
        let dir = tempfile::tempdir().unwrap();
        let samples: Vec<f32> = (0..16_000)
            .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / 16_000.0).sin() * 0.5)
            .collect();
        let clip = AudioClip::new(samples, 16_000);

        let options = DiarizationOptions {
            mode: DiarizationMode::Fallback,
            num_speakers: None,
            models_dir: Some(dir.path().to_path_buf()),
        };

        let segments = diarize_meeting_audio(&clip, &options).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].speaker.as_str(), "SPEAKER_0");
    }
}
