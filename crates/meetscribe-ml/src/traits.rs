//! Backend traits

use anyhow::Result;
use meetscribe_audio::AudioClip;
use meetscribe_types::DiarizationSegment;

/// Trait for diarization backends
///
/// Implementations return time-ordered segments labeled `SPEAKER_<n>`;
/// numbering is stable within one call and meaningless across calls.
pub trait DiarizationBackend: Send + Sync {
    /// Backend name
    fn name(&self) -> &str;

    /// Diarize a clip, optionally targeting an expected speaker count
    fn diarize(
        &self,
        clip: &AudioClip,
        expected_speakers: Option<usize>,
    ) -> Result<Vec<DiarizationSegment>>;
}
