//! Diarization core for MeetScribe
//!
//! Provides speaker diarization (neural and energy backends with automatic
//! fallback), transcript/diarization fusion, boundary refinement, and
//! participant-name resolution.

pub mod cluster;
pub mod fallback;
pub mod features;
pub mod fusion;
pub mod neural;
pub mod pipeline;
pub mod resolver;
pub mod segmenter;
pub mod selector;
pub mod traits;

pub use cluster::{agglomerative_cluster, default_speaker_count, SpeakerCountEstimator};
pub use fallback::{EnergyDiarizer, EnergyDiarizerConfig};
pub use fusion::{
    merge_transcript_with_diarization, refine_speaker_boundaries, DEFAULT_MIN_GAP_SECONDS,
};
pub use neural::{NeuralDiarizer, NeuralDiarizerConfig};
pub use pipeline::{process_meeting, PipelineOptions};
pub use resolver::{
    apply_speaker_mapping, candidate_labels, default_source_chain, resolve_speaker_names,
    resolve_with_sources, ParticipantSource, SpeakerResolution,
};
pub use segmenter::{detect_speech_intervals, SilenceConfig, SpeechInterval};
pub use selector::{
    choose_backend, default_models_dir, diarize_meeting_audio, BackendChoice, DiarizationOptions,
};
pub use traits::DiarizationBackend;
