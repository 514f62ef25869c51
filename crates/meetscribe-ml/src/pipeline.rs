//! End-to-end meeting processing
//!
//! One synchronous pass per meeting: diarize, fuse with the ASR transcript,
//! refine boundaries, resolve speaker names, and substitute them when the
//! mapping is complete. Independent pipeline runs share nothing but the
//! read-only model cache.

use crate::fusion::{
    merge_transcript_with_diarization, refine_speaker_boundaries, DEFAULT_MIN_GAP_SECONDS,
};
use crate::resolver::{apply_speaker_mapping, candidate_labels, resolve_speaker_names};
use crate::selector::{diarize_meeting_audio, DiarizationOptions};
use anyhow::Result;
use meetscribe_audio::AudioClip;
use meetscribe_types::{MeetingIdentity, MeetingTranscript, TranscriptSegment};

/// Pipeline options
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub diarization: DiarizationOptions,
    /// Minimum same-speaker gap bridged during refinement (seconds)
    pub refine_min_gap: f64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            diarization: DiarizationOptions::default(),
            refine_min_gap: DEFAULT_MIN_GAP_SECONDS,
        }
    }
}

/// Process one meeting into a speaker-attributed transcript
pub fn process_meeting(
    clip: &AudioClip,
    transcript: &[TranscriptSegment],
    meeting: &MeetingIdentity,
    manual_participants: Option<&str>,
    options: &PipelineOptions,
) -> Result<MeetingTranscript> {
    let diarization = diarize_meeting_audio(clip, &options.diarization)?;
    tracing::info!(
        "Diarization produced {} segments for meeting {}",
        diarization.len(),
        meeting.id
    );

    let merged = merge_transcript_with_diarization(transcript, &diarization);
    let refined = refine_speaker_boundaries(merged, options.refine_min_gap);

    let labels = candidate_labels(&refined);
    let num_speakers = labels.len();

    let resolution = resolve_speaker_names(meeting, &labels, manual_participants);
    let segments = apply_speaker_mapping(refined, &resolution);

    tracing::info!(
        "Meeting {} processed: {} segments, {} speakers, mapping complete: {}",
        meeting.id,
        segments.len(),
        num_speakers,
        resolution.status.is_complete()
    );

    Ok(MeetingTranscript {
        segments,
        mapping: resolution.mapping,
        mapping_status: resolution.status,
        num_speakers,
    })
}
