//! Shared types for MeetScribe
//!
//! This crate contains the data structures exchanged between the
//! diarization core, the worker process, and downstream consumers
//! (report generation, persistence, search).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Speaker Types
// ============================================================================

/// Opaque per-run speaker identifier, canonical form `SPEAKER_<index>`.
///
/// Labels separate voices within a single diarization run only; the index
/// carries no meaning across meetings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeakerLabel(String);

impl SpeakerLabel {
    /// Label for cluster `index` in the current run
    pub fn new(index: usize) -> Self {
        Self(format!("SPEAKER_{}", index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SpeakerLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SpeakerLabel {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SpeakerLabel {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Speaker segment produced by a diarization backend
///
/// The sequence for one run is time-ordered; overlapping segments are
/// tolerated and resolved during fusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiarizationSegment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Per-run speaker label
    pub speaker: SpeakerLabel,
    /// Segment duration in seconds
    pub duration: f64,
}

impl DiarizationSegment {
    pub fn new(start: f64, end: f64, speaker: SpeakerLabel) -> Self {
        Self {
            start,
            end,
            speaker,
            duration: end - start,
        }
    }
}

// ============================================================================
// Transcript Types (ASR collaborator input)
// ============================================================================

/// A single transcribed word with timing from the ASR engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptWord {
    /// The word text
    pub word: String,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// ASR confidence for this word (0.0 - 1.0)
    #[serde(default)]
    pub probability: f64,
}

/// A transcript segment as produced by the ASR collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Transcribed text
    pub text: String,
    /// Word-level timestamps
    #[serde(default)]
    pub words: Vec<TranscriptWord>,
    /// Probability the span is silence/noise rather than speech
    #[serde(default)]
    pub no_speech_prob: f64,
}

/// Full transcript document as written by the ASR collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub segments: Vec<TranscriptSegment>,
}

// ============================================================================
// Merged Output Types
// ============================================================================

/// A fused, speaker-attributed transcript segment
///
/// This is the canonical record handed to report generation, persistence,
/// and search. `start`/`end` are `HH:MM:SS.mmm` strings; the raw second
/// values are kept alongside for downstream arithmetic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedSegment {
    /// Start timestamp, `HH:MM:SS.mmm`
    pub start: String,
    /// End timestamp, `HH:MM:SS.mmm`
    pub end: String,
    /// Start time in seconds
    pub start_seconds: f64,
    /// End time in seconds
    pub end_seconds: f64,
    /// Speaker label, or resolved display name after substitution
    pub speaker: String,
    /// Transcribed text
    pub text: String,
    /// Word-level timestamps, copied through from the ASR input
    #[serde(default)]
    pub words: Vec<TranscriptWord>,
    /// Probability the span is actual speech (1 - no_speech_prob)
    pub confidence: f64,
}

// ============================================================================
// Speaker Mapping Types
// ============================================================================

/// Mapping from per-run speaker labels to display names
///
/// Built once per meeting, either fully automatic or completed manually.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeakerMapping {
    entries: BTreeMap<SpeakerLabel, String>,
}

impl SpeakerMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mapping by pairing names with labels positionally.
    ///
    /// Extra names beyond the label count are ignored; extra labels stay
    /// unmapped (the resulting mapping is partial for them).
    pub fn from_positional(labels: &[SpeakerLabel], names: &[String]) -> Self {
        let entries = labels
            .iter()
            .zip(names.iter())
            .map(|(label, name)| (label.clone(), name.clone()))
            .collect();
        Self { entries }
    }

    pub fn insert(&mut self, label: SpeakerLabel, name: String) {
        self.entries.insert(label, name);
    }

    pub fn get(&self, label: &SpeakerLabel) -> Option<&str> {
        self.entries.get(label).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SpeakerLabel, &str)> {
        self.entries.iter().map(|(l, n)| (l, n.as_str()))
    }

    /// True when every candidate label has an entry
    pub fn is_complete_for(&self, labels: &[SpeakerLabel]) -> bool {
        labels.iter().all(|l| self.entries.contains_key(l))
    }

    /// Candidate labels without an entry, in candidate order
    pub fn unresolved_labels(&self, labels: &[SpeakerLabel]) -> Vec<SpeakerLabel> {
        labels
            .iter()
            .filter(|l| !self.entries.contains_key(l))
            .cloned()
            .collect()
    }
}

/// Completion state of a speaker mapping
///
/// A partial mapping is a reported state requiring manual completion,
/// not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MappingStatus {
    Complete,
    Partial { unresolved: Vec<SpeakerLabel> },
}

impl MappingStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, MappingStatus::Complete)
    }
}

// ============================================================================
// Meeting Types
// ============================================================================

/// Identity of the meeting being processed, used as the resolver key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeetingIdentity {
    /// Platform/session id (also keys bot capture files)
    pub id: String,
    /// Human meeting title (keys calendar lookup)
    #[serde(default)]
    pub title: String,
}

/// Requested diarization backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiarizationMode {
    /// Neural backend if available, energy fallback otherwise
    #[default]
    Auto,
    /// Neural backend, silently downgraded when unavailable
    HighAccuracy,
    /// Energy fallback only
    Fallback,
}

/// The final artifact of one meeting-processing run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingTranscript {
    /// Speaker-attributed, refined transcript timeline
    pub segments: Vec<MergedSegment>,
    /// Label -> display name entries gathered by the resolver
    pub mapping: SpeakerMapping,
    /// Whether the mapping covered every detected speaker
    pub mapping_status: MappingStatus,
    /// Number of distinct speakers in the timeline
    pub num_speakers: usize,
}

// ============================================================================
// Worker IPC Types
// ============================================================================

/// Worker command for IPC
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerCommand {
    /// Diarize an audio file
    Diarize {
        audio_path: String,
        #[serde(default)]
        num_speakers: Option<usize>,
        #[serde(default)]
        mode: DiarizationMode,
    },
    /// Run the full pipeline for one meeting
    ProcessMeeting {
        audio_path: String,
        transcript_path: String,
        #[serde(default)]
        meeting_id: Option<String>,
        #[serde(default)]
        title: String,
        /// Manual comma-separated participant list (last-resort source)
        #[serde(default)]
        participants: Option<String>,
        #[serde(default)]
        num_speakers: Option<usize>,
        #[serde(default)]
        mode: DiarizationMode,
    },
    /// Shutdown worker
    Shutdown,
}

/// Worker response for IPC
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerResponse {
    /// Diarization result
    Diarization {
        segments: Vec<DiarizationSegment>,
        num_speakers: usize,
    },
    /// Full meeting-processing result
    Meeting { transcript: MeetingTranscript },
    /// Error
    Error { message: String },
    /// Acknowledgement
    Ok,
}

// ============================================================================
// Timestamp Formatting
// ============================================================================

/// Format seconds as `HH:MM:SS.mmm`, zero-padded, millisecond-truncated
pub fn format_timestamp_ms(seconds: f64) -> String {
    let hours = (seconds / 3600.0) as u64;
    let minutes = ((seconds % 3600.0) / 60.0) as u64;
    let secs = (seconds % 60.0) as u64;
    let millis = ((seconds % 1.0) * 1000.0) as u64;
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp_ms() {
        assert_eq!(format_timestamp_ms(0.0), "00:00:00.000");
        assert_eq!(format_timestamp_ms(3725.125), "01:02:05.125");
        assert_eq!(format_timestamp_ms(59.5), "00:00:59.500");
        assert_eq!(format_timestamp_ms(3600.0), "01:00:00.000");
    }

    #[test]
    fn test_format_timestamp_truncates() {
        // 0.0015 s is 1 ms once truncated, never rounded up to 2
        assert_eq!(format_timestamp_ms(0.0015), "00:00:00.001");
    }

    #[test]
    fn test_speaker_label_form() {
        let label = SpeakerLabel::new(3);
        assert_eq!(label.as_str(), "SPEAKER_3");
        assert_eq!(label.to_string(), "SPEAKER_3");
    }

    #[test]
    fn test_mapping_completeness() {
        let labels = vec![SpeakerLabel::new(0), SpeakerLabel::new(1)];
        let names = vec!["Alice Smith".to_string()];

        let mapping = SpeakerMapping::from_positional(&labels, &names);
        assert_eq!(mapping.len(), 1);
        assert!(!mapping.is_complete_for(&labels));
        assert_eq!(mapping.unresolved_labels(&labels), vec![SpeakerLabel::new(1)]);

        let full = SpeakerMapping::from_positional(
            &labels,
            &["Alice Smith".to_string(), "Bob Jones".to_string()],
        );
        assert!(full.is_complete_for(&labels));
        assert_eq!(full.get(&SpeakerLabel::new(1)), Some("Bob Jones"));
    }

    #[test]
    fn test_positional_mapping_ignores_extra_names() {
        let labels = vec![SpeakerLabel::new(0)];
        let names = vec!["Alice".to_string(), "Bob".to_string()];
        let mapping = SpeakerMapping::from_positional(&labels, &names);
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get(&SpeakerLabel::new(0)), Some("Alice"));
    }

    #[test]
    fn test_worker_command_roundtrip() {
        let cmd = WorkerCommand::Diarize {
            audio_path: "/tmp/meeting.wav".to_string(),
            num_speakers: Some(2),
            mode: DiarizationMode::Fallback,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"type\":\"Diarize\""));
        assert!(json.contains("\"mode\":\"fallback\""));

        let back: WorkerCommand = serde_json::from_str(&json).unwrap();
        match back {
            WorkerCommand::Diarize { num_speakers, mode, .. } => {
                assert_eq!(num_speakers, Some(2));
                assert_eq!(mode, DiarizationMode::Fallback);
            }
            _ => panic!("wrong command variant"),
        }
    }

    #[test]
    fn test_command_defaults() {
        let cmd: WorkerCommand =
            serde_json::from_str(r#"{"type":"Diarize","audio_path":"a.wav"}"#).unwrap();
        match cmd {
            WorkerCommand::Diarize { num_speakers, mode, .. } => {
                assert_eq!(num_speakers, None);
                assert_eq!(mode, DiarizationMode::Auto);
            }
            _ => panic!("wrong command variant"),
        }
    }
}
