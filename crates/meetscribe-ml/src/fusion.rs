//! Transcript/diarization fusion and boundary refinement
//!
//! Fusion assigns each ASR segment the speaker with the greatest temporal
//! overlap; refinement then coalesces consecutive same-speaker segments
//! separated by short gaps, removing spurious speaker flips.

use meetscribe_types::{
    format_timestamp_ms, DiarizationSegment, MergedSegment, SpeakerLabel, TranscriptSegment,
};

/// Default minimum same-speaker gap bridged during refinement (seconds)
pub const DEFAULT_MIN_GAP_SECONDS: f64 = 0.5;

/// Temporal overlap between two ranges, in seconds (0 when disjoint)
fn overlap_seconds(a_start: f64, a_end: f64, b_start: f64, b_end: f64) -> f64 {
    (a_end.min(b_end) - a_start.max(b_start)).max(0.0)
}

/// Speaker active during the given time range, by maximum overlap
///
/// Ties — and ranges overlapping nothing — resolve to the earliest
/// diarization segment, so the result is deterministic. An empty
/// diarization sequence yields `SPEAKER_0`.
fn find_speaker_at(start: f64, end: f64, diarization: &[DiarizationSegment]) -> SpeakerLabel {
    let Some(first) = diarization.first() else {
        return SpeakerLabel::new(0);
    };

    let mut best_speaker = first.speaker.clone();
    let mut max_overlap = 0.0;

    for segment in diarization {
        let overlap = overlap_seconds(start, end, segment.start, segment.end);
        if overlap > max_overlap {
            max_overlap = overlap;
            best_speaker = segment.speaker.clone();
        }
    }

    best_speaker
}

/// Fuse ASR segments with the diarization timeline
///
/// Count-preserving: exactly one merged segment per transcript segment.
/// Word-level timestamps are copied through unchanged; confidence is the
/// probability the span is actual speech (`1 - no_speech_prob`).
pub fn merge_transcript_with_diarization(
    transcript: &[TranscriptSegment],
    diarization: &[DiarizationSegment],
) -> Vec<MergedSegment> {
    let merged: Vec<MergedSegment> = transcript
        .iter()
        .map(|segment| {
            let speaker = find_speaker_at(segment.start, segment.end, diarization);

            MergedSegment {
                start: format_timestamp_ms(segment.start),
                end: format_timestamp_ms(segment.end),
                start_seconds: segment.start,
                end_seconds: segment.end,
                speaker: speaker.into_string(),
                text: segment.text.clone(),
                words: segment.words.clone(),
                confidence: (1.0 - segment.no_speech_prob).clamp(0.0, 1.0),
            }
        })
        .collect();

    tracing::info!("Merged {} segments with speaker labels", merged.len());
    merged
}

/// Coalesce consecutive same-speaker segments separated by less than
/// `min_gap` seconds
///
/// A single left-to-right pass over an explicit accumulator; text is joined
/// with one space and word lists are concatenated, so no word is ever lost.
/// Idempotent for a fixed gap.
pub fn refine_speaker_boundaries(
    segments: Vec<MergedSegment>,
    min_gap: f64,
) -> Vec<MergedSegment> {
    let mut iter = segments.into_iter();
    let Some(first) = iter.next() else {
        return Vec::new();
    };

    let mut refined: Vec<MergedSegment> = Vec::new();
    let mut current = first;

    for segment in iter {
        let same_speaker = segment.speaker == current.speaker;
        let gap = segment.start_seconds - current.end_seconds;

        if same_speaker && gap < min_gap {
            current.end = segment.end;
            current.end_seconds = segment.end_seconds;
            current.text.push(' ');
            current.text.push_str(&segment.text);
            current.words.extend(segment.words);
        } else {
            refined.push(std::mem::replace(&mut current, segment));
        }
    }

    refined.push(current);
    refined
}

#[cfg(test)]
mod tests {
    use super::*;
    use meetscribe_types::TranscriptWord;

    fn make_word(word: &str, start: f64, end: f64) -> TranscriptWord {
        TranscriptWord {
            word: word.to_string(),
            start,
            end,
            probability: 1.0,
        }
    }

    fn make_transcript(
        start: f64,
        end: f64,
        text: &str,
        no_speech_prob: f64,
    ) -> TranscriptSegment {
        TranscriptSegment {
            start,
            end,
            text: text.to_string(),
            words: text
                .split_whitespace()
                .map(|w| make_word(w, start, end))
                .collect(),
            no_speech_prob,
        }
    }

    fn make_diarization(start: f64, end: f64, speaker: usize) -> DiarizationSegment {
        DiarizationSegment::new(start, end, SpeakerLabel::new(speaker))
    }

    #[test]
    fn test_count_preservation() {
        let transcript = vec![
            make_transcript(0.0, 2.0, "hello there", 0.0),
            make_transcript(2.0, 4.0, "how are you", 0.0),
            make_transcript(4.0, 6.0, "fine thanks", 0.0),
        ];
        let diarization = vec![make_diarization(0.0, 3.0, 0), make_diarization(3.0, 6.0, 1)];

        let merged = merge_transcript_with_diarization(&transcript, &diarization);
        assert_eq!(merged.len(), transcript.len());
    }

    #[test]
    fn test_empty_diarization_defaults_to_speaker_zero() {
        let transcript = vec![
            make_transcript(0.0, 1.0, "a", 0.0),
            make_transcript(1.0, 2.0, "b", 0.0),
            make_transcript(2.0, 3.0, "c", 0.0),
        ];

        let merged = merge_transcript_with_diarization(&transcript, &[]);
        assert_eq!(merged.len(), 3);
        assert!(merged.iter().all(|m| m.speaker == "SPEAKER_0"));
    }

    #[test]
    fn test_containment_assigns_enclosing_speaker() {
        let diarization = vec![make_diarization(0.0, 3.0, 0), make_diarization(3.0, 10.0, 1)];
        let transcript = vec![make_transcript(4.0, 6.0, "contained", 0.0)];

        let merged = merge_transcript_with_diarization(&transcript, &diarization);
        assert_eq!(merged[0].speaker, "SPEAKER_1");
    }

    #[test]
    fn test_overlap_tie_resolves_to_first() {
        // [4,6] overlaps both by exactly 1.0s; the earlier segment wins
        let diarization = vec![make_diarization(0.0, 5.0, 0), make_diarization(5.0, 10.0, 1)];
        let transcript = vec![make_transcript(4.0, 6.0, "tied", 0.0)];

        let merged = merge_transcript_with_diarization(&transcript, &diarization);
        assert_eq!(merged[0].speaker, "SPEAKER_0");
    }

    #[test]
    fn test_confidence_from_no_speech_prob() {
        let transcript = vec![
            make_transcript(0.0, 1.0, "likely speech", 0.2),
            make_transcript(1.0, 2.0, "no signal", 0.0),
        ];
        let merged = merge_transcript_with_diarization(&transcript, &[]);
        assert!((merged[0].confidence - 0.8).abs() < 1e-9);
        assert!((merged[1].confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_timestamps_formatted() {
        let transcript = vec![make_transcript(3725.125, 3726.5, "late", 0.0)];
        let merged = merge_transcript_with_diarization(&transcript, &[]);
        assert_eq!(merged[0].start, "01:02:05.125");
        assert_eq!(merged[0].end, "01:02:06.500");
    }

    #[test]
    fn test_words_copied_through() {
        let transcript = vec![make_transcript(0.0, 1.0, "two words", 0.0)];
        let diarization = vec![make_diarization(0.0, 1.0, 0)];
        let merged = merge_transcript_with_diarization(&transcript, &diarization);
        assert_eq!(merged[0].words.len(), 2);
        assert_eq!(merged[0].words[0].word, "two");
    }

    fn refinable(segments: &[(f64, f64, usize, &str)]) -> Vec<MergedSegment> {
        let transcript: Vec<TranscriptSegment> = segments
            .iter()
            .map(|&(start, end, _, text)| make_transcript(start, end, text, 0.0))
            .collect();
        let diarization: Vec<DiarizationSegment> = segments
            .iter()
            .map(|&(start, end, speaker, _)| make_diarization(start, end, speaker))
            .collect();
        merge_transcript_with_diarization(&transcript, &diarization)
    }

    #[test]
    fn test_refine_merges_close_same_speaker() {
        let merged = refinable(&[(0.0, 1.0, 0, "first part"), (1.3, 2.0, 0, "second part")]);

        let refined = refine_speaker_boundaries(merged, 0.5);
        assert_eq!(refined.len(), 1);
        assert_eq!(refined[0].text, "first part second part");
        assert_eq!(refined[0].words.len(), 4);
        assert!((refined[0].end_seconds - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_refine_keeps_wide_gap_separate() {
        let merged = refinable(&[(0.0, 1.0, 0, "first"), (1.3, 2.0, 0, "second")]);
        let refined = refine_speaker_boundaries(merged, 0.2);
        assert_eq!(refined.len(), 2);
    }

    #[test]
    fn test_refine_keeps_speaker_changes_separate() {
        let merged = refinable(&[(0.0, 1.0, 0, "one"), (1.1, 2.0, 1, "two")]);
        let refined = refine_speaker_boundaries(merged, 0.5);
        assert_eq!(refined.len(), 2);
    }

    #[test]
    fn test_refine_is_idempotent() {
        let merged = refinable(&[
            (0.0, 1.0, 0, "a"),
            (1.2, 2.0, 0, "b"),
            (2.1, 3.0, 1, "c"),
            (4.5, 5.0, 1, "d"),
        ]);

        let once = refine_speaker_boundaries(merged, 0.5);
        let twice = refine_speaker_boundaries(once.clone(), 0.5);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_refine_preserves_words_and_never_grows() {
        let merged = refinable(&[
            (0.0, 1.0, 0, "alpha beta"),
            (1.2, 2.0, 0, "gamma"),
            (2.1, 3.0, 1, "delta"),
        ]);
        let word_count: usize = merged.iter().map(|m| m.words.len()).sum();
        let input_len = merged.len();

        let refined = refine_speaker_boundaries(merged, 0.5);
        assert!(refined.len() <= input_len);

        let refined_words: usize = refined.iter().map(|m| m.words.len()).sum();
        assert_eq!(refined_words, word_count);

        let all_text: Vec<String> = refined
            .iter()
            .flat_map(|m| m.text.split_whitespace().map(str::to_string))
            .collect();
        assert_eq!(all_text, vec!["alpha", "beta", "gamma", "delta"]);
    }

    #[test]
    fn test_refine_empty_input() {
        assert!(refine_speaker_boundaries(Vec::new(), 0.5).is_empty());
    }
}
