//! MeetScribe Worker Process
//!
//! Runs the diarization/fusion/resolution pipeline in an isolated process
//! so heavy model memory never lives inside the caller.
//!
//! Communication is via JSON over stdin/stdout; logs go to stderr.

use anyhow::{Context, Result};
use meetscribe_ml::{process_meeting, DiarizationOptions, PipelineOptions};
use meetscribe_types::{
    MeetingIdentity, TranscriptDocument, TranscriptSegment, WorkerCommand, WorkerResponse,
};
use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    // Initialize tracing to stderr (stdout is for IPC)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    tracing::info!("MeetScribe worker starting");

    if let Err(e) = run_worker() {
        tracing::error!("Worker error: {}", e);
        std::process::exit(1);
    }
}

fn run_worker() -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    tracing::info!("Worker ready, listening for commands");

    for line in stdin.lock().lines() {
        let line = line?;

        if line.is_empty() {
            continue;
        }

        let command: WorkerCommand = match serde_json::from_str(&line) {
            Ok(cmd) => cmd,
            Err(e) => {
                let response = WorkerResponse::Error {
                    message: format!("Invalid command: {}", e),
                };
                writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
                stdout.flush()?;
                continue;
            }
        };

        let shutdown = matches!(command, WorkerCommand::Shutdown);
        let response = handle_command(command);

        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;

        if shutdown {
            break;
        }
    }

    tracing::info!("Worker shutting down");
    Ok(())
}

fn handle_command(command: WorkerCommand) -> WorkerResponse {
    match command {
        WorkerCommand::Diarize {
            audio_path,
            num_speakers,
            mode,
        } => {
            tracing::info!("Diarizing {} (mode {:?})", audio_path, mode);

            let clip = match meetscribe_audio::load_audio_file(&audio_path) {
                Ok(clip) => clip,
                Err(e) => {
                    return WorkerResponse::Error {
                        message: e.to_string(),
                    }
                }
            };

            let options = DiarizationOptions {
                mode,
                num_speakers,
                models_dir: None,
            };

            match meetscribe_ml::diarize_meeting_audio(&clip, &options) {
                Ok(segments) => {
                    let num_speakers = segments
                        .iter()
                        .map(|s| s.speaker.as_str().to_string())
                        .collect::<BTreeSet<_>>()
                        .len();
                    WorkerResponse::Diarization {
                        segments,
                        num_speakers,
                    }
                }
                Err(e) => WorkerResponse::Error {
                    message: e.to_string(),
                },
            }
        }

        WorkerCommand::ProcessMeeting {
            audio_path,
            transcript_path,
            meeting_id,
            title,
            participants,
            num_speakers,
            mode,
        } => {
            let meeting = MeetingIdentity {
                id: meeting_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                title,
            };
            tracing::info!("Processing meeting {} from {}", meeting.id, audio_path);

            let clip = match meetscribe_audio::load_audio_file(&audio_path) {
                Ok(clip) => clip,
                Err(e) => {
                    return WorkerResponse::Error {
                        message: e.to_string(),
                    }
                }
            };

            let transcript = match load_transcript(&transcript_path) {
                Ok(segments) => segments,
                Err(e) => {
                    return WorkerResponse::Error {
                        message: format!("{:#}", e),
                    }
                }
            };

            let options = PipelineOptions {
                diarization: DiarizationOptions {
                    mode,
                    num_speakers,
                    models_dir: None,
                },
                ..Default::default()
            };

            match process_meeting(&clip, &transcript, &meeting, participants.as_deref(), &options) {
                Ok(transcript) => WorkerResponse::Meeting { transcript },
                Err(e) => WorkerResponse::Error {
                    message: format!("{:#}", e),
                },
            }
        }

        WorkerCommand::Shutdown => {
            tracing::info!("Shutdown command received");
            WorkerResponse::Ok
        }
    }
}

/// Read an ASR transcript file: either a bare segment array or a full
/// transcript document with a `segments` field
fn load_transcript(path: &str) -> Result<Vec<TranscriptSegment>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript: {}", path))?;

    if let Ok(segments) = serde_json::from_str::<Vec<TranscriptSegment>>(&content) {
        return Ok(segments);
    }

    let document: TranscriptDocument =
        serde_json::from_str(&content).context("Failed to parse transcript")?;
    Ok(document.segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_transcript_bare_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        std::fs::write(
            &path,
            r#"[{"start": 0.0, "end": 1.5, "text": "hello", "no_speech_prob": 0.1}]"#,
        )
        .unwrap();

        let segments = load_transcript(path.to_str().unwrap()).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "hello");
        assert!((segments[0].no_speech_prob - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_load_transcript_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        std::fs::write(
            &path,
            r#"{"language": "en", "duration": 2.0, "segments": [
                {"start": 0.0, "end": 2.0, "text": "hi there",
                 "words": [{"word": "hi", "start": 0.0, "end": 1.0, "probability": 0.9},
                           {"word": "there", "start": 1.0, "end": 2.0, "probability": 0.8}]}
            ]}"#,
        )
        .unwrap();

        let segments = load_transcript(path.to_str().unwrap()).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].words.len(), 2);
    }

    #[test]
    fn test_malformed_command_reports_error() {
        let response = match serde_json::from_str::<WorkerCommand>("{\"type\":\"Nope\"}") {
            Ok(_) => panic!("should not parse"),
            Err(e) => WorkerResponse::Error {
                message: format!("Invalid command: {}", e),
            },
        };
        match response {
            WorkerResponse::Error { message } => assert!(message.contains("Invalid command")),
            _ => panic!("expected error response"),
        }
    }
}
