//! Speaker name resolution
//!
//! Maps per-run `SPEAKER_<n>` labels to participant display names using an
//! ordered chain of sources; the first source returning a non-empty result
//! wins and later sources are never queried. A source error is logged and
//! treated as empty so the chain keeps going — resolution can leave labels
//! unresolved (a reported state) but never fails the pipeline.

use anyhow::{Context, Result};
use chrono::{Duration, SecondsFormat, Utc};
use meetscribe_types::{MappingStatus, MeetingIdentity, MergedSegment, SpeakerLabel, SpeakerMapping};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

/// Hard cap on any single source lookup; sources must never block forever
const SOURCE_TIMEOUT: StdDuration = StdDuration::from_secs(10);

pub const ZOOM_TOKEN_ENV: &str = "ZOOM_ACCESS_TOKEN";
pub const TEAMS_TOKEN_ENV: &str = "TEAMS_ACCESS_TOKEN";

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const ZOOM_API_BASE: &str = "https://api.zoom.us/v2";
const TEAMS_API_BASE: &str = "https://graph.microsoft.com/v1.0";

/// One provider of participant names
///
/// Tagged variants rather than a trait hierarchy: the resolver is a fold
/// over an ordered list of these.
#[derive(Debug, Clone)]
pub enum ParticipantSource {
    /// Participant list captured out-of-band by the recording bot
    BotCapture { captures_dir: PathBuf },
    /// Calendar event attendees matched by meeting title in a time window
    Calendar {
        token_path: PathBuf,
        api_base: String,
        window_days: i64,
    },
    /// Meeting-platform participant APIs (Zoom first, then Teams)
    PlatformApi {
        zoom_api_base: String,
        teams_api_base: String,
    },
    /// Operator-supplied comma-separated names
    Manual { participants: String },
}

/// The priority-ordered default chain
pub fn default_source_chain(manual_participants: Option<&str>) -> Vec<ParticipantSource> {
    let mut sources = vec![
        ParticipantSource::BotCapture {
            captures_dir: PathBuf::from("data/bot_captures"),
        },
        ParticipantSource::Calendar {
            token_path: PathBuf::from("tokens/google_calendar_token.json"),
            api_base: CALENDAR_API_BASE.to_string(),
            window_days: 7,
        },
        ParticipantSource::PlatformApi {
            zoom_api_base: ZOOM_API_BASE.to_string(),
            teams_api_base: TEAMS_API_BASE.to_string(),
        },
    ];

    if let Some(participants) = manual_participants {
        sources.push(ParticipantSource::Manual {
            participants: participants.to_string(),
        });
    }

    sources
}

impl ParticipantSource {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BotCapture { .. } => "bot capture",
            Self::Calendar { .. } => "calendar",
            Self::PlatformApi { .. } => "platform API",
            Self::Manual { .. } => "manual list",
        }
    }

    /// Participant names in display order, or `None` when the source has
    /// nothing for this meeting
    fn fetch_names(&self, meeting: &MeetingIdentity) -> Result<Option<Vec<String>>> {
        match self {
            Self::BotCapture { captures_dir } => fetch_bot_capture(captures_dir, &meeting.id),
            Self::Calendar {
                token_path,
                api_base,
                window_days,
            } => fetch_calendar_attendees(token_path, api_base, *window_days, &meeting.title),
            Self::PlatformApi {
                zoom_api_base,
                teams_api_base,
            } => {
                if let Some(names) = fetch_zoom_participants(zoom_api_base, &meeting.id)? {
                    return Ok(Some(names));
                }
                fetch_teams_participants(teams_api_base, &meeting.id)
            }
            Self::Manual { participants } => {
                let names: Vec<String> = participants
                    .split(',')
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .collect();
                Ok(if names.is_empty() { None } else { Some(names) })
            }
        }
    }
}

// ============================================================================
// Source implementations
// ============================================================================

fn fetch_bot_capture(captures_dir: &Path, meeting_id: &str) -> Result<Option<Vec<String>>> {
    if meeting_id.is_empty() {
        return Ok(None);
    }

    let path = captures_dir.join(format!("{}_participants.json", meeting_id));
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read bot capture: {}", path.display()))?;
    let names: Vec<String> =
        serde_json::from_str(&content).context("Failed to parse bot capture")?;

    if names.is_empty() {
        return Ok(None);
    }

    tracing::info!("Loaded {} participants from bot capture", names.len());
    Ok(Some(names))
}

#[derive(Deserialize)]
struct GoogleToken {
    token: String,
}

#[derive(Deserialize)]
struct CalendarEvents {
    #[serde(default)]
    items: Vec<CalendarEvent>,
}

#[derive(Deserialize)]
struct CalendarEvent {
    #[serde(default)]
    attendees: Vec<CalendarAttendee>,
}

#[derive(Deserialize)]
struct CalendarAttendee {
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    email: Option<String>,
}

fn fetch_calendar_attendees(
    token_path: &Path,
    api_base: &str,
    window_days: i64,
    title: &str,
) -> Result<Option<Vec<String>>> {
    if title.is_empty() || !token_path.exists() {
        return Ok(None);
    }

    let token: GoogleToken = serde_json::from_str(
        &std::fs::read_to_string(token_path).context("Failed to read calendar token")?,
    )
    .context("Failed to parse calendar token")?;

    let now = Utc::now();
    let time_min = (now - Duration::days(window_days)).to_rfc3339_opts(SecondsFormat::Secs, true);
    let time_max = (now + Duration::days(1)).to_rfc3339_opts(SecondsFormat::Secs, true);

    let response = http_client()?
        .get(format!("{}/calendars/primary/events", api_base))
        .bearer_auth(&token.token)
        .query(&[
            ("timeMin", time_min.as_str()),
            ("timeMax", time_max.as_str()),
            ("q", title),
            ("singleEvents", "true"),
            ("orderBy", "startTime"),
            ("maxResults", "10"),
        ])
        .send()
        .context("Calendar request failed")?;

    if !response.status().is_success() {
        tracing::warn!("Calendar API error: {}", response.status());
        return Ok(None);
    }

    let events: CalendarEvents = response.json().context("Failed to parse calendar events")?;

    let Some(event) = events.items.iter().find(|e| !e.attendees.is_empty()) else {
        tracing::debug!("No matching calendar event with attendees");
        return Ok(None);
    };

    let names: Vec<String> = event
        .attendees
        .iter()
        .map(|attendee| {
            attendee
                .display_name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| {
                    name_from_email(attendee.email.as_deref().unwrap_or("unknown"))
                })
        })
        .collect();

    tracing::info!("Mapped {} attendees from calendar", names.len());
    Ok(Some(names))
}

#[derive(Deserialize)]
struct ZoomParticipants {
    #[serde(default)]
    participants: Vec<ZoomParticipant>,
}

#[derive(Deserialize)]
struct ZoomParticipant {
    name: Option<String>,
}

fn fetch_zoom_participants(api_base: &str, meeting_id: &str) -> Result<Option<Vec<String>>> {
    let Ok(token) = std::env::var(ZOOM_TOKEN_ENV) else {
        return Ok(None);
    };
    if token.is_empty() {
        return Ok(None);
    }

    // Zoom ids are numeric, optionally dash-grouped
    if meeting_id.is_empty() || !meeting_id.replace('-', "").chars().all(|c| c.is_ascii_digit()) {
        tracing::debug!("Meeting id is not a Zoom meeting id");
        return Ok(None);
    }

    let response = http_client()?
        .get(format!(
            "{}/past_meetings/{}/participants",
            api_base, meeting_id
        ))
        .bearer_auth(&token)
        .send()
        .context("Zoom request failed")?;

    if !response.status().is_success() {
        tracing::warn!("Zoom API error: {}", response.status());
        return Ok(None);
    }

    let data: ZoomParticipants = response.json().context("Failed to parse Zoom participants")?;
    if data.participants.is_empty() {
        return Ok(None);
    }

    let names: Vec<String> = data
        .participants
        .iter()
        .enumerate()
        .map(|(i, p)| {
            p.name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| format!("Participant {}", i + 1))
        })
        .collect();

    tracing::info!("Retrieved {} participants from Zoom", names.len());
    Ok(Some(names))
}

#[derive(Deserialize)]
struct TeamsMeeting {
    #[serde(default)]
    participants: TeamsParticipants,
}

#[derive(Deserialize, Default)]
struct TeamsParticipants {
    #[serde(default)]
    attendees: Vec<TeamsAttendee>,
}

#[derive(Deserialize)]
struct TeamsAttendee {
    #[serde(default)]
    identity: TeamsIdentity,
}

#[derive(Deserialize, Default)]
struct TeamsIdentity {
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

fn fetch_teams_participants(api_base: &str, meeting_id: &str) -> Result<Option<Vec<String>>> {
    let Ok(token) = std::env::var(TEAMS_TOKEN_ENV) else {
        return Ok(None);
    };
    if token.is_empty() || meeting_id.is_empty() {
        return Ok(None);
    }

    let response = http_client()?
        .get(format!("{}/me/onlineMeetings/{}", api_base, meeting_id))
        .bearer_auth(&token)
        .send()
        .context("Teams request failed")?;

    if !response.status().is_success() {
        tracing::warn!("Teams API error: {}", response.status());
        return Ok(None);
    }

    let meeting: TeamsMeeting = response.json().context("Failed to parse Teams meeting")?;
    if meeting.participants.attendees.is_empty() {
        return Ok(None);
    }

    let names: Vec<String> = meeting
        .participants
        .attendees
        .iter()
        .enumerate()
        .map(|(i, attendee)| {
            attendee
                .identity
                .display_name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| format!("Participant {}", i + 1))
        })
        .collect();

    tracing::info!("Retrieved {} participants from Teams", names.len());
    Ok(Some(names))
}

fn http_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(SOURCE_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// `alice.smith@example.com` -> `Alice Smith`
fn name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    local
        .split('.')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Resolution
// ============================================================================

/// Result of one resolution pass
#[derive(Debug, Clone)]
pub struct SpeakerResolution {
    pub mapping: SpeakerMapping,
    pub status: MappingStatus,
    /// Which source produced the mapping, for operator display
    pub source: Option<&'static str>,
}

/// Fold over the source chain, stopping at the first non-empty result
///
/// Names are paired with candidate labels positionally, in first-seen label
/// order. A source yielding fewer names than labels produces a partial
/// mapping; the unresolved labels are surfaced for manual completion.
pub fn resolve_with_sources(
    sources: &[ParticipantSource],
    meeting: &MeetingIdentity,
    candidate_labels: &[SpeakerLabel],
) -> SpeakerResolution {
    let mut mapping = SpeakerMapping::new();
    let mut chosen = None;

    for source in sources {
        match source.fetch_names(meeting) {
            Ok(Some(names)) if !names.is_empty() => {
                tracing::info!(
                    "Resolved {} participant names from {}",
                    names.len(),
                    source.name()
                );
                mapping = SpeakerMapping::from_positional(candidate_labels, &names);
                chosen = Some(source.name());
                break;
            }
            Ok(_) => {
                tracing::debug!("Participant source {} returned nothing", source.name());
            }
            Err(e) => {
                tracing::warn!("Participant source {} failed: {}", source.name(), e);
            }
        }
    }

    let status = if mapping.is_complete_for(candidate_labels) {
        MappingStatus::Complete
    } else {
        let unresolved = mapping.unresolved_labels(candidate_labels);
        tracing::warn!(
            "Speaker mapping incomplete: {} of {} labels unresolved",
            unresolved.len(),
            candidate_labels.len()
        );
        MappingStatus::Partial { unresolved }
    };

    SpeakerResolution {
        mapping,
        status,
        source: chosen,
    }
}

/// Resolve names for a meeting through the default source chain
pub fn resolve_speaker_names(
    meeting: &MeetingIdentity,
    candidate_labels: &[SpeakerLabel],
    manual_participants: Option<&str>,
) -> SpeakerResolution {
    resolve_with_sources(
        &default_source_chain(manual_participants),
        meeting,
        candidate_labels,
    )
}

/// Substitute display names into the timeline
///
/// Runs only for a complete mapping; until then (and for any label without
/// an entry) segments keep their `SPEAKER_<n>` form.
pub fn apply_speaker_mapping(
    mut segments: Vec<MergedSegment>,
    resolution: &SpeakerResolution,
) -> Vec<MergedSegment> {
    if !resolution.status.is_complete() {
        tracing::info!("Speaker mapping incomplete; keeping raw labels");
        return segments;
    }

    for segment in &mut segments {
        let label = SpeakerLabel::from(segment.speaker.as_str());
        if let Some(name) = resolution.mapping.get(&label) {
            segment.speaker = name.to_string();
        }
    }

    segments
}

/// Speaker labels present in the timeline, in first-seen order
pub fn candidate_labels(segments: &[MergedSegment]) -> Vec<SpeakerLabel> {
    let mut labels: Vec<SpeakerLabel> = Vec::new();
    for segment in segments {
        let label = SpeakerLabel::from(segment.speaker.as_str());
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels
}
