//! Typed push events.
//!
//! The backend emits `progress_update` with a free-form `{stage, data}` pair
//! and `realtime_transcript` fragments. Both are decoded here into closed
//! types; an unrecognised stage becomes [`ProgressEvent::Unknown`] instead of
//! an error so older clients keep working against newer servers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::Chapter;

/// Stage-specific content of a `progress_update`.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Uploading,
    Extracting,
    /// Transcription in progress; may carry the raw (unpolished) transcript.
    Transcribing {
        raw_transcript: Option<String>,
    },
    /// Transcript finalized (and refined).
    Transcribed {
        transcript: Option<String>,
    },
    Refining,
    Writing,
    /// One chapter streamed while the draft is still being assembled.
    ChapterReady {
        chapter: Option<Chapter>,
        index: Option<usize>,
    },
    ChaptersComplete {
        chapters: Vec<Chapter>,
        cover_title: Option<String>,
        cover_subtitle: Option<String>,
    },
    GeneratingImage,
    GeneratingImages,
    ImageReady {
        chapter_id: String,
        image_url: String,
    },
    AllImagesComplete,
    GeneratingPdf,
    PdfReady {
        pdf_url: String,
    },
    Error,
    Unknown(String),
}

impl ProgressEvent {
    /// Decode a raw stage name and its optional `data` object.
    ///
    /// Malformed data for a known stage yields the variant with its optional
    /// fields absent; `image_ready` / `pdf_ready` without their required
    /// fields degrade to `Unknown` so they cannot mutate the projection.
    pub fn from_wire(stage: &str, data: Option<&Value>) -> Self {
        let field = |name: &str| -> Option<String> {
            data.and_then(|d| d.get(name))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        match stage {
            "uploading" => Self::Uploading,
            "extracting" => Self::Extracting,
            "transcribing" => Self::Transcribing {
                raw_transcript: field("raw_transcript"),
            },
            "transcribed" => Self::Transcribed {
                transcript: field("transcript"),
            },
            "refining" => Self::Refining,
            "writing" => Self::Writing,
            "chapter_ready" => Self::ChapterReady {
                chapter: data
                    .and_then(|d| d.get("chapter"))
                    .and_then(|c| serde_json::from_value(c.clone()).ok()),
                index: data
                    .and_then(|d| d.get("index"))
                    .and_then(Value::as_u64)
                    .map(|i| i as usize),
            },
            "chapters_complete" => Self::ChaptersComplete {
                chapters: data
                    .and_then(|d| d.get("chapters"))
                    .map(decode_chapters)
                    .unwrap_or_default(),
                cover_title: field("cover_title"),
                cover_subtitle: field("cover_subtitle"),
            },
            "generating_image" => Self::GeneratingImage,
            "generating_images" => Self::GeneratingImages,
            "image_ready" => match (field("chapter_id"), field("image_url")) {
                (Some(chapter_id), Some(image_url)) => Self::ImageReady {
                    chapter_id,
                    image_url,
                },
                _ => Self::Unknown(stage.to_string()),
            },
            "all_images_complete" => Self::AllImagesComplete,
            "generating_pdf" => Self::GeneratingPdf,
            "pdf_ready" => match field("pdf_url") {
                Some(pdf_url) => Self::PdfReady { pdf_url },
                None => Self::Unknown(stage.to_string()),
            },
            "error" => Self::Error,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Stage name as it appears on the wire.
    pub fn stage(&self) -> &str {
        match self {
            Self::Uploading => "uploading",
            Self::Extracting => "extracting",
            Self::Transcribing { .. } => "transcribing",
            Self::Transcribed { .. } => "transcribed",
            Self::Refining => "refining",
            Self::Writing => "writing",
            Self::ChapterReady { .. } => "chapter_ready",
            Self::ChaptersComplete { .. } => "chapters_complete",
            Self::GeneratingImage => "generating_image",
            Self::GeneratingImages => "generating_images",
            Self::ImageReady { .. } => "image_ready",
            Self::AllImagesComplete => "all_images_complete",
            Self::GeneratingPdf => "generating_pdf",
            Self::PdfReady { .. } => "pdf_ready",
            Self::Error => "error",
            Self::Unknown(raw) => raw,
        }
    }

    /// Events that end a server-side job.
    pub fn ends_job(&self) -> bool {
        matches!(
            self,
            Self::ChaptersComplete { .. } | Self::AllImagesComplete | Self::PdfReady { .. }
        )
    }
}

/// Chapters that fail to decode individually are skipped rather than
/// discarding the whole set.
fn decode_chapters(value: &Value) -> Vec<Chapter> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|c| match serde_json::from_value::<Chapter>(c.clone()) {
                    Ok(ch) => Some(ch),
                    Err(e) => {
                        log::warn!("dropping undecodable chapter in chapters_complete: {e}");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Raw `progress_update` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressWire {
    pub project_id: String,
    pub stage: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// A decoded `progress_update`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub project_id: String,
    /// `None` when the server did not send a percentage.
    pub percent: Option<u8>,
    pub message: String,
    pub event: ProgressEvent,
}

impl ProgressUpdate {
    pub fn new(project_id: impl Into<String>, percent: u8, message: impl Into<String>, event: ProgressEvent) -> Self {
        Self {
            project_id: project_id.into(),
            percent: Some(percent.min(100)),
            message: message.into(),
            event,
        }
    }

    pub fn from_wire(wire: ProgressWire) -> Self {
        let event = ProgressEvent::from_wire(&wire.stage, wire.data.as_ref());
        Self {
            project_id: wire.project_id,
            percent: wire
                .progress
                .filter(|p| p.is_finite())
                .map(|p| p.clamp(0.0, 100.0).round() as u8),
            message: wire.message.unwrap_or_default(),
            event,
        }
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value::<ProgressWire>(value).map(Self::from_wire)
    }
}

/// Word-level live transcript fragment (`realtime_transcript`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptFragment {
    pub project_id: String,
    pub transcript: String,
    #[serde(default)]
    pub is_final: bool,
}

/// Anything the server pushes to a project room.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Progress(ProgressUpdate),
    Transcript(TranscriptFragment),
}

impl PushEvent {
    pub const PROGRESS: &'static str = "progress_update";
    pub const TRANSCRIPT: &'static str = "realtime_transcript";

    /// Decode a named Socket.IO event. Returns `Ok(None)` for event names this
    /// client does not subscribe to.
    pub fn decode(name: &str, payload: Value) -> Result<Option<Self>, serde_json::Error> {
        match name {
            Self::PROGRESS => ProgressUpdate::from_value(payload).map(|u| Some(Self::Progress(u))),
            Self::TRANSCRIPT => {
                serde_json::from_value(payload).map(|f| Some(Self::Transcript(f)))
            }
            _ => Ok(None),
        }
    }

    pub fn project_id(&self) -> &str {
        match self {
            Self::Progress(u) => &u.project_id,
            Self::Transcript(f) => &f.project_id,
        }
    }
}

/// Messages the client emits on the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    JoinProject { project_id: String },
    LeaveProject { project_id: String },
    StartTranscription { project_id: String },
    StopTranscription { project_id: String },
    AudioChunk(Vec<u8>),
}

impl ClientMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::JoinProject { .. } => "join_project",
            Self::LeaveProject { .. } => "leave_project",
            Self::StartTranscription { .. } => "start_transcription",
            Self::StopTranscription { .. } => "stop_transcription",
            Self::AudioChunk(_) => "audio_chunk",
        }
    }

    /// JSON payload; `None` for binary messages.
    pub fn json_payload(&self) -> Option<Value> {
        match self {
            Self::JoinProject { project_id }
            | Self::LeaveProject { project_id }
            | Self::StartTranscription { project_id }
            | Self::StopTranscription { project_id } => {
                Some(serde_json::json!({ "project_id": project_id }))
            }
            Self::AudioChunk(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_transcribing_with_snippet() {
        let u = ProgressUpdate::from_value(json!({
            "project_id": "p1", "stage": "transcribing", "progress": 90,
            "message": "Transcription done", "data": {"raw_transcript": "Hello"}
        }))
        .unwrap();
        assert_eq!(u.percent, Some(90));
        assert_eq!(
            u.event,
            ProgressEvent::Transcribing {
                raw_transcript: Some("Hello".into())
            }
        );
    }

    #[test]
    fn unknown_stage_is_kept_verbatim() {
        let u = ProgressUpdate::from_value(json!({
            "project_id": "p1", "stage": "teleporting", "progress": 12.6, "message": "?"
        }))
        .unwrap();
        assert_eq!(u.event, ProgressEvent::Unknown("teleporting".into()));
        assert_eq!(u.event.stage(), "teleporting");
        assert_eq!(u.percent, Some(13));
    }

    #[test]
    fn out_of_range_percent_is_clamped() {
        let u = ProgressUpdate::from_value(json!({
            "project_id": "p1", "stage": "writing", "progress": 250
        }))
        .unwrap();
        assert_eq!(u.percent, Some(100));
        assert_eq!(u.message, "");
    }

    #[test]
    fn image_ready_without_chapter_id_degrades() {
        let e = ProgressEvent::from_wire("image_ready", Some(&json!({"image_url": "x"})));
        assert_eq!(e, ProgressEvent::Unknown("image_ready".into()));
    }

    #[test]
    fn chapters_complete_skips_bad_chapters() {
        let data = json!({
            "chapters": [
                {"id": "c1", "chapter_title": "One", "content": "x"},
                {"chapter_title": "missing id"},
            ],
            "cover_title": "Title",
        });
        match ProgressEvent::from_wire("chapters_complete", Some(&data)) {
            ProgressEvent::ChaptersComplete {
                chapters,
                cover_title,
                cover_subtitle,
            } => {
                assert_eq!(chapters.len(), 1);
                assert_eq!(cover_title.as_deref(), Some("Title"));
                assert!(cover_subtitle.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn push_event_dispatch_by_name() {
        let e = PushEvent::decode(
            "realtime_transcript",
            json!({"project_id": "p", "transcript": "hi", "is_final": true}),
        )
        .unwrap()
        .unwrap();
        assert_eq!(e.project_id(), "p");
        assert!(PushEvent::decode("something_else", json!({})).unwrap().is_none());
    }

    #[test]
    fn client_message_payloads() {
        let m = ClientMessage::JoinProject {
            project_id: "p9".into(),
        };
        assert_eq!(m.event_name(), "join_project");
        assert_eq!(m.json_payload().unwrap(), json!({"project_id": "p9"}));
        assert!(ClientMessage::AudioChunk(vec![1, 2]).json_payload().is_none());
    }
}
