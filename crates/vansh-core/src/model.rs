//! Local projection of server-side project documents.
//!
//! Field names follow the backend's JSON documents (`_id`, `chapter_title`,
//! `image_type: "ai" | "manual" | null`) so the same types are used for
//! fetches, pushed chapter sets and `PUT /api/projects/{id}` bodies.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Server-authoritative project status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProjectStatus {
    #[default]
    Created,
    Transcribing,
    Transcribed,
    Writing,
    ChaptersReady,
    /// Set by the backend once bulk illustration finishes.
    ImagesReady,
    Complete,
    /// A status this client does not know yet; kept verbatim.
    Unknown(String),
}

impl ProjectStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Transcribing => "transcribing",
            Self::Transcribed => "transcribed",
            Self::Writing => "writing",
            Self::ChaptersReady => "chapters_ready",
            Self::ImagesReady => "images_ready",
            Self::Complete => "complete",
            Self::Unknown(raw) => raw,
        }
    }

    /// Whether a chapter set is expected to exist in this status.
    pub fn has_chapters(&self) -> bool {
        matches!(
            self,
            Self::ChaptersReady | Self::ImagesReady | Self::Complete
        )
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Created => "Draft",
            Self::Transcribing => "Transcribing",
            Self::Transcribed => "Transcribed",
            Self::Writing => "Drafting",
            Self::ChaptersReady => "Chapters ready",
            Self::ImagesReady => "Illustrated",
            Self::Complete => "Published",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<&str> for ProjectStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "created" => Self::Created,
            "transcribing" => Self::Transcribing,
            "transcribed" => Self::Transcribed,
            "writing" => Self::Writing,
            "chapters_ready" => Self::ChaptersReady,
            "images_ready" => Self::ImagesReady,
            "complete" => Self::Complete,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ProjectStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProjectStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(ProjectStatus::from).unwrap_or_default())
    }
}

/// Where a chapter illustration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageType {
    #[default]
    None,
    AiGenerated,
    UserUploaded,
}

impl ImageType {
    fn wire(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::AiGenerated => Some("ai"),
            Self::UserUploaded => Some("manual"),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::AiGenerated => "ai-generated",
            Self::UserUploaded => "user-uploaded",
        }
    }
}

impl Serialize for ImageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.wire() {
            Some(s) => serializer.serialize_str(s),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for ImageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw.as_deref() {
            Some("ai") | Some("ai-generated") => Self::AiGenerated,
            Some("manual") | Some("user-uploaded") | Some("upload") => Self::UserUploaded,
            _ => Self::None,
        })
    }
}

/// One section of the generated book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    #[serde(rename = "chapter_title", default)]
    pub title: String,
    #[serde(rename = "chapter_summary", default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_type: ImageType,
}

impl Chapter {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            summary: None,
            content: content.into(),
            locked: false,
            image_url: None,
            image_type: ImageType::None,
        }
    }

    /// Paragraphs of the chapter body, split on blank lines.
    pub fn paragraphs(&self) -> Vec<&str> {
        self.content
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect()
    }

    /// Prompt text the backend uses for illustration requests.
    pub fn image_prompt(&self) -> &str {
        match self.summary.as_deref() {
            Some(s) if !s.trim().is_empty() => s,
            _ => &self.title,
        }
    }

    pub fn has_image(&self) -> bool {
        self.image_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

/// How the narrative for a project was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InputType {
    #[default]
    #[serde(rename = "audio")]
    Audio,
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "upload-audio")]
    UploadAudio,
}

impl InputType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Text => "text",
            Self::Video => "video",
            Self::UploadAudio => "upload-audio",
        }
    }
}

impl std::str::FromStr for InputType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(Self::Audio),
            "text" => Ok(Self::Text),
            "video" => Ok(Self::Video),
            "upload-audio" => Ok(Self::UploadAudio),
            other => Err(format!("unknown input type: {other}")),
        }
    }
}

/// Local view of one project document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectView {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub input_type: InputType,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub refined_text: String,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub cover_title: Option<String>,
    #[serde(default)]
    pub cover_subtitle: Option<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing)]
    pub updated_at: Option<NaiveDateTime>,
}

impl ProjectView {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: id.into(),
            cover_title: Some(title.clone()),
            title,
            ..Default::default()
        }
    }

    pub fn chapter(&self, id: &str) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == id)
    }

    pub fn chapter_mut(&mut self, id: &str) -> Option<&mut Chapter> {
        self.chapters.iter_mut().find(|c| c.id == id)
    }

    pub fn chapter_index(&self, id: &str) -> Option<usize> {
        self.chapters.iter().position(|c| c.id == id)
    }

    /// Title to print on the cover, falling back to the project title.
    pub fn display_title(&self) -> &str {
        match self.cover_title.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => &self.title,
        }
    }

    /// Lowercase, dash-separated form of the display title for file names.
    pub fn file_stem(&self) -> String {
        let stem = self
            .display_title()
            .chars()
            .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect::<String>()
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        if stem.is_empty() {
            crate::validate::DEFAULT_PROJECT_TITLE
                .to_ascii_lowercase()
                .replace(' ', "-")
        } else {
            stem
        }
    }

    /// Text the chapter drafter will work from.
    pub fn source_text(&self) -> &str {
        if self.refined_text.trim().is_empty() {
            &self.transcript
        } else {
            &self.refined_text
        }
    }

    pub fn illustrated_count(&self) -> usize {
        self.chapters.iter().filter(|c| c.has_image()).count()
    }
}

/// Signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Backend timestamps are naive ISO strings; anything unparsable is dropped.
fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<NaiveDateTime>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        let s = s.trim_end_matches('Z');
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn project_from_backend_document() {
        let doc = json!({
            "_id": "65f0c0ffee",
            "user_id": "u1",
            "title": "Grandpa",
            "input_type": "upload-audio",
            "status": "chapters_ready",
            "transcript": "raw",
            "refined_text": "refined",
            "chapters": [
                {"id": "c1", "chapter_title": "Early Years", "content": "a\n\nb",
                 "image_url": null, "image_type": null, "locked": false},
                {"id": "c2", "chapter_title": "War", "content": "c",
                 "image_url": "/api/unguided/images/ai_1.jpg", "image_type": "ai", "locked": true}
            ],
            "cover_title": "Grandfather's Journey",
            "cover_subtitle": "",
            "pdf_url": null,
            "created_at": "2024-05-01T10:11:12.123456",
            "updated_at": "not a date"
        });
        let project: ProjectView = serde_json::from_value(doc).unwrap();
        assert_eq!(project.id, "65f0c0ffee");
        assert_eq!(project.input_type, InputType::UploadAudio);
        assert_eq!(project.status, ProjectStatus::ChaptersReady);
        assert_eq!(project.chapters.len(), 2);
        assert_eq!(project.chapters[1].image_type, ImageType::AiGenerated);
        assert!(project.chapters[1].locked);
        assert_eq!(project.chapters[0].paragraphs(), vec!["a", "b"]);
        assert!(project.created_at.is_some());
        assert!(project.updated_at.is_none());
        assert_eq!(project.source_text(), "refined");
    }

    #[test]
    fn unknown_status_is_preserved() {
        let status: ProjectStatus = serde_json::from_value(json!("archived")).unwrap();
        assert_eq!(status, ProjectStatus::Unknown("archived".into()));
        assert_eq!(serde_json::to_value(&status).unwrap(), json!("archived"));
    }

    #[test]
    fn image_type_wire_names() {
        let mut ch = Chapter::new("c1", "T", "body");
        ch.image_type = ImageType::UserUploaded;
        let v = serde_json::to_value(&ch).unwrap();
        assert_eq!(v["image_type"], json!("manual"));
        assert_eq!(v["chapter_title"], json!("T"));
        ch.image_type = ImageType::None;
        let v = serde_json::to_value(&ch).unwrap();
        assert!(v["image_type"].is_null());
    }

    #[test]
    fn display_title_falls_back_to_project_title() {
        let mut p = ProjectView::new("p", "My Story");
        p.cover_title = Some("  ".into());
        assert_eq!(p.display_title(), "My Story");
    }

    #[test]
    fn file_stem_is_file_friendly() {
        let p = ProjectView::new("p", "Grandfather's Journey");
        assert_eq!(p.file_stem(), "grandfather-s-journey");
        let p = ProjectView::new("p", "!!!");
        assert_eq!(p.file_stem(), "untitled-story");
    }
}
