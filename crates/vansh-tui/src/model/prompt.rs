/// What a single-line prompt collects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptKind {
    ProjectTitle,
    /// Confirm deletion by typing `y`.
    ConfirmDelete { project_id: String, title: String },
    NarrativeText,
    AudioPath,
    VideoPath,
    ChapterTitle { chapter_id: String },
    CoverTitle,
    ImagePath { chapter_id: String },
    DownloadPath { url: String },
}

impl PromptKind {
    pub fn title(&self) -> String {
        match self {
            Self::ProjectTitle => "New story title".to_string(),
            Self::ConfirmDelete { title, .. } => format!("Delete \"{title}\"? (y/N)"),
            Self::NarrativeText => "Tell the story (at least 50 characters)".to_string(),
            Self::AudioPath => "Audio file (wav mp3 webm ogg m4a flac)".to_string(),
            Self::VideoPath => "Video file (mp4 mov avi mkv webm)".to_string(),
            Self::ChapterTitle { .. } => "Chapter title".to_string(),
            Self::CoverTitle => "Cover title".to_string(),
            Self::ImagePath { .. } => "Image file (jpg png gif webp)".to_string(),
            Self::DownloadPath { .. } => "Save PDF to".to_string(),
        }
    }
}

/// A one-line text prompt shown as a popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub kind: PromptKind,
    pub buffer: String,
}

impl Prompt {
    pub fn new(kind: PromptKind) -> Self {
        Self {
            kind,
            buffer: String::new(),
        }
    }

    pub fn with_value(kind: PromptKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            buffer: value.into(),
        }
    }
}
