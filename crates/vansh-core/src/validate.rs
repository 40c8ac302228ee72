//! Client-side checks run before any request leaves the machine.
//!
//! Limits mirror what the backend enforces so a rejected upload never costs
//! a round trip.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

pub const MAX_AUDIO_BYTES: u64 = 50 * 1024 * 1024;
pub const MAX_VIDEO_BYTES: u64 = 500 * 1024 * 1024;
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;
pub const MIN_NARRATIVE_CHARS: usize = 50;
pub const MIN_PASSWORD_CHARS: usize = 6;
pub const DEFAULT_PROJECT_TITLE: &str = "Untitled Story";

const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "webm", "ogg", "m4a", "flac"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

static EMAIL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unsupported {kind} format '.{extension}' (expected one of: {allowed})")]
    UnsupportedFormat {
        kind: MediaKind,
        extension: String,
        allowed: String,
    },
    #[error("{kind} file is {size} bytes, the limit is {limit} bytes")]
    TooLarge {
        kind: MediaKind,
        size: u64,
        limit: u64,
    },
    #[error("{kind} file is empty")]
    Empty { kind: MediaKind },
    #[error("story text must be at least 50 characters (got {0})")]
    NarrativeTooShort(usize),
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    #[error("password must be at least 6 characters")]
    WeakPassword,
    #[error("name cannot be empty")]
    EmptyName,
}

/// Kind of media file accepted by an upload endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
    Image,
}

impl MediaKind {
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Audio => AUDIO_EXTENSIONS,
            Self::Video => VIDEO_EXTENSIONS,
            Self::Image => IMAGE_EXTENSIONS,
        }
    }

    pub fn max_bytes(self) -> u64 {
        match self {
            Self::Audio => MAX_AUDIO_BYTES,
            Self::Video => MAX_VIDEO_BYTES,
            Self::Image => MAX_IMAGE_BYTES,
        }
    }

    /// MIME type sent with a multipart part of this kind.
    pub fn mime_for(self, extension: &str) -> &'static str {
        match (self, extension) {
            (Self::Audio, "wav") => "audio/wav",
            (Self::Audio, "mp3") => "audio/mpeg",
            (Self::Audio, "ogg") => "audio/ogg",
            (Self::Audio, "m4a") => "audio/mp4",
            (Self::Audio, "flac") => "audio/flac",
            (Self::Audio, _) => "audio/webm",
            (Self::Video, "mov") => "video/quicktime",
            (Self::Video, "avi") => "video/x-msvideo",
            (Self::Video, "mkv") => "video/x-matroska",
            (Self::Video, "webm") => "video/webm",
            (Self::Video, _) => "video/mp4",
            (Self::Image, "png") => "image/png",
            (Self::Image, "gif") => "image/gif",
            (Self::Image, "webp") => "image/webp",
            (Self::Image, _) => "image/jpeg",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Image => "image",
        })
    }
}

/// Lower-cased extension of `path`, empty if it has none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Check a media file's extension and size. Returns the normalized extension.
pub fn media_file(kind: MediaKind, path: &Path, size: u64) -> Result<String, ValidationError> {
    let extension = extension_of(path);
    if !kind.extensions().contains(&extension.as_str()) {
        return Err(ValidationError::UnsupportedFormat {
            kind,
            extension,
            allowed: kind.extensions().join(", "),
        });
    }
    if size == 0 {
        return Err(ValidationError::Empty { kind });
    }
    if size > kind.max_bytes() {
        return Err(ValidationError::TooLarge {
            kind,
            size,
            limit: kind.max_bytes(),
        });
    }
    Ok(extension)
}

pub fn narrative(text: &str) -> Result<&str, ValidationError> {
    let trimmed = text.trim();
    let chars = trimmed.chars().count();
    if chars < MIN_NARRATIVE_CHARS {
        return Err(ValidationError::NarrativeTooShort(chars));
    }
    Ok(trimmed)
}

pub fn email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_ascii_lowercase();
    if EMAIL_RE.as_ref().is_some_and(|re| re.is_match(&email)) {
        Ok(email)
    } else {
        Err(ValidationError::InvalidEmail(raw.trim().to_string()))
    }
}

pub fn password(raw: &str) -> Result<(), ValidationError> {
    if raw.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ValidationError::WeakPassword);
    }
    Ok(())
}

/// Validate a sign-up form, returning the normalized email.
pub fn registration(email_raw: &str, password_raw: &str, name: &str) -> Result<String, ValidationError> {
    let email = email(email_raw)?;
    password(password_raw)?;
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(email)
}

pub fn project_title(raw: &str) -> String {
    match raw.trim() {
        "" => DEFAULT_PROJECT_TITLE.to_string(),
        t => t.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_extensions_and_limits() {
        assert_eq!(
            media_file(MediaKind::Audio, Path::new("story.MP3"), 1024).unwrap(),
            "mp3"
        );
        assert!(matches!(
            media_file(MediaKind::Audio, Path::new("story.txt"), 1024),
            Err(ValidationError::UnsupportedFormat { .. })
        ));
        assert_eq!(
            media_file(MediaKind::Audio, Path::new("long.wav"), MAX_AUDIO_BYTES + 1),
            Err(ValidationError::TooLarge {
                kind: MediaKind::Audio,
                size: MAX_AUDIO_BYTES + 1,
                limit: MAX_AUDIO_BYTES,
            })
        );
        assert_eq!(
            media_file(MediaKind::Audio, Path::new("silence.wav"), 0),
            Err(ValidationError::Empty {
                kind: MediaKind::Audio
            })
        );
    }

    #[test]
    fn image_limit_is_ten_megabytes() {
        assert!(media_file(MediaKind::Image, Path::new("a.png"), MAX_IMAGE_BYTES).is_ok());
        assert!(media_file(MediaKind::Image, Path::new("a.png"), MAX_IMAGE_BYTES + 1).is_err());
        assert!(media_file(MediaKind::Image, Path::new("noext"), 10).is_err());
    }

    #[test]
    fn webm_is_both_audio_and_video() {
        assert!(media_file(MediaKind::Audio, Path::new("rec.webm"), 5).is_ok());
        assert!(media_file(MediaKind::Video, Path::new("rec.webm"), 5).is_ok());
        assert_eq!(MediaKind::Video.mime_for("mov"), "video/quicktime");
    }

    #[test]
    fn narrative_needs_fifty_chars_after_trim() {
        let short = format!("   {}   ", "a".repeat(49));
        assert_eq!(narrative(&short), Err(ValidationError::NarrativeTooShort(49)));
        let ok = "b".repeat(50);
        assert_eq!(narrative(&ok).unwrap().len(), 50);
    }

    #[test]
    fn registration_checks() {
        assert_eq!(
            registration(" Ravi@Example.com ", "secret", "Ravi").unwrap(),
            "ravi@example.com"
        );
        assert_eq!(
            registration("ravi", "secret", "Ravi"),
            Err(ValidationError::InvalidEmail("ravi".into()))
        );
        assert_eq!(
            registration("r@e.io", "12345", "Ravi"),
            Err(ValidationError::WeakPassword)
        );
        assert_eq!(
            registration("r@e.io", "123456", "  "),
            Err(ValidationError::EmptyName)
        );
    }

    #[test]
    fn blank_title_defaults() {
        assert_eq!(project_title("  "), "Untitled Story");
        assert_eq!(project_title(" Nani "), "Nani");
    }
}
