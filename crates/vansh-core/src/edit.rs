//! User-driven chapter curation operations.
//!
//! Edits are applied to a [`ProjectView`] optimistically by the projector and
//! then sent to the server as a full chapter set; see
//! [`ProgressProjector::apply_edit`](crate::projector::ProgressProjector::apply_edit).

use thiserror::Error;

use crate::model::{ImageType, ProjectView};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("no project is open")]
    NoProject,
    #[error("chapter {0} not found")]
    ChapterNotFound(String),
    #[error("chapter {0} is locked")]
    Locked(String),
    #[error("chapter title cannot be empty")]
    EmptyTitle,
    #[error("position {to} is out of range for {len} chapters")]
    OutOfRange { to: usize, len: usize },
}

/// A single curation step on the open project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterEdit {
    UpdateText {
        chapter_id: String,
        title: Option<String>,
        content: Option<String>,
    },
    SetLocked {
        chapter_id: String,
        locked: bool,
    },
    Delete {
        chapter_id: String,
    },
    /// Move a chapter to position `to` in the final order.
    Move {
        chapter_id: String,
        to: usize,
    },
    /// Attach an image the user uploaded.
    AttachImage {
        chapter_id: String,
        image_url: String,
    },
    ClearImage {
        chapter_id: String,
    },
    Cover {
        title: Option<String>,
        subtitle: Option<String>,
    },
}

impl ChapterEdit {
    pub fn chapter_id(&self) -> Option<&str> {
        match self {
            Self::UpdateText { chapter_id, .. }
            | Self::SetLocked { chapter_id, .. }
            | Self::Delete { chapter_id }
            | Self::Move { chapter_id, .. }
            | Self::AttachImage { chapter_id, .. }
            | Self::ClearImage { chapter_id } => Some(chapter_id),
            Self::Cover { .. } => None,
        }
    }

    /// Whether the edit is refused on a locked chapter. Locking, unlocking
    /// and reordering stay available.
    fn blocked_by_lock(&self) -> bool {
        matches!(
            self,
            Self::UpdateText { .. }
                | Self::Delete { .. }
                | Self::AttachImage { .. }
                | Self::ClearImage { .. }
        )
    }

    /// Apply to `project`, leaving it untouched on error.
    pub fn apply(&self, project: &mut ProjectView) -> Result<(), EditError> {
        if let Self::Cover { title, subtitle } = self {
            if let Some(t) = title {
                project.cover_title = Some(t.clone());
            }
            if let Some(s) = subtitle {
                project.cover_subtitle = Some(s.clone());
            }
            return Ok(());
        }

        let id = self.chapter_id().unwrap_or_default();
        let index = project
            .chapter_index(id)
            .ok_or_else(|| EditError::ChapterNotFound(id.to_string()))?;
        if project.chapters[index].locked && self.blocked_by_lock() {
            return Err(EditError::Locked(id.to_string()));
        }

        match self {
            Self::UpdateText { title, content, .. } => {
                if title.as_deref().is_some_and(|t| t.trim().is_empty()) {
                    return Err(EditError::EmptyTitle);
                }
                let chapter = &mut project.chapters[index];
                if let Some(t) = title {
                    chapter.title = t.trim().to_string();
                }
                if let Some(c) = content {
                    chapter.content = c.clone();
                }
            }
            Self::SetLocked { locked, .. } => {
                project.chapters[index].locked = *locked;
            }
            Self::Delete { .. } => {
                project.chapters.remove(index);
            }
            Self::Move { to, .. } => {
                let len = project.chapters.len();
                if *to >= len {
                    return Err(EditError::OutOfRange { to: *to, len });
                }
                let chapter = project.chapters.remove(index);
                project.chapters.insert(*to, chapter);
            }
            Self::AttachImage { image_url, .. } => {
                let chapter = &mut project.chapters[index];
                chapter.image_url = Some(image_url.clone());
                chapter.image_type = ImageType::UserUploaded;
            }
            Self::ClearImage { .. } => {
                let chapter = &mut project.chapters[index];
                chapter.image_url = None;
                chapter.image_type = ImageType::None;
            }
            Self::Cover { .. } => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Chapter;

    fn project() -> ProjectView {
        let mut p = ProjectView::new("p1", "Story");
        p.chapters = vec![
            Chapter::new("a", "A", "alpha"),
            Chapter::new("b", "B", "beta"),
            Chapter::new("c", "C", "gamma"),
        ];
        p
    }

    fn order(p: &ProjectView) -> Vec<&str> {
        p.chapters.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn move_reorders() {
        let mut p = project();
        ChapterEdit::Move {
            chapter_id: "c".into(),
            to: 0,
        }
        .apply(&mut p)
        .unwrap();
        assert_eq!(order(&p), ["c", "a", "b"]);
        ChapterEdit::Move {
            chapter_id: "c".into(),
            to: 2,
        }
        .apply(&mut p)
        .unwrap();
        assert_eq!(order(&p), ["a", "b", "c"]);
    }

    #[test]
    fn move_out_of_range_is_rejected() {
        let mut p = project();
        let err = ChapterEdit::Move {
            chapter_id: "a".into(),
            to: 3,
        }
        .apply(&mut p)
        .unwrap_err();
        assert_eq!(err, EditError::OutOfRange { to: 3, len: 3 });
        assert_eq!(order(&p), ["a", "b", "c"]);
    }

    #[test]
    fn locked_chapter_refuses_text_edits_but_can_be_unlocked() {
        let mut p = project();
        p.chapters[1].locked = true;
        let err = ChapterEdit::UpdateText {
            chapter_id: "b".into(),
            title: None,
            content: Some("changed".into()),
        }
        .apply(&mut p)
        .unwrap_err();
        assert_eq!(err, EditError::Locked("b".into()));
        assert_eq!(
            ChapterEdit::Delete {
                chapter_id: "b".into()
            }
            .apply(&mut p),
            Err(EditError::Locked("b".into()))
        );

        ChapterEdit::SetLocked {
            chapter_id: "b".into(),
            locked: false,
        }
        .apply(&mut p)
        .unwrap();
        ChapterEdit::UpdateText {
            chapter_id: "b".into(),
            title: Some("  Beta  ".into()),
            content: None,
        }
        .apply(&mut p)
        .unwrap();
        assert_eq!(p.chapters[1].title, "Beta");
        assert_eq!(p.chapters[1].content, "beta");
    }

    #[test]
    fn attach_and_clear_image() {
        let mut p = project();
        ChapterEdit::AttachImage {
            chapter_id: "a".into(),
            image_url: "/img.png".into(),
        }
        .apply(&mut p)
        .unwrap();
        assert_eq!(p.chapters[0].image_type, ImageType::UserUploaded);
        ChapterEdit::ClearImage {
            chapter_id: "a".into(),
        }
        .apply(&mut p)
        .unwrap();
        assert!(!p.chapters[0].has_image());
        assert_eq!(p.chapters[0].image_type, ImageType::None);
    }

    #[test]
    fn empty_title_rejected() {
        let mut p = project();
        assert_eq!(
            ChapterEdit::UpdateText {
                chapter_id: "a".into(),
                title: Some(" ".into()),
                content: None,
            }
            .apply(&mut p),
            Err(EditError::EmptyTitle)
        );
    }
}
