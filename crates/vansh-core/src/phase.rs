//! Coarse five-step grouping of pipeline stages for the progress tracker.

use crate::event::ProgressEvent;

/// A step of the visual tracker, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Capture,
    Refine,
    Compose,
    Illustrate,
    Publish,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Capture,
        Phase::Refine,
        Phase::Compose,
        Phase::Illustrate,
        Phase::Publish,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: i8) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Phase of a raw stage string, `None` when unrecognised.
    pub fn of_stage(stage: &str) -> Option<Self> {
        Self::from_index(classify(stage))
    }

    pub fn of(event: &ProgressEvent) -> Option<Self> {
        Self::of_stage(event.stage())
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Capture => "Capture",
            Self::Refine => "Refine",
            Self::Compose => "Compose",
            Self::Illustrate => "Illustrate",
            Self::Publish => "Publish",
        }
    }
}

/// Map a raw stage to its phase index in `0..=4`, or `-1` if unknown.
///
/// `error` is deliberately outside the phase vocabulary: it is a terminal
/// condition handled by the projector, not a step of the tracker.
pub fn classify(stage: &str) -> i8 {
    match stage {
        "uploading" | "extracting" | "transcribing" => 0,
        "transcribed" | "refining" => 1,
        "writing" | "chapter_ready" | "chapters_complete" => 2,
        "generating_image" | "generating_images" | "image_ready" | "all_images_complete" => 3,
        "generating_pdf" | "pdf_ready" => 4,
        _ => -1,
    }
}

/// Every stage string that maps onto a phase.
pub const KNOWN_STAGES: &[&str] = &[
    "uploading",
    "extracting",
    "transcribing",
    "transcribed",
    "refining",
    "writing",
    "chapter_ready",
    "chapters_complete",
    "generating_image",
    "generating_images",
    "image_ready",
    "all_images_complete",
    "generating_pdf",
    "pdf_ready",
];
