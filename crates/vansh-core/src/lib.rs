//! Core types for the VANSH biography client: the project model, typed push
//! events, the five-step stage classifier and the progress projector that
//! folds server-driven progress into local state.
//!
//! Nothing in this crate performs I/O.

pub mod edit;
pub mod event;
pub mod model;
pub mod phase;
pub mod projector;
pub mod socketio;
pub mod validate;

pub use edit::{ChapterEdit, EditError};
pub use event::{ClientMessage, ProgressEvent, ProgressUpdate, PushEvent, TranscriptFragment};
pub use model::{Chapter, ImageType, InputType, ProjectStatus, ProjectView, User};
pub use phase::{Phase, classify};
pub use projector::{
    ConflictPolicy, Effect, Ignored, Job, Outcome, PendingEdit, ProgressProjector, RefreshTicket,
    StepState, Tracker,
};
pub use socketio::WireError;
pub use validate::{MediaKind, ValidationError};
