//! The progress projector: folds pushed progress events for one open
//! project into a tracker position plus incremental changes to the local
//! [`ProjectView`].
//!
//! The projector is a plain reducer. It performs no I/O; anything that needs
//! the network (re-fetching after bulk illustration, the one-shot
//! celebration on publish) is returned as an [`Effect`] for the owner to
//! carry out.

use crate::edit::{ChapterEdit, EditError};
use crate::event::{ProgressEvent, ProgressUpdate, TranscriptFragment};
use crate::model::{Chapter, ImageType, ProjectStatus, ProjectView};
use crate::phase::Phase;

/// How pushed or fetched chapter sets interact with local edits that the
/// server may not have seen yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Whatever arrives last replaces local state.
    #[default]
    LastWriteWins,
    /// Drop a refresh or drafted chapter set that was requested before the
    /// most recent local edit.
    RejectStale,
}

impl std::str::FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last-write-wins" | "last_write_wins" => Ok(Self::LastWriteWins),
            "reject-stale" | "reject_stale" => Ok(Self::RejectStale),
            other => Err(format!("unknown conflict policy: {other}")),
        }
    }
}

/// A server-side job the client just started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Transcription,
    TextRefinement,
    VideoProcessing,
    ChapterDraft,
    SingleImage,
    AllImages,
    Pdf,
}

impl Job {
    /// Phase the job's first events belong to.
    pub fn phase(self) -> Phase {
        match self {
            Self::Transcription | Self::VideoProcessing => Phase::Capture,
            Self::TextRefinement => Phase::Refine,
            Self::ChapterDraft => Phase::Compose,
            Self::SingleImage | Self::AllImages => Phase::Illustrate,
            Self::Pdf => Phase::Publish,
        }
    }
}

/// Side effects requested by the projector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Re-fetch the project; local state may disagree with the server.
    Refresh,
    /// Chapters are ready; switch from the tracker to chapter curation.
    ShowChapters,
    /// The book was published. Fired once per transition.
    Celebrate { pdf_url: String },
}

/// Why an input left the projection untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    NoProject,
    OtherProject,
    /// Partial data from the step the running job has just moved past.
    StaleReplay,
    /// Requested before the latest local edit (under [`ConflictPolicy::RejectStale`]).
    StaleRevision,
    /// `image_ready` for a chapter that no longer exists.
    UnknownChapter,
}

/// Result of feeding one input to the projector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub changed: bool,
    pub effects: Vec<Effect>,
    pub ignored: Option<Ignored>,
}

impl Outcome {
    fn ignored(reason: Ignored) -> Self {
        Self {
            changed: false,
            effects: Vec::new(),
            ignored: Some(reason),
        }
    }

    fn changed() -> Self {
        Self {
            changed: true,
            ..Default::default()
        }
    }

    fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Captures the local revision when a fetch is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    revision: u64,
}

/// Undo information for an optimistic edit awaiting server confirmation.
#[derive(Debug, Clone)]
pub struct PendingEdit {
    pub edit: ChapterEdit,
    revision: u64,
    project_id: String,
    chapters: Vec<Chapter>,
    cover_title: Option<String>,
    cover_subtitle: Option<String>,
}

impl PendingEdit {
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Display state of one tracker step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Done,
    Active,
    Pending,
    /// The step that was running when the job failed.
    Halted,
}

/// Snapshot for rendering the five-step tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracker {
    pub steps: [(Phase, StepState); 5],
    pub percent: u8,
    pub message: String,
    pub errored: bool,
}

impl Tracker {
    pub fn active(&self) -> Option<Phase> {
        self.steps
            .iter()
            .find(|(_, s)| *s == StepState::Active)
            .map(|(p, _)| *p)
    }
}

#[derive(Debug, Default)]
pub struct ProgressProjector {
    current_stage: Option<String>,
    percent: u8,
    message: String,
    project: Option<ProjectView>,
    errored: bool,
    /// Phase of the latest classified event in the current run.
    floor: Option<Phase>,
    /// A job is between its first event and the event that settles it.
    running: bool,
    /// The running illustration job covers every chapter.
    bulk_images: bool,
    /// Phase of the last classified event, kept through an error.
    last_phase: Option<Phase>,
    revision: u64,
    draft_revision: Option<u64>,
    /// Chapters streamed by `chapter_ready` before the draft completes.
    draft_preview: Vec<Chapter>,
    policy: ConflictPolicy,
}

impl ProgressProjector {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn current_stage(&self) -> Option<&str> {
        self.current_stage.as_deref()
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn project(&self) -> Option<&ProjectView> {
        self.project.as_ref()
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project.as_ref().map(|p| p.id.as_str())
    }

    pub fn is_errored(&self) -> bool {
        self.errored
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn draft_preview(&self) -> &[Chapter] {
        &self.draft_preview
    }

    /// Whether the shell should show the tracker rather than the project body.
    pub fn in_progress(&self) -> bool {
        self.running || self.errored
    }

    /// Load a freshly opened project, discarding all progress state.
    pub fn open(&mut self, project: ProjectView) {
        log::debug!("projector: open {}", project.id);
        let policy = self.policy;
        *self = Self::new(policy);
        self.project = Some(project);
    }

    /// Forget the open project (the view was left).
    pub fn close(&mut self) {
        let policy = self.policy;
        *self = Self::new(policy);
    }

    /// Ticket to present with the result of a fetch issued now.
    pub fn refresh_ticket(&self) -> RefreshTicket {
        RefreshTicket {
            revision: self.revision,
        }
    }

    /// Replace the project with an authoritative fetch result.
    pub fn refresh(&mut self, project: ProjectView, ticket: RefreshTicket) -> Outcome {
        let Some(current) = self.project.as_ref() else {
            return Outcome::ignored(Ignored::NoProject);
        };
        if current.id != project.id {
            return Outcome::ignored(Ignored::OtherProject);
        }
        if self.policy == ConflictPolicy::RejectStale && ticket.revision < self.revision {
            log::info!(
                "projector: dropping refresh issued at revision {} (local revision {})",
                ticket.revision,
                self.revision
            );
            return Outcome::ignored(Ignored::StaleRevision);
        }
        self.project = Some(project);
        Outcome::changed()
    }

    /// Record that the client just started `job` on the server.
    ///
    /// Starting a job clears a previous error and opens a new run, so
    /// events from earlier phases are accepted again.
    pub fn begin_job(&mut self, job: Job) {
        self.errored = false;
        self.floor = Some(job.phase());
        self.bulk_images = job == Job::AllImages;
        if job == Job::ChapterDraft {
            self.draft_revision = Some(self.revision);
            self.draft_preview.clear();
        }
    }

    /// Clear the error so the shell can re-invoke the failed generation call.
    pub fn retry(&mut self) {
        self.errored = false;
        self.floor = None;
    }

    /// The start request for a job never reached the server.
    pub fn abandon_job(&mut self) {
        self.floor = None;
        self.draft_revision = None;
        self.bulk_images = false;
    }

    /// Fold one pushed progress update into the projection.
    pub fn apply(&mut self, update: &ProgressUpdate) -> Outcome {
        let Some(project) = self.project.as_ref() else {
            return Outcome::ignored(Ignored::NoProject);
        };
        if project.id != update.project_id {
            log::debug!(
                "projector: ignoring {} for project {} (open: {})",
                update.event.stage(),
                update.project_id,
                project.id
            );
            return Outcome::ignored(Ignored::OtherProject);
        }

        if update.event == ProgressEvent::Error {
            if !self.errored {
                log::warn!("projector: job failed: {}", update.message);
            }
            self.errored = true;
            if !update.message.is_empty() {
                self.message = update.message.clone();
            }
            return Outcome::changed();
        }

        let phase = Phase::of(&update.event);
        if let (Some(phase), Some(floor)) = (phase, self.floor) {
            if is_replay(&update.event, phase, floor) {
                log::debug!(
                    "projector: stale {} replay (running job is at {:?})",
                    update.event.stage(),
                    floor
                );
                return Outcome::ignored(Ignored::StaleReplay);
            }
        }

        if let ProgressEvent::ChaptersComplete { .. } = update.event {
            if self.policy == ConflictPolicy::RejectStale
                && self.draft_revision.is_some_and(|r| r < self.revision)
            {
                log::info!("projector: dropping drafted chapters older than local edits");
                return Outcome::ignored(Ignored::StaleRevision);
            }
        }

        if let ProgressEvent::ImageReady { chapter_id, .. } = &update.event {
            if project.chapter(chapter_id).is_none() {
                log::debug!("projector: image_ready for unknown chapter {chapter_id}");
                return Outcome::ignored(Ignored::UnknownChapter);
            }
        }

        if !self.errored {
            if let Some(p) = update.percent {
                self.percent = p;
            }
            if !update.message.is_empty() {
                self.message = update.message.clone();
            }
            if let Some(phase) = phase {
                self.current_stage = Some(update.event.stage().to_string());
                self.last_phase = Some(phase);
                self.floor = Some(phase);
                self.running = true;
            }
        }

        let mut outcome = Outcome::changed();
        self.mutate(&update.event, &mut outcome);
        if update.event.ends_job() {
            self.floor = None;
        }
        if self.settles(&update.event) {
            self.running = false;
        }
        outcome
    }

    fn mutate(&mut self, event: &ProgressEvent, outcome: &mut Outcome) {
        let Some(project) = self.project.as_mut() else {
            return;
        };
        match event {
            ProgressEvent::Transcribing {
                raw_transcript: Some(snippet),
            } => {
                project.transcript = snippet.clone();
                project.status = ProjectStatus::Transcribing;
            }
            ProgressEvent::Transcribed { transcript } => {
                if let Some(text) = transcript {
                    project.transcript = text.clone();
                }
                project.status = ProjectStatus::Transcribed;
                if !self.errored {
                    self.percent = 100;
                }
            }
            ProgressEvent::Writing => {
                project.status = ProjectStatus::Writing;
            }
            ProgressEvent::ChapterReady {
                chapter: Some(chapter),
                index,
            } => {
                let preview = &mut self.draft_preview;
                match preview.iter().position(|c| c.id == chapter.id) {
                    Some(i) => preview[i] = chapter.clone(),
                    None => {
                        let at = index.unwrap_or(preview.len()).min(preview.len());
                        preview.insert(at, chapter.clone());
                    }
                }
            }
            ProgressEvent::ChaptersComplete {
                chapters,
                cover_title,
                cover_subtitle,
            } => {
                if chapters.is_empty() {
                    log::warn!("projector: chapters_complete without usable chapters, keeping the current set");
                } else {
                    project.chapters = chapters.clone();
                }
                fill_if_unset(&mut project.cover_title, cover_title);
                fill_if_unset(&mut project.cover_subtitle, cover_subtitle);
                project.status = ProjectStatus::ChaptersReady;
                self.current_stage = None;
                self.draft_preview.clear();
                self.draft_revision = None;
                outcome.effects.push(Effect::ShowChapters);
            }
            ProgressEvent::ImageReady {
                chapter_id,
                image_url,
            } => {
                if let Some(chapter) = project.chapter_mut(chapter_id) {
                    chapter.image_url = Some(image_url.clone());
                    chapter.image_type = ImageType::AiGenerated;
                }
            }
            ProgressEvent::GeneratingImages => self.bulk_images = true,
            ProgressEvent::GeneratingImage => self.bulk_images = false,
            ProgressEvent::AllImagesComplete => {
                self.bulk_images = false;
                outcome.effects.push(Effect::Refresh);
            }
            ProgressEvent::PdfReady { pdf_url } => {
                let fresh = project.status != ProjectStatus::Complete
                    || project.pdf_url.as_deref() != Some(pdf_url.as_str());
                project.pdf_url = Some(pdf_url.clone());
                project.status = ProjectStatus::Complete;
                if fresh {
                    outcome.effects.push(Effect::Celebrate {
                        pdf_url: pdf_url.clone(),
                    });
                }
            }
            _ => {}
        }
    }

    /// Whether `event` leaves the client with nothing left to wait for.
    fn settles(&self, event: &ProgressEvent) -> bool {
        match event {
            ProgressEvent::Transcribed { .. }
            | ProgressEvent::ChaptersComplete { .. }
            | ProgressEvent::AllImagesComplete
            | ProgressEvent::PdfReady { .. } => true,
            ProgressEvent::ImageReady { .. } => !self.bulk_images,
            _ => false,
        }
    }

    /// Fold one live transcript fragment into the projection.
    pub fn apply_transcript(&mut self, fragment: &TranscriptFragment) -> Outcome {
        let errored = self.errored;
        let Some(project) = self.project.as_mut() else {
            return Outcome::ignored(Ignored::NoProject);
        };
        if project.id != fragment.project_id {
            return Outcome::ignored(Ignored::OtherProject);
        }

        let mut changed = false;
        if fragment.is_final {
            let text = fragment.transcript.trim();
            if !text.is_empty() {
                if !project.transcript.is_empty() && !project.transcript.ends_with(' ') {
                    project.transcript.push(' ');
                }
                project.transcript.push_str(text);
                changed = true;
            }
        }

        if !errored && self.current_stage.as_deref() != Some("transcribing") {
            self.current_stage = Some("transcribing".to_string());
            self.last_phase = Some(Phase::Capture);
            changed = true;
        }
        if !errored {
            // Live capture starts a new run.
            self.floor = Some(Phase::Capture);
            self.running = true;
        }

        Outcome {
            changed,
            ..Default::default()
        }
    }

    /// Apply a chapter edit optimistically and return its undo record.
    pub fn apply_edit(&mut self, edit: ChapterEdit) -> Result<PendingEdit, EditError> {
        let project = self.project.as_mut().ok_or(EditError::NoProject)?;
        let before_chapters = project.chapters.clone();
        let before_title = project.cover_title.clone();
        let before_subtitle = project.cover_subtitle.clone();

        edit.apply(project)?;
        self.revision += 1;

        Ok(PendingEdit {
            edit,
            revision: self.revision,
            project_id: project.id.clone(),
            chapters: before_chapters,
            cover_title: before_title,
            cover_subtitle: before_subtitle,
        })
    }

    /// The server accepted the edit.
    pub fn confirm(&mut self, pending: PendingEdit) {
        log::debug!("projector: edit at revision {} confirmed", pending.revision);
    }

    /// The server rejected the edit: restore the pre-edit chapters when
    /// nothing newer was applied since, otherwise request a refresh.
    pub fn rollback(&mut self, pending: PendingEdit) -> Outcome {
        let Some(project) = self.project.as_mut() else {
            return Outcome::ignored(Ignored::NoProject);
        };
        if project.id != pending.project_id {
            return Outcome::ignored(Ignored::OtherProject);
        }
        if pending.revision == self.revision {
            project.chapters = pending.chapters;
            project.cover_title = pending.cover_title;
            project.cover_subtitle = pending.cover_subtitle;
            Outcome::changed()
        } else {
            log::info!(
                "projector: cannot roll back revision {} under newer edits, refreshing",
                pending.revision
            );
            Outcome::default().with(Effect::Refresh)
        }
    }

    /// Tracker snapshot for rendering.
    pub fn tracker(&self) -> Tracker {
        let focus = if self.errored {
            self.last_phase
        } else {
            self.current_stage.as_deref().and_then(Phase::of_stage)
        };

        let steps = Phase::ALL.map(|phase| {
            let state = match focus {
                Some(f) if phase < f => StepState::Done,
                Some(f) if phase == f && self.errored => StepState::Halted,
                Some(f) if phase == f => StepState::Active,
                Some(_) => StepState::Pending,
                None if phase.index() < self.settled_steps() => StepState::Done,
                None => StepState::Pending,
            };
            (phase, state)
        });

        Tracker {
            steps,
            percent: self.percent,
            message: self.message.clone(),
            errored: self.errored,
        }
    }

    /// Number of steps already behind the project, judged from its status.
    fn settled_steps(&self) -> usize {
        match self.project.as_ref().map(|p| &p.status) {
            Some(ProjectStatus::Transcribed) | Some(ProjectStatus::Writing) => 2,
            Some(ProjectStatus::ChaptersReady) => 3,
            Some(ProjectStatus::ImagesReady) => 4,
            Some(ProjectStatus::Complete) => 5,
            _ => 0,
        }
    }
}

/// Only partial data one step behind the run can be a late duplicate;
/// progress markers and completions are always applied.
fn is_replay(event: &ProgressEvent, phase: Phase, floor: Phase) -> bool {
    let partial = matches!(
        event,
        ProgressEvent::Transcribing {
            raw_transcript: Some(_)
        } | ProgressEvent::ChapterReady {
            chapter: Some(_),
            ..
        }
    );
    partial && floor.index() == phase.index() + 1
}

fn fill_if_unset(slot: &mut Option<String>, incoming: &Option<String>) {
    let unset = slot.as_deref().is_none_or(|s| s.trim().is_empty());
    if let Some(value) = incoming.as_deref().filter(|v| !v.trim().is_empty()) {
        if unset {
            *slot = Some(value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_policy_parses_both_spellings() {
        assert_eq!(
            "reject-stale".parse::<ConflictPolicy>(),
            Ok(ConflictPolicy::RejectStale)
        );
        assert_eq!(
            "last_write_wins".parse::<ConflictPolicy>(),
            Ok(ConflictPolicy::LastWriteWins)
        );
        assert!("newest".parse::<ConflictPolicy>().is_err());
    }

    #[test]
    fn fill_if_unset_only_fills_blanks() {
        let mut slot = Some("  ".to_string());
        fill_if_unset(&mut slot, &Some("Roots".into()));
        assert_eq!(slot.as_deref(), Some("Roots"));
        fill_if_unset(&mut slot, &Some("Other".into()));
        assert_eq!(slot.as_deref(), Some("Roots"));
        let mut empty = None;
        fill_if_unset(&mut empty, &Some(" ".into()));
        assert!(empty.is_none());
    }

    #[test]
    fn events_without_open_project_are_ignored() {
        let mut pr = ProgressProjector::default();
        let u = ProgressUpdate::new("p", 5, "x", ProgressEvent::Writing);
        assert_eq!(pr.apply(&u).ignored, Some(Ignored::NoProject));
        assert_eq!(pr.percent(), 0);
    }

    #[test]
    fn only_partial_data_behind_the_run_is_a_replay() {
        let snippet = ProgressEvent::Transcribing {
            raw_transcript: Some("hello".into()),
        };
        assert!(is_replay(&snippet, Phase::Capture, Phase::Refine));
        assert!(!is_replay(&snippet, Phase::Capture, Phase::Capture));
        assert!(!is_replay(&ProgressEvent::Uploading, Phase::Capture, Phase::Refine));
        assert!(!is_replay(&ProgressEvent::Writing, Phase::Compose, Phase::Illustrate));
    }

    #[test]
    fn open_keeps_policy_and_resets_progress() {
        let mut pr = ProgressProjector::new(ConflictPolicy::RejectStale);
        pr.open(ProjectView::new("a", "A"));
        pr.apply(&ProgressUpdate::new("a", 40, "writing", ProgressEvent::Writing));
        pr.open(ProjectView::new("b", "B"));
        assert_eq!(pr.policy(), ConflictPolicy::RejectStale);
        assert_eq!(pr.current_stage(), None);
        assert_eq!(pr.percent(), 0);
        assert_eq!(pr.project_id(), Some("b"));
    }
}
