use std::path::PathBuf;

use vansh_client::PushNotice;
use vansh_core::validate;
use vansh_core::{
    ChapterEdit, ConflictPolicy, Effect, InputType, Job, Outcome, ProgressProjector, ProjectView,
    PushEvent, User,
};

use crate::action::Action;
use crate::model::form::{Credentials, SignInForm};
use crate::model::prompt::{Prompt, PromptKind};
use crate::theme::Theme;
use crate::tui_event::{BackendEvent, JobRequest, Request};

/// Ticks a status-line notice stays visible (100 ms each).
const NOTICE_TICKS: usize = 50;

/// Which screen is currently displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    SignIn,
    Dashboard,
    /// The open project: tracker while a job runs, chapters otherwise.
    Project,
    /// Full text of the chapter under `chapter_cursor`.
    Chapter,
}

/// Push channel health, shown in the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushState {
    Offline,
    Connected,
    Reconnecting { attempt: u32 },
    Disconnected(String),
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub text: String,
    pub error: bool,
    expires_at: usize,
}

/// Main application state.
pub struct App {
    pub screen: Screen,
    pub user: Option<User>,
    pub form: SignInForm,
    pub projects: Vec<ProjectView>,
    pub dashboard_cursor: usize,
    pub chapter_cursor: usize,
    pub projector: ProgressProjector,
    pub prompt: Option<Prompt>,
    pub notice: Option<Notice>,
    pub push: PushState,
    /// Set when the book is published; cleared on leaving the project.
    pub celebration: Option<String>,
    /// The job whose start request is still in flight.
    pub job_in_flight: Option<Job>,
    pub tick: usize,
    pub theme: Theme,
    pub should_quit: bool,
    pub show_help: bool,
    pub detail_scroll: u16,
    /// Height of the visible table area (set on resize, used for page up/down).
    pub visible_rows: usize,
    pub download_dir: PathBuf,
    last_job: Option<JobRequest>,
    signing_out: bool,
    requests: Vec<Request>,
}

impl App {
    pub fn new(user: Option<User>, policy: ConflictPolicy, download_dir: PathBuf) -> Self {
        let mut app = Self {
            screen: Screen::SignIn,
            user: None,
            form: SignInForm::default(),
            projects: Vec::new(),
            dashboard_cursor: 0,
            chapter_cursor: 0,
            projector: ProgressProjector::new(policy),
            prompt: None,
            notice: None,
            push: PushState::Offline,
            celebration: None,
            job_in_flight: None,
            tick: 0,
            theme: Theme::heritage(),
            should_quit: false,
            show_help: false,
            detail_scroll: 0,
            visible_rows: 20,
            download_dir,
            last_job: None,
            signing_out: false,
            requests: Vec::new(),
        };
        if let Some(user) = user {
            app.signed_in(user);
        }
        app
    }

    /// Requests queued since the last call, in issue order.
    pub fn take_requests(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.requests)
    }

    /// Whether keystrokes should be read as text.
    pub fn is_typing(&self) -> bool {
        !self.show_help && (self.prompt.is_some() || self.screen == Screen::SignIn)
    }

    pub fn chapter_count(&self) -> usize {
        self.projector.project().map_or(0, |p| p.chapters.len())
    }

    pub fn selected_project(&self) -> Option<&ProjectView> {
        self.projects.get(self.dashboard_cursor)
    }

    fn flash(&mut self, text: impl Into<String>) {
        self.notice = Some(Notice {
            text: text.into(),
            error: false,
            expires_at: self.tick + NOTICE_TICKS,
        });
    }

    fn flash_error(&mut self, text: impl Into<String>) {
        self.notice = Some(Notice {
            text: text.into(),
            error: true,
            expires_at: self.tick + NOTICE_TICKS,
        });
    }

    /// Process a user action and update state. Returns true if the app should quit.
    pub fn update(&mut self, action: Action) -> bool {
        match action {
            Action::Quit => {
                self.should_quit = true;
                return true;
            }
            Action::Tick => {
                self.tick = self.tick.wrapping_add(1);
                if self.notice.as_ref().is_some_and(|n| n.expires_at <= self.tick) {
                    self.notice = None;
                }
                return false;
            }
            Action::Resize(_w, h) => {
                // Rough estimate: total height minus header/footer/borders
                self.visible_rows = (h as usize).saturating_sub(6);
                return false;
            }
            Action::None => return false,
            _ => {}
        }

        // When help overlay is shown, only allow a few actions through
        if self.show_help {
            if matches!(action, Action::ToggleHelp | Action::NavigateBack) {
                self.show_help = false;
            }
            return false;
        }

        if self.prompt.is_some() {
            self.update_prompt(action);
            return false;
        }

        if action == Action::ToggleHelp {
            self.show_help = true;
            return false;
        }

        match self.screen {
            Screen::SignIn => self.update_sign_in(action),
            Screen::Dashboard => self.update_dashboard(action),
            Screen::Project => self.update_project(action),
            Screen::Chapter => self.update_chapter(action),
        }
        false
    }

    fn update_prompt(&mut self, action: Action) {
        let Some(prompt) = self.prompt.as_mut() else {
            return;
        };
        match action {
            Action::Input(c) => prompt.buffer.push(c),
            Action::Backspace => {
                prompt.buffer.pop();
            }
            Action::NavigateBack => self.prompt = None,
            Action::Submit => {
                if let Some(prompt) = self.prompt.take() {
                    self.submit_prompt(prompt);
                }
            }
            _ => {}
        }
    }

    fn update_sign_in(&mut self, action: Action) {
        match action {
            Action::Input(c) => self.form.push(c),
            Action::Backspace => self.form.backspace(),
            Action::NextField => self.form.next_field(),
            Action::ToggleRegister => self.form.toggle_register(),
            Action::Submit if !self.form.busy => match self.form.credentials() {
                Ok(Credentials::Login { email, password }) => {
                    self.form.busy = true;
                    self.requests.push(Request::Login { email, password });
                }
                Ok(Credentials::Register {
                    name,
                    email,
                    password,
                }) => {
                    self.form.busy = true;
                    self.requests.push(Request::Register {
                        name,
                        email,
                        password,
                    });
                }
                Err(e) => self.form.error = Some(e.to_string()),
            },
            _ => {}
        }
    }

    fn update_dashboard(&mut self, action: Action) {
        let len = self.projects.len();
        match action {
            Action::MoveDown => {
                if self.dashboard_cursor + 1 < len {
                    self.dashboard_cursor += 1;
                }
            }
            Action::MoveUp => self.dashboard_cursor = self.dashboard_cursor.saturating_sub(1),
            Action::PageDown => {
                self.dashboard_cursor =
                    (self.dashboard_cursor + self.visible_rows.max(1)).min(len.saturating_sub(1));
            }
            Action::PageUp => {
                self.dashboard_cursor = self.dashboard_cursor.saturating_sub(self.visible_rows.max(1));
            }
            Action::GoTop => self.dashboard_cursor = 0,
            Action::GoBottom => self.dashboard_cursor = len.saturating_sub(1),
            Action::DrillIn => {
                if let Some(project) = self.selected_project().cloned() {
                    self.open_project(project);
                }
            }
            Action::Refresh => self.requests.push(Request::ListProjects),
            Action::NewProject => self.prompt = Some(Prompt::new(PromptKind::ProjectTitle)),
            Action::DeleteProject => {
                if let Some(project) = self.selected_project() {
                    let kind = PromptKind::ConfirmDelete {
                        project_id: project.id.clone(),
                        title: project.display_title().to_string(),
                    };
                    self.prompt = Some(Prompt::new(kind));
                }
            }
            Action::SignOut => {
                self.signing_out = true;
                self.requests.push(Request::SignOut);
            }
            _ => {}
        }
    }

    fn update_project(&mut self, action: Action) {
        let len = self.chapter_count();
        match action {
            Action::NavigateBack => self.leave_project(),
            Action::MoveDown => {
                if self.chapter_cursor + 1 < len {
                    self.chapter_cursor += 1;
                }
            }
            Action::MoveUp => self.chapter_cursor = self.chapter_cursor.saturating_sub(1),
            Action::PageDown => {
                self.chapter_cursor =
                    (self.chapter_cursor + self.visible_rows.max(1)).min(len.saturating_sub(1));
            }
            Action::PageUp => {
                self.chapter_cursor = self.chapter_cursor.saturating_sub(self.visible_rows.max(1));
            }
            Action::GoTop => self.chapter_cursor = 0,
            Action::GoBottom => self.chapter_cursor = len.saturating_sub(1),
            Action::DrillIn => {
                if self.chapter_cursor < len && !self.projector.in_progress() {
                    self.detail_scroll = 0;
                    self.screen = Screen::Chapter;
                }
            }
            Action::Refresh => self.request_refresh(),
            Action::SubmitText => {
                let existing = self
                    .projector
                    .project()
                    .map(|p| p.source_text().to_string())
                    .unwrap_or_default();
                self.prompt = Some(Prompt::with_value(PromptKind::NarrativeText, existing));
            }
            Action::UploadAudio => self.prompt = Some(Prompt::new(PromptKind::AudioPath)),
            Action::UploadVideo => self.prompt = Some(Prompt::new(PromptKind::VideoPath)),
            Action::GenerateDraft => {
                let has_source = self
                    .projector
                    .project()
                    .is_some_and(|p| !p.source_text().trim().is_empty());
                if has_source {
                    self.start_job(JobRequest::Draft);
                } else {
                    self.flash_error("Record or type the story before drafting chapters");
                }
            }
            Action::GenerateAllImages => {
                if len == 0 {
                    self.flash_error("Draft chapters before illustrating");
                } else {
                    self.start_job(JobRequest::AllImages);
                }
            }
            Action::GeneratePdf => {
                if len == 0 {
                    self.flash_error("Draft chapters before publishing");
                } else {
                    self.start_job(JobRequest::Pdf);
                }
            }
            Action::Download => self.prompt_download(),
            Action::Retry => self.retry(),
            _ => self.update_selected_chapter(action),
        }
    }

    fn update_chapter(&mut self, action: Action) {
        match action {
            Action::NavigateBack => self.screen = Screen::Project,
            Action::MoveDown => self.detail_scroll = self.detail_scroll.saturating_add(1),
            Action::MoveUp => self.detail_scroll = self.detail_scroll.saturating_sub(1),
            Action::PageDown => {
                self.detail_scroll = self.detail_scroll.saturating_add(self.visible_rows as u16);
            }
            Action::PageUp => {
                self.detail_scroll = self.detail_scroll.saturating_sub(self.visible_rows as u16);
            }
            Action::GoTop => self.detail_scroll = 0,
            Action::GoBottom => self.detail_scroll = u16::MAX, // clamped by Paragraph rendering
            _ => self.update_selected_chapter(action),
        }
    }

    /// Curation keys shared by the chapter list and the chapter screen.
    fn update_selected_chapter(&mut self, action: Action) {
        if action == Action::EditCover {
            let current = self
                .projector
                .project()
                .and_then(|p| p.cover_title.clone())
                .unwrap_or_default();
            self.prompt = Some(Prompt::with_value(PromptKind::CoverTitle, current));
            return;
        }

        let Some(chapter) = self
            .projector
            .project()
            .and_then(|p| p.chapters.get(self.chapter_cursor))
            .cloned()
        else {
            return;
        };
        let chapter_id = chapter.id.clone();

        match action {
            Action::GenerateImage => self.start_job(JobRequest::Image(chapter)),
            Action::ToggleLock => {
                self.edit(ChapterEdit::SetLocked {
                    chapter_id,
                    locked: !chapter.locked,
                });
            }
            Action::DeleteChapter => {
                self.edit(ChapterEdit::Delete { chapter_id });
                if self.screen == Screen::Chapter {
                    self.screen = Screen::Project;
                }
            }
            Action::MoveChapterUp if self.chapter_cursor > 0 => {
                let to = self.chapter_cursor - 1;
                if self.edit(ChapterEdit::Move { chapter_id, to }) {
                    self.chapter_cursor = to;
                }
            }
            Action::MoveChapterDown if self.chapter_cursor + 1 < self.chapter_count() => {
                let to = self.chapter_cursor + 1;
                if self.edit(ChapterEdit::Move { chapter_id, to }) {
                    self.chapter_cursor = to;
                }
            }
            Action::RenameChapter => {
                self.prompt = Some(Prompt::with_value(
                    PromptKind::ChapterTitle { chapter_id },
                    chapter.title,
                ));
            }
            Action::AttachImage => {
                self.prompt = Some(Prompt::new(PromptKind::ImagePath { chapter_id }));
            }
            Action::ClearImage => {
                self.edit(ChapterEdit::ClearImage { chapter_id });
            }
            _ => {}
        }
    }

    fn submit_prompt(&mut self, prompt: Prompt) {
        let value = prompt.buffer.trim().to_string();
        match prompt.kind {
            PromptKind::ProjectTitle => {
                self.requests.push(Request::CreateProject {
                    title: validate::project_title(&value),
                    input_type: InputType::Text,
                });
            }
            PromptKind::ConfirmDelete { project_id, .. } => {
                if value.eq_ignore_ascii_case("y") {
                    self.requests.push(Request::DeleteProject { project_id });
                }
            }
            PromptKind::NarrativeText => match validate::narrative(&value) {
                Ok(text) => self.start_job(JobRequest::Text(text.to_string())),
                Err(e) => {
                    self.flash_error(e.to_string());
                    self.prompt = Some(Prompt::with_value(PromptKind::NarrativeText, value));
                }
            },
            PromptKind::AudioPath => {
                if let Some(path) = self.existing_file(&value) {
                    self.start_job(JobRequest::Audio(path));
                }
            }
            PromptKind::VideoPath => {
                if let Some(path) = self.existing_file(&value) {
                    self.start_job(JobRequest::Video(path));
                }
            }
            PromptKind::ChapterTitle { chapter_id } => {
                self.edit(ChapterEdit::UpdateText {
                    chapter_id,
                    title: Some(value),
                    content: None,
                });
            }
            PromptKind::CoverTitle => {
                self.edit(ChapterEdit::Cover {
                    title: Some(value),
                    subtitle: None,
                });
            }
            PromptKind::ImagePath { chapter_id } => {
                let Some(project_id) = self.projector.project_id().map(str::to_string) else {
                    return;
                };
                if let Some(path) = self.existing_file(&value) {
                    self.requests.push(Request::UploadImage {
                        project_id,
                        chapter_id,
                        path,
                    });
                }
            }
            PromptKind::DownloadPath { url } => {
                if value.is_empty() {
                    return;
                }
                self.requests.push(Request::Download {
                    url,
                    dest: expand_home(&value),
                });
            }
        }
    }

    fn existing_file(&mut self, raw: &str) -> Option<PathBuf> {
        let path = expand_home(raw);
        if path.is_file() {
            Some(path)
        } else {
            self.flash_error(format!("No such file: {}", path.display()));
            None
        }
    }

    fn prompt_download(&mut self) {
        let Some(project) = self.projector.project() else {
            return;
        };
        let Some(url) = project.pdf_url.clone().or_else(|| self.celebration.clone()) else {
            self.flash_error("No PDF yet; press p to publish");
            return;
        };
        let dest = self.download_dir.join(format!("{}.pdf", project.file_stem()));
        self.prompt = Some(Prompt::with_value(
            PromptKind::DownloadPath { url },
            dest.display().to_string(),
        ));
    }

    fn signed_in(&mut self, user: User) {
        self.user = Some(user);
        self.form.reset();
        self.screen = Screen::Dashboard;
        self.requests.push(Request::ListProjects);
    }

    fn open_project(&mut self, project: ProjectView) {
        let project_id = project.id.clone();
        self.projector.open(project);
        self.chapter_cursor = 0;
        self.celebration = None;
        self.last_job = None;
        self.screen = Screen::Project;
        self.requests.push(Request::Watch {
            project_id: project_id.clone(),
        });
        self.requests.push(Request::FetchProject {
            project_id,
            ticket: self.projector.refresh_ticket(),
        });
    }

    fn leave_project(&mut self) {
        if let Some(project_id) = self.projector.project_id().map(str::to_string) {
            self.requests.push(Request::Unwatch { project_id });
        }
        self.projector.close();
        self.celebration = None;
        self.screen = Screen::Dashboard;
        self.requests.push(Request::ListProjects);
    }

    fn request_refresh(&mut self) {
        if let Some(project_id) = self.projector.project_id().map(str::to_string) {
            self.requests.push(Request::FetchProject {
                project_id,
                ticket: self.projector.refresh_ticket(),
            });
        }
    }

    fn start_job(&mut self, request: JobRequest) {
        let Some(project_id) = self.projector.project_id().map(str::to_string) else {
            return;
        };
        if let Some(job) = self.job_in_flight {
            self.flash_error(format!("Still starting {job:?}"));
            return;
        }
        let job = request.job();
        self.projector.begin_job(job);
        self.job_in_flight = Some(job);
        self.last_job = Some(request.clone());
        self.requests.push(Request::StartJob {
            project_id,
            job: request,
        });
    }

    fn retry(&mut self) {
        if !self.projector.is_errored() {
            return;
        }
        match self.last_job.clone() {
            Some(request) => self.start_job(request),
            None => self.projector.retry(),
        }
    }

    /// Apply an edit locally and queue the save. Returns whether it applied.
    fn edit(&mut self, edit: ChapterEdit) -> bool {
        match self.projector.apply_edit(edit) {
            Ok(pending) => {
                if let Some(project) = self.projector.project() {
                    self.requests.push(Request::SaveEdit {
                        project: project.clone(),
                        pending,
                    });
                }
                self.chapter_cursor = self.chapter_cursor.min(self.chapter_count().saturating_sub(1));
                true
            }
            Err(e) => {
                self.flash_error(e.to_string());
                false
            }
        }
    }

    fn handle_outcome(&mut self, outcome: Outcome) {
        for effect in outcome.effects {
            match effect {
                Effect::Refresh => self.request_refresh(),
                Effect::ShowChapters => {
                    if self.screen == Screen::Chapter {
                        self.screen = Screen::Project;
                    }
                    self.chapter_cursor = 0;
                }
                Effect::Celebrate { pdf_url } => {
                    self.flash("Your book is ready! Press D to download it");
                    self.celebration = Some(pdf_url);
                }
            }
        }
    }

    /// Process a backend event and update model state.
    pub fn handle_backend_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::SignedIn(user) => {
                if self.user.is_none() {
                    self.signed_in(user);
                }
            }
            BackendEvent::SignedOut => {
                let requested = std::mem::take(&mut self.signing_out);
                if self.user.take().is_some() && !requested {
                    self.flash_error("Session expired, please sign in again");
                }
                self.projector.close();
                self.projects.clear();
                self.dashboard_cursor = 0;
                self.prompt = None;
                self.celebration = None;
                self.job_in_flight = None;
                self.push = PushState::Offline;
                self.screen = Screen::SignIn;
            }
            BackendEvent::SignInFailed(error) => {
                self.form.busy = false;
                self.form.error = Some(error);
            }
            BackendEvent::Projects(projects) => {
                self.projects = projects;
                self.dashboard_cursor = self
                    .dashboard_cursor
                    .min(self.projects.len().saturating_sub(1));
            }
            BackendEvent::ProjectCreated(project) => {
                self.projects.insert(0, project.clone());
                self.dashboard_cursor = 0;
                self.open_project(project);
            }
            BackendEvent::ProjectDeleted { project_id } => {
                self.projects.retain(|p| p.id != project_id);
                self.dashboard_cursor = self
                    .dashboard_cursor
                    .min(self.projects.len().saturating_sub(1));
                self.flash("Story deleted");
            }
            BackendEvent::ProjectFetched { project, ticket } => {
                if let Some(slot) = self.projects.iter_mut().find(|p| p.id == project.id) {
                    *slot = project.clone();
                }
                let outcome = self.projector.refresh(project, ticket);
                self.chapter_cursor = self.chapter_cursor.min(self.chapter_count().saturating_sub(1));
                self.handle_outcome(outcome);
            }
            BackendEvent::JobAccepted { job, message } => {
                if self.job_in_flight == Some(job) {
                    self.job_in_flight = None;
                }
                if message.is_empty() {
                    self.flash(format!("{job:?} started"));
                } else {
                    self.flash(message);
                }
            }
            BackendEvent::JobFailed { job, error } => {
                if self.job_in_flight == Some(job) {
                    self.job_in_flight = None;
                }
                self.projector.abandon_job();
                self.flash_error(error);
            }
            BackendEvent::EditSaved { pending } => self.projector.confirm(pending),
            BackendEvent::EditFailed { pending, error } => {
                let outcome = self.projector.rollback(pending);
                self.chapter_cursor = self.chapter_cursor.min(self.chapter_count().saturating_sub(1));
                self.handle_outcome(outcome);
                self.flash_error(format!("Edit not saved: {error}"));
            }
            BackendEvent::ImageUploaded {
                chapter_id,
                image_url,
            } => {
                if self.edit(ChapterEdit::AttachImage {
                    chapter_id,
                    image_url,
                }) {
                    self.flash("Image attached");
                }
            }
            BackendEvent::Downloaded { dest, bytes } => {
                self.flash(format!("Saved {bytes} bytes to {}", dest.display()));
            }
            BackendEvent::Push(notice) => self.handle_push(notice),
            BackendEvent::Failed { context, error } => {
                self.flash_error(format!("{context}: {error}"));
            }
        }
    }

    fn handle_push(&mut self, notice: PushNotice) {
        match notice {
            PushNotice::Connected { .. } => {
                let was_down = self.push != PushState::Connected && self.push != PushState::Offline;
                self.push = PushState::Connected;
                // Events may have been missed while reconnecting.
                if was_down {
                    self.request_refresh();
                }
            }
            PushNotice::Event(PushEvent::Progress(update)) => {
                let outcome = self.projector.apply(&update);
                self.handle_outcome(outcome);
            }
            PushNotice::Event(PushEvent::Transcript(fragment)) => {
                self.projector.apply_transcript(&fragment);
            }
            PushNotice::Acknowledged { event, error } => {
                if let Some(error) = error {
                    self.flash_error(format!("{event}: {error}"));
                }
            }
            PushNotice::Reconnecting { attempt, .. } => {
                self.push = PushState::Reconnecting { attempt };
            }
            PushNotice::Disconnected { reason } => {
                self.flash_error(format!("Live updates stopped: {reason}"));
                self.push = PushState::Disconnected(reason);
            }
        }
    }

    /// Render the current screen.
    pub fn view(&self, f: &mut ratatui::Frame) {
        match self.screen {
            Screen::SignIn => crate::view::signin::render(f, self),
            Screen::Dashboard => crate::view::dashboard::render(f, self),
            Screen::Project => crate::view::project::render(f, self),
            Screen::Chapter => crate::view::chapter::render(f, self),
        }

        if let Some(prompt) = &self.prompt {
            crate::view::prompt::render(f, prompt, &self.theme);
        }
        if self.show_help {
            crate::view::help::render(f, &self.theme);
        }
    }
}

fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map_or_else(|| PathBuf::from(raw), |home| home.join(rest)),
        None => PathBuf::from(raw),
    }
}

/// File-name friendly form of a title.
#[cfg(test)]
mod tests {
    use super::*;
    use vansh_core::{Chapter, ProgressEvent, ProgressUpdate, ProjectStatus};

    fn user() -> User {
        User {
            id: "u1".into(),
            name: "Asha".into(),
            email: "asha@example.com".into(),
        }
    }

    fn project() -> ProjectView {
        let mut p = ProjectView::new("p1", "Grandpa");
        p.status = ProjectStatus::ChaptersReady;
        p.transcript = "Hello world.".into();
        p.chapters = vec![
            Chapter::new("c1", "Roots", "Village."),
            Chapter::new("c2", "Rivers", "Crossing."),
            Chapter::new("c3", "Harvest", "Fields."),
        ];
        p
    }

    fn signed_in_app() -> App {
        let mut app = App::new(Some(user()), ConflictPolicy::LastWriteWins, PathBuf::from("/tmp"));
        app.take_requests();
        app.handle_backend_event(BackendEvent::Projects(vec![project()]));
        app
    }

    fn opened_app() -> App {
        let mut app = signed_in_app();
        app.update(Action::DrillIn);
        app.take_requests();
        app
    }

    #[test]
    fn starts_on_sign_in_without_a_session() {
        let mut app = App::new(None, ConflictPolicy::default(), PathBuf::from("."));
        assert_eq!(app.screen, Screen::SignIn);
        assert!(app.is_typing());
        assert!(app.take_requests().is_empty());
    }

    #[test]
    fn sign_in_form_validates_before_sending() {
        let mut app = App::new(None, ConflictPolicy::default(), PathBuf::from("."));
        for c in "not-an-email".chars() {
            app.update(Action::Input(c));
        }
        app.update(Action::Submit);
        assert!(app.form.error.is_some());
        assert!(app.take_requests().is_empty());

        app.form.email = "asha@example.com".into();
        app.update(Action::NextField);
        for c in "hunter22".chars() {
            app.update(Action::Input(c));
        }
        app.update(Action::Submit);
        let requests = app.take_requests();
        assert!(matches!(
            requests.as_slice(),
            [Request::Login { email, password }] if email == "asha@example.com" && password == "hunter22"
        ));

        // A second submit while the first is in flight is ignored.
        app.update(Action::Submit);
        assert!(app.take_requests().is_empty());

        app.handle_backend_event(BackendEvent::SignedIn(user()));
        assert_eq!(app.screen, Screen::Dashboard);
        assert!(app.form.password.is_empty());
        assert!(matches!(app.take_requests().as_slice(), [Request::ListProjects]));
    }

    #[test]
    fn opening_a_project_watches_and_fetches() {
        let mut app = signed_in_app();
        app.update(Action::DrillIn);
        assert_eq!(app.screen, Screen::Project);
        assert_eq!(app.projector.project_id(), Some("p1"));
        let requests = app.take_requests();
        assert!(matches!(&requests[0], Request::Watch { project_id } if project_id == "p1"));
        assert!(matches!(&requests[1], Request::FetchProject { project_id, .. } if project_id == "p1"));

        app.update(Action::NavigateBack);
        assert_eq!(app.screen, Screen::Dashboard);
        assert!(app.projector.project().is_none());
        let requests = app.take_requests();
        assert!(matches!(&requests[0], Request::Unwatch { project_id } if project_id == "p1"));
    }

    #[test]
    fn progress_events_drive_the_tracker() {
        let mut app = opened_app();
        app.update(Action::GeneratePdf);
        assert_eq!(app.job_in_flight, Some(Job::Pdf));
        assert!(matches!(
            app.take_requests().as_slice(),
            [Request::StartJob { job: JobRequest::Pdf, .. }]
        ));

        // A second start while the first is in flight is refused.
        app.update(Action::GeneratePdf);
        assert!(app.take_requests().is_empty());

        app.handle_backend_event(BackendEvent::JobAccepted {
            job: Job::Pdf,
            message: "PDF generation started".into(),
        });
        assert_eq!(app.job_in_flight, None);

        app.handle_backend_event(BackendEvent::Push(PushNotice::Event(PushEvent::Progress(
            ProgressUpdate::new("p1", 40, "Laying out pages", ProgressEvent::GeneratingPdf),
        ))));
        assert!(app.projector.in_progress());
        assert_eq!(app.projector.percent(), 40);

        app.handle_backend_event(BackendEvent::Push(PushNotice::Event(PushEvent::Progress(
            ProgressUpdate::new(
                "p1",
                100,
                "done",
                ProgressEvent::PdfReady {
                    pdf_url: "/api/unguided/pdf/p1.pdf".into(),
                },
            ),
        ))));
        assert_eq!(app.celebration.as_deref(), Some("/api/unguided/pdf/p1.pdf"));

        app.update(Action::Download);
        match &app.prompt {
            Some(Prompt {
                kind: PromptKind::DownloadPath { url },
                buffer,
            }) => {
                assert_eq!(url, "/api/unguided/pdf/p1.pdf");
                assert_eq!(buffer, "/tmp/grandpa.pdf");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn chapters_open_again_once_the_pdf_is_ready() {
        let mut app = opened_app();
        app.update(Action::GeneratePdf);
        app.handle_backend_event(BackendEvent::JobAccepted {
            job: Job::Pdf,
            message: String::new(),
        });
        app.handle_backend_event(BackendEvent::Push(PushNotice::Event(PushEvent::Progress(
            ProgressUpdate::new("p1", 40, "Laying out pages", ProgressEvent::GeneratingPdf),
        ))));
        app.update(Action::DrillIn);
        assert_eq!(app.screen, Screen::Project);

        app.handle_backend_event(BackendEvent::Push(PushNotice::Event(PushEvent::Progress(
            ProgressUpdate::new(
                "p1",
                100,
                "done",
                ProgressEvent::PdfReady {
                    pdf_url: "/api/unguided/pdf/p1.pdf".into(),
                },
            ),
        ))));
        assert!(!app.projector.in_progress());
        app.update(Action::DrillIn);
        assert_eq!(app.screen, Screen::Chapter);
    }

    #[test]
    fn failed_start_accepts_later_events() {
        let mut app = opened_app();
        app.update(Action::GenerateAllImages);
        app.handle_backend_event(BackendEvent::JobFailed {
            job: Job::AllImages,
            error: "rate limited".into(),
        });
        assert_eq!(app.job_in_flight, None);

        app.handle_backend_event(BackendEvent::Push(PushNotice::Event(PushEvent::Progress(
            ProgressUpdate::new(
                "p1",
                80,
                "Chapter drafted",
                ProgressEvent::ChapterReady {
                    chapter: Some(Chapter::new("n1", "Roots", "Village.")),
                    index: Some(0),
                },
            ),
        ))));
        assert_eq!(app.projector.draft_preview().len(), 1);
    }

    #[test]
    fn failed_edit_rolls_back() {
        let mut app = opened_app();
        app.update(Action::MoveDown);
        app.update(Action::ToggleLock);
        assert!(app.projector.project().is_some_and(|p| p.chapters[1].locked));
        let pending = match app.take_requests().pop() {
            Some(Request::SaveEdit { pending, project }) => {
                assert!(project.chapters[1].locked);
                pending
            }
            other => panic!("unexpected {other:?}"),
        };

        app.handle_backend_event(BackendEvent::EditFailed {
            pending,
            error: "timeout".into(),
        });
        assert!(app.projector.project().is_some_and(|p| !p.chapters[1].locked));
        assert!(app.notice.as_ref().is_some_and(|n| n.error));
    }

    #[test]
    fn moving_a_chapter_follows_the_cursor() {
        let mut app = opened_app();
        app.update(Action::MoveChapterDown);
        assert_eq!(app.chapter_cursor, 1);
        let ids: Vec<_> = app
            .projector
            .project()
            .map(|p| p.chapters.iter().map(|c| c.id.clone()).collect())
            .unwrap_or_default();
        assert_eq!(ids, ["c2", "c1", "c3"]);

        app.update(Action::GoBottom);
        app.update(Action::MoveChapterDown);
        assert_eq!(app.chapter_cursor, 2);
    }

    #[test]
    fn locked_chapter_cannot_be_deleted() {
        let mut app = opened_app();
        app.update(Action::ToggleLock);
        app.take_requests();
        app.update(Action::DeleteChapter);
        assert_eq!(app.chapter_count(), 3);
        assert!(app.take_requests().is_empty());
        assert!(app.notice.as_ref().is_some_and(|n| n.error));
    }

    #[test]
    fn rejected_token_returns_to_sign_in() {
        let mut app = opened_app();
        app.handle_backend_event(BackendEvent::SignedOut);
        assert_eq!(app.screen, Screen::SignIn);
        assert!(app.user.is_none());
        assert!(app.projector.project().is_none());
        assert!(
            app.notice
                .as_ref()
                .is_some_and(|n| n.text.contains("expired"))
        );
    }

    #[test]
    fn short_narrative_keeps_the_prompt_open() {
        let mut app = opened_app();
        app.update(Action::SubmitText);
        if let Some(prompt) = app.prompt.as_mut() {
            prompt.buffer = "too short".into();
        }
        app.update(Action::Submit);
        assert!(app.prompt.is_some());
        assert!(app.take_requests().is_empty());
    }

    #[test]
    fn reconnect_triggers_a_refresh() {
        let mut app = opened_app();
        app.handle_backend_event(BackendEvent::Push(PushNotice::Connected { sid: "a".into() }));
        assert!(app.take_requests().is_empty());
        app.handle_backend_event(BackendEvent::Push(PushNotice::Reconnecting {
            attempt: 1,
            delay: std::time::Duration::from_millis(500),
            reason: "closed".into(),
        }));
        app.handle_backend_event(BackendEvent::Push(PushNotice::Connected { sid: "b".into() }));
        assert!(matches!(
            app.take_requests().as_slice(),
            [Request::FetchProject { .. }]
        ));
    }

    #[test]
    fn notices_expire() {
        let mut app = signed_in_app();
        app.flash("hello");
        for _ in 0..NOTICE_TICKS {
            app.update(Action::Tick);
        }
        assert!(app.notice.is_none());
    }
}
