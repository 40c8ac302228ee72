use std::path::PathBuf;

use vansh_client::PushNotice;
use vansh_core::{Chapter, InputType, Job, PendingEdit, ProjectView, RefreshTicket, User};

/// Work the TUI asks the backend task to perform.
#[derive(Debug, Clone)]
pub enum Request {
    Login {
        email: String,
        password: String,
    },
    Register {
        name: String,
        email: String,
        password: String,
    },
    SignOut,
    ListProjects,
    CreateProject {
        title: String,
        input_type: InputType,
    },
    DeleteProject {
        project_id: String,
    },
    /// Fetch a project; `ticket` is echoed back with the result.
    FetchProject {
        project_id: String,
        ticket: RefreshTicket,
    },
    /// Join the project's push room.
    Watch {
        project_id: String,
    },
    Unwatch {
        project_id: String,
    },
    StartJob {
        project_id: String,
        job: JobRequest,
    },
    SaveEdit {
        project: ProjectView,
        pending: PendingEdit,
    },
    UploadImage {
        project_id: String,
        chapter_id: String,
        path: PathBuf,
    },
    Download {
        url: String,
        dest: PathBuf,
    },
}

/// A server job plus whatever it needs to start.
#[derive(Debug, Clone)]
pub enum JobRequest {
    Text(String),
    Audio(PathBuf),
    Video(PathBuf),
    Draft,
    Image(Chapter),
    AllImages,
    Pdf,
}

impl JobRequest {
    pub fn job(&self) -> Job {
        match self {
            Self::Text(_) => Job::TextRefinement,
            Self::Audio(_) => Job::Transcription,
            Self::Video(_) => Job::VideoProcessing,
            Self::Draft => Job::ChapterDraft,
            Self::Image(_) => Job::SingleImage,
            Self::AllImages => Job::AllImages,
            Self::Pdf => Job::Pdf,
        }
    }
}

/// Events flowing from the backend task to the TUI.
#[derive(Debug, Clone)]
pub enum BackendEvent {
    SignedIn(User),
    /// The session was cleared (sign-out or a rejected token).
    SignedOut,
    SignInFailed(String),
    Projects(Vec<ProjectView>),
    ProjectCreated(ProjectView),
    ProjectDeleted {
        project_id: String,
    },
    ProjectFetched {
        project: ProjectView,
        ticket: RefreshTicket,
    },
    JobAccepted {
        job: Job,
        message: String,
    },
    JobFailed {
        job: Job,
        error: String,
    },
    EditSaved {
        pending: PendingEdit,
    },
    EditFailed {
        pending: PendingEdit,
        error: String,
    },
    ImageUploaded {
        chapter_id: String,
        image_url: String,
    },
    Downloaded {
        dest: PathBuf,
        bytes: u64,
    },
    Push(PushNotice),
    /// A transient failure worth showing in the status line.
    Failed {
        context: &'static str,
        error: String,
    },
}
