use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use vansh_client::{ApiClient, ApiError, Config, JobAccepted, PushClient, PushHandle, Session};

use crate::tui_event::{BackendEvent, JobRequest, Request};

/// Longest server-requested pause honored before retrying a job start.
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(10);

/// Owns the API client and the push subscription on behalf of the TUI.
///
/// Requests are served concurrently: each one runs in its own task and
/// reports back over the event channel. Joining and leaving push rooms is
/// handled inline since it only touches the push handle.
pub struct Backend {
    api: ApiClient,
    config: Config,
    events: mpsc::UnboundedSender<BackendEvent>,
    cancel: CancellationToken,
    push: Option<PushHandle>,
    watched: Option<String>,
    auto_generate: bool,
}

impl Backend {
    pub fn new(
        api: ApiClient,
        config: Config,
        events: mpsc::UnboundedSender<BackendEvent>,
        cancel: CancellationToken,
        auto_generate: bool,
    ) -> Self {
        Self {
            api,
            config,
            events,
            cancel,
            push: None,
            watched: None,
            auto_generate,
        }
    }

    /// Serve requests until cancelled or the TUI drops its sender.
    pub async fn run(mut self, mut requests: mpsc::UnboundedReceiver<Request>) {
        let mut session_rx = self.api.session().subscribe();
        let initial = session_rx.borrow_and_update().clone();
        if let Some(session) = initial {
            self.start_push(session.token);
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let session = session_rx.borrow_and_update().clone();
                    self.on_session(session);
                }
                maybe_request = requests.recv() => match maybe_request {
                    Some(request) => self.dispatch(request),
                    None => break,
                },
            }
        }
        self.stop_push();
    }

    fn on_session(&mut self, session: Option<Session>) {
        self.stop_push();
        match session {
            Some(session) => {
                tracing::info!(user = %session.user.email, "signed in");
                let _ = self.events.send(BackendEvent::SignedIn(session.user.clone()));
                self.start_push(session.token);
            }
            None => {
                tracing::info!("session cleared");
                self.watched = None;
                let _ = self.events.send(BackendEvent::SignedOut);
            }
        }
    }

    fn dispatch(&mut self, request: Request) {
        match request {
            Request::Watch { project_id } => {
                if let Some(push) = &self.push {
                    push.join(&project_id);
                }
                self.watched = Some(project_id);
            }
            Request::Unwatch { project_id } => {
                if let Some(push) = &self.push {
                    push.leave(&project_id);
                }
                if self.watched.as_deref() == Some(project_id.as_str()) {
                    self.watched = None;
                }
            }
            other => {
                let api = self.api.clone();
                let events = self.events.clone();
                let auto_generate = self.auto_generate;
                tokio::spawn(async move {
                    if let Some(event) = perform(&api, other, auto_generate).await {
                        let _ = events.send(event);
                    }
                });
            }
        }
    }

    fn start_push(&mut self, token: String) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (handle, _task) =
            PushClient::new(&self.config, Some(token)).spawn(tx, self.cancel.child_token());
        if let Some(project_id) = &self.watched {
            handle.join(project_id);
        }

        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(notice) = rx.recv().await {
                if events.send(BackendEvent::Push(notice)).is_err() {
                    break;
                }
            }
        });
        self.push = Some(handle);
    }

    fn stop_push(&mut self) {
        if let Some(push) = self.push.take() {
            push.shutdown();
        }
    }
}

/// Run one request against the API. Sign-in results arrive through the
/// session watch instead, so successful logins report nothing here.
async fn perform(api: &ApiClient, request: Request, auto_generate: bool) -> Option<BackendEvent> {
    let event = match request {
        Request::Login { email, password } => match api.login(&email, &password).await {
            Ok(_) => return None,
            Err(e) => BackendEvent::SignInFailed(e.to_string()),
        },
        Request::Register {
            name,
            email,
            password,
        } => match api.register(&email, &password, &name).await {
            Ok(_) => return None,
            Err(e) => BackendEvent::SignInFailed(e.to_string()),
        },
        Request::SignOut => match api.sign_out() {
            Ok(()) => return None,
            Err(e) => failed("sign out", e),
        },
        Request::ListProjects => match api.list_projects().await {
            Ok(projects) => BackendEvent::Projects(projects),
            Err(e) => failed("stories", e),
        },
        Request::CreateProject { title, input_type } => {
            match api.create_project(&title, input_type).await {
                Ok(project) => BackendEvent::ProjectCreated(project),
                Err(e) => failed("new story", e),
            }
        }
        Request::DeleteProject { project_id } => match api.delete_project(&project_id).await {
            Ok(()) => BackendEvent::ProjectDeleted { project_id },
            Err(e) => failed("delete", e),
        },
        Request::FetchProject { project_id, ticket } => match api.get_project(&project_id).await {
            Ok(project) => BackendEvent::ProjectFetched { project, ticket },
            Err(e) => failed("refresh", e),
        },
        Request::StartJob { project_id, job } => {
            let kind = job.job();
            let mut result = start_job(api, &project_id, job.clone(), auto_generate).await;
            if let Err(ApiError::RateLimited {
                retry_after: Some(wait),
            }) = &result
            {
                if *wait <= MAX_RATE_LIMIT_WAIT {
                    tracing::info!(?kind, ?wait, "rate limited, retrying once");
                    tokio::time::sleep(*wait).await;
                    result = start_job(api, &project_id, job, auto_generate).await;
                }
            }
            match result {
                Ok(accepted) => BackendEvent::JobAccepted {
                    job: kind,
                    message: accepted.message,
                },
                Err(e) => {
                    tracing::warn!(?kind, error = %e, "job not started");
                    BackendEvent::JobFailed {
                        job: kind,
                        error: e.to_string(),
                    }
                }
            }
        }
        Request::SaveEdit { project, pending } => match api.save_edit(&project, &pending.edit).await {
            Ok(_) => BackendEvent::EditSaved { pending },
            Err(e) => {
                tracing::warn!(error = %e, "edit not saved");
                BackendEvent::EditFailed {
                    pending,
                    error: e.to_string(),
                }
            }
        },
        Request::UploadImage {
            project_id,
            chapter_id,
            path,
        } => match api.upload_image(&project_id, &chapter_id, &path).await {
            Ok(image_url) => BackendEvent::ImageUploaded {
                chapter_id,
                image_url,
            },
            Err(e) => failed("upload", e),
        },
        Request::Download { url, dest } => match api.download(&url, &dest).await {
            Ok(bytes) => BackendEvent::Downloaded { dest, bytes },
            Err(e) => failed("download", e),
        },
        Request::Watch { .. } | Request::Unwatch { .. } => return None,
    };
    Some(event)
}

async fn start_job(
    api: &ApiClient,
    project_id: &str,
    job: JobRequest,
    auto_generate: bool,
) -> Result<JobAccepted, ApiError> {
    match job {
        JobRequest::Text(text) => api.process_text(project_id, &text, auto_generate).await,
        JobRequest::Audio(path) => api.transcribe_audio(project_id, &path, auto_generate).await,
        JobRequest::Video(path) => api.upload_video(project_id, &path, auto_generate).await,
        JobRequest::Draft => api.generate_book(project_id).await,
        JobRequest::Image(chapter) => api.generate_image(project_id, &chapter).await,
        JobRequest::AllImages => api.generate_all_images(project_id).await,
        JobRequest::Pdf => api.generate_pdf(project_id).await,
    }
}

fn failed(context: &'static str, error: ApiError) -> BackendEvent {
    tracing::warn!(context, error = %error, "request failed");
    BackendEvent::Failed {
        context,
        error: error.to_string(),
    }
}
