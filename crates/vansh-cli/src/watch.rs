//! Live progress on the terminal: the push channel feeds a
//! [`ProgressProjector`] and its tracker drives an indicatif bar.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use vansh_client::{ApiClient, Config, PushClient, PushHandle, PushNotice};
use vansh_core::{
    ClientMessage, Effect, Job, Phase, ProgressEvent, ProgressProjector, PushEvent,
};

use crate::output;

/// When [`Watcher::follow`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Until {
    /// Only on Ctrl+C or a lost connection.
    Interrupted,
    /// After any event that ends a server job.
    AnyJobEnd,
    /// After the event that ends this particular job.
    Finished { job: Job, auto_generate: bool },
}

impl Until {
    pub fn reached(self, event: &ProgressEvent) -> bool {
        match self {
            Self::Interrupted => false,
            Self::AnyJobEnd => event.ends_job(),
            Self::Finished { job, auto_generate } => match job {
                Job::Transcription | Job::TextRefinement | Job::VideoProcessing => {
                    if auto_generate {
                        matches!(event, ProgressEvent::ChaptersComplete { .. })
                    } else {
                        matches!(event, ProgressEvent::Transcribed { .. })
                    }
                }
                Job::ChapterDraft => matches!(event, ProgressEvent::ChaptersComplete { .. }),
                Job::SingleImage => matches!(event, ProgressEvent::ImageReady { .. }),
                Job::AllImages => matches!(event, ProgressEvent::AllImagesComplete),
                Job::Pdf => matches!(event, ProgressEvent::PdfReady { .. }),
            },
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Done,
    Acknowledged {
        event: &'static str,
        error: Option<String>,
    },
}

pub struct Watcher {
    api: ApiClient,
    projector: ProgressProjector,
    push: PushHandle,
    task: JoinHandle<()>,
    notices: mpsc::UnboundedReceiver<PushNotice>,
    cancel: CancellationToken,
    bar: ProgressBar,
    last_phase: Option<Phase>,
    json: bool,
}

impl Watcher {
    /// Load the project, join its push room and wait until the channel is up.
    pub async fn connect(api: &ApiClient, config: &Config, project_id: &str, json: bool) -> Result<Self> {
        let project = api
            .get_project(project_id)
            .await
            .with_context(|| format!("loading project {project_id}"))?;
        let mut projector = ProgressProjector::new(config.conflict_policy);
        projector.open(project);

        let (tx, mut notices) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let (push, task) = PushClient::new(config, api.session().token()).spawn(tx, cancel.clone());
        push.join(project_id);

        let wait = config.request_timeout;
        loop {
            match timeout(wait, notices.recv()).await {
                Ok(Some(PushNotice::Connected { sid })) => {
                    tracing::debug!(%sid, "push channel connected");
                    break;
                }
                Ok(Some(PushNotice::Reconnecting { attempt, delay, reason })) => {
                    tracing::warn!(attempt, ?delay, %reason, "push channel retrying");
                }
                Ok(Some(PushNotice::Disconnected { reason })) => {
                    bail!("could not reach the push channel: {reason}")
                }
                Ok(Some(other)) => tracing::debug!(?other, "notice before connect"),
                Ok(None) => bail!("push channel closed before connecting"),
                Err(_) => {
                    cancel.cancel();
                    bail!("timed out connecting to the push channel after {wait:?}")
                }
            }
        }

        let bar = if json {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(100);
            bar.set_style(
                ProgressStyle::with_template("{spinner} [{bar:30}] {pos:>3}% {wide_msg}")?
                    .progress_chars("=> "),
            );
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        };

        Ok(Self {
            api: api.clone(),
            projector,
            push,
            task,
            notices,
            cancel,
            bar,
            last_phase: None,
            json,
        })
    }

    pub fn projector(&self) -> &ProgressProjector {
        &self.projector
    }

    /// Mark a job as started before its HTTP request goes out so its first
    /// events are not mistaken for stale replays.
    pub fn begin(&mut self, job: Job) {
        self.projector.begin_job(job);
        self.last_phase = None;
        self.render();
    }

    pub fn send(&self, message: ClientMessage) {
        self.push.send(message);
    }

    /// Print a line above the bar.
    pub fn println(&self, line: impl AsRef<str>) {
        if self.json {
            return;
        }
        self.bar.println(line);
    }

    /// Consume push notices until `until` is reached.
    pub async fn follow(&mut self, until: Until) -> Result<()> {
        loop {
            let notice = tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    self.bar.abandon_with_message("interrupted");
                    return Ok(());
                }
                n = self.notices.recv() => n,
            };
            let Some(notice) = notice else {
                bail!("push channel closed");
            };
            if self.handle(notice, until).await? == Flow::Done {
                return Ok(());
            }
        }
    }

    /// Consume push notices until the server acknowledges `event`.
    pub async fn acknowledged(&mut self, event: &'static str) -> Result<()> {
        loop {
            let notice = timeout(Duration::from_secs(30), self.notices.recv())
                .await
                .with_context(|| format!("no acknowledgement for {event}"))?;
            let Some(notice) = notice else {
                bail!("push channel closed");
            };
            if let Flow::Acknowledged { event: acked, error } =
                self.handle(notice, Until::Interrupted).await?
            {
                if acked != event {
                    continue;
                }
                return match error {
                    Some(e) => bail!("{event} rejected: {e}"),
                    None => Ok(()),
                };
            }
        }
    }

    /// Drain whatever is already queued without waiting.
    pub async fn pump(&mut self) -> Result<()> {
        while let Ok(notice) = self.notices.try_recv() {
            self.handle(notice, Until::Interrupted).await?;
        }
        Ok(())
    }

    pub async fn close(self) {
        self.bar.finish_and_clear();
        self.push.shutdown();
        self.cancel.cancel();
        let _ = timeout(Duration::from_secs(2), self.task).await;
    }

    async fn handle(&mut self, notice: PushNotice, until: Until) -> Result<Flow> {
        match notice {
            PushNotice::Event(PushEvent::Progress(update)) => {
                let outcome = self.projector.apply(&update);
                if let Some(reason) = outcome.ignored {
                    tracing::debug!(?reason, stage = update.event.stage(), "progress ignored");
                    return Ok(Flow::Continue);
                }
                if self.json {
                    println!(
                        "{}",
                        serde_json::json!({
                            "project_id": update.project_id,
                            "stage": update.event.stage(),
                            "progress": self.projector.percent(),
                            "message": update.message,
                        })
                    );
                }
                self.render();
                for effect in outcome.effects {
                    self.effect(effect).await;
                }
                if self.projector.is_errored() {
                    self.bar.abandon_with_message(output::err("failed"));
                    bail!("server job failed: {}", self.projector.message());
                }
                if until.reached(&update.event) {
                    self.bar.finish_with_message(output::ok("done"));
                    return Ok(Flow::Done);
                }
            }
            PushNotice::Event(PushEvent::Transcript(fragment)) => {
                let outcome = self.projector.apply_transcript(&fragment);
                if outcome.changed && fragment.is_final {
                    self.println(output::dim(&fragment.transcript));
                }
            }
            PushNotice::Acknowledged { event, error } => {
                return Ok(Flow::Acknowledged { event, error });
            }
            PushNotice::Connected { .. } => {
                self.bar.set_message("reconnected");
                self.effect(Effect::Refresh).await;
            }
            PushNotice::Reconnecting { attempt, delay, .. } => {
                self.bar.set_message(output::warn(format!(
                    "connection lost, retry {attempt} in {}s",
                    delay.as_secs()
                )));
            }
            PushNotice::Disconnected { reason } => {
                self.bar.abandon_with_message(output::err("offline"));
                bail!("push channel gave up: {reason}");
            }
        }
        Ok(Flow::Continue)
    }

    async fn effect(&mut self, effect: Effect) {
        match effect {
            Effect::Refresh => {
                let Some(id) = self.projector.project_id().map(str::to_string) else {
                    return;
                };
                let ticket = self.projector.refresh_ticket();
                match self.api.get_project(&id).await {
                    Ok(project) => {
                        self.projector.refresh(project, ticket);
                    }
                    Err(e) => tracing::warn!(error = %e, "refresh failed"),
                }
            }
            Effect::ShowChapters => {
                if let Some(project) = self.projector.project() {
                    self.println(output::bold(format!("{} chapters drafted", project.chapters.len())));
                    for (i, c) in project.chapters.iter().enumerate() {
                        self.println(format!("{:>3}. {}", i + 1, c.title));
                    }
                }
            }
            Effect::Celebrate { pdf_url } => {
                self.println(format!(
                    "{} Your book is ready: {}",
                    output::ok("★"),
                    self.api.absolute_url(&pdf_url)
                ));
            }
        }
    }

    fn render(&mut self) {
        let tracker = self.projector.tracker();
        let active = tracker.active();
        if let (Some(prev), Some(now)) = (self.last_phase, active) {
            if prev != now && !self.json {
                self.bar.println(output::tracker_line(&tracker));
            }
        }
        if active.is_some() {
            self.last_phase = active;
        }
        self.bar.set_position(u64::from(tracker.percent));
        let label = active.map(Phase::label).unwrap_or("");
        self.bar.set_message(format!("{label} {}", tracker.message));
    }
}
