use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use indicatif::ProgressBar;
use serde_json::json;
use vansh_client::{ApiClient, ApiError, Config, JobAccepted};
use vansh_core::{Chapter, ChapterEdit, InputType, Job, ProjectView, validate};

use crate::cli::{ChaptersCommand, ProjectsCommand};
use crate::output;
use crate::watch::{Until, Watcher};

/// Longest server-requested wait honored before retrying a job start.
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(10);

pub struct Ctx {
    pub api: ApiClient,
    pub config: Config,
    pub json: bool,
}

impl Ctx {
    fn done(&self, message: impl AsRef<str>) {
        if !self.json {
            println!("{} {}", output::ok("✓"), message.as_ref());
        }
    }
}

// ── auth ────────────────────────────────────────────────────────────

pub async fn login(ctx: &Ctx, email: &str, password: Option<String>) -> Result<()> {
    let email = validate::email(email)?;
    let password = match password {
        Some(p) => p,
        None => read_password().await?,
    };
    let user = ctx.api.login(&email, &password).await?;
    if ctx.json {
        return output::print_json(&user);
    }
    ctx.done(format!("Signed in as {} <{}>", user.name, user.email));
    Ok(())
}

pub async fn register(ctx: &Ctx, name: &str, email: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => read_password().await?,
    };
    let email = validate::registration(email, &password, name)?;
    let user = ctx.api.register(&email, &password, name.trim()).await?;
    if ctx.json {
        return output::print_json(&user);
    }
    ctx.done(format!("Welcome, {}. You are signed in.", user.name));
    Ok(())
}

pub fn logout(ctx: &Ctx) -> Result<()> {
    ctx.api.sign_out()?;
    ctx.done("Signed out");
    Ok(())
}

pub async fn whoami(ctx: &Ctx) -> Result<()> {
    let user = ctx.api.me().await.map_err(signed_in_hint)?;
    if ctx.json {
        return output::print_json(&user);
    }
    println!("{} <{}>", output::bold(&user.name), user.email);
    Ok(())
}

async fn read_password() -> Result<String> {
    eprint!("Password: ");
    std::io::stderr().flush()?;
    let line = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await??;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("no password given");
    }
    Ok(password)
}

fn signed_in_hint(e: ApiError) -> anyhow::Error {
    match e {
        ApiError::Unauthorized => anyhow!("not signed in; run `vansh login --email <you@example.com>`"),
        other => other.into(),
    }
}

// ── projects ────────────────────────────────────────────────────────

pub async fn projects(ctx: &Ctx, command: ProjectsCommand) -> Result<()> {
    match command {
        ProjectsCommand::List => {
            let mut projects = ctx.api.list_projects().await.map_err(signed_in_hint)?;
            projects.sort_by(|a, b| b.updated_at.or(b.created_at).cmp(&a.updated_at.or(a.created_at)));
            if ctx.json {
                return output::print_json(&projects);
            }
            output::project_list(&projects);
        }
        ProjectsCommand::Create { title, input_type } => {
            let title = validate::project_title(title.as_deref().unwrap_or_default());
            let project = ctx
                .api
                .create_project(&title, input_type)
                .await
                .map_err(signed_in_hint)?;
            if ctx.json {
                return output::print_json(&project);
            }
            ctx.done(format!("Created \"{}\" ({})", project.display_title(), project.id));
            println!("{}", output::dim(next_step_hint(input_type, &project.id)));
        }
        ProjectsCommand::Show { project } => {
            let project = fetch(ctx, &project).await?;
            if ctx.json {
                return output::print_json(&project);
            }
            output::project_detail(&project);
        }
        ProjectsCommand::Delete { project, yes } => {
            let view = fetch(ctx, &project).await?;
            if !yes && !confirm(&format!("Delete \"{}\" and all its chapters?", view.display_title())).await? {
                println!("{}", output::dim("Kept."));
                return Ok(());
            }
            ctx.api.delete_project(&view.id).await?;
            ctx.done(format!("Deleted \"{}\"", view.display_title()));
        }
    }
    Ok(())
}

fn next_step_hint(input_type: InputType, id: &str) -> String {
    match input_type {
        InputType::Text => format!("Next: vansh text {id} --file story.txt --watch"),
        InputType::Video => format!("Next: vansh upload-video {id} memories.mp4 --watch"),
        InputType::Audio | InputType::UploadAudio => {
            format!("Next: vansh transcribe {id} recording.m4a --watch")
        }
    }
}

async fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N] ");
    std::io::stderr().flush()?;
    let answer = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await??;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

async fn fetch(ctx: &Ctx, project_id: &str) -> Result<ProjectView> {
    ctx.api
        .get_project(project_id)
        .await
        .map_err(signed_in_hint)
        .with_context(|| format!("loading project {project_id}"))
}

// ── jobs ────────────────────────────────────────────────────────────

/// One background job and its inputs.
#[derive(Debug, Clone)]
pub enum Submit {
    Text(String),
    Audio(PathBuf),
    Video(PathBuf),
    Draft,
    Image(Chapter),
    AllImages,
    Pdf,
}

impl Submit {
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

    async fn send(&self, api: &ApiClient, project_id: &str, auto_generate: bool) -> Result<JobAccepted, ApiError> {
        match self {
            Self::Text(text) => api.process_text(project_id, text, auto_generate).await,
            Self::Audio(path) => api.transcribe_audio(project_id, path, auto_generate).await,
            Self::Video(path) => api.upload_video(project_id, path, auto_generate).await,
            Self::Draft => api.generate_book(project_id).await,
            Self::Image(chapter) => api.generate_image(project_id, chapter).await,
            Self::AllImages => api.generate_all_images(project_id).await,
            Self::Pdf => api.generate_pdf(project_id).await,
        }
    }
}

/// Narrative text from the argument, a file, or stdin.
pub async fn narrative(text: Option<String>, file: Option<PathBuf>) -> Result<String> {
    let text = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?,
        (None, None) => {
            tokio::task::spawn_blocking(|| {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf).map(|_| buf)
            })
            .await??
        }
    };
    Ok(validate::narrative(&text)?.to_string())
}

/// Start a job, optionally following it until it finishes. Returns the
/// watcher's final project when following.
pub async fn start_job(
    ctx: &Ctx,
    project_id: &str,
    submit: Submit,
    watch: bool,
    auto_generate: bool,
) -> Result<Option<ProjectView>> {
    let job = submit.job();
    let mut watcher = if watch {
        let mut w = Watcher::connect(&ctx.api, &ctx.config, project_id, ctx.json).await?;
        w.begin(job);
        Some(w)
    } else {
        None
    };

    let accepted = match send_with_retry(&ctx.api, project_id, &submit, auto_generate).await {
        Ok(accepted) => accepted,
        Err(e) => {
            if let Some(w) = watcher.take() {
                w.close().await;
            }
            return Err(signed_in_hint(e));
        }
    };
    tracing::info!(?job, project_id, "job accepted");

    let Some(mut watcher) = watcher else {
        if ctx.json {
            output::print_json(&json!({"project_id": project_id, "message": accepted.message}))?;
        } else {
            ctx.done(&accepted.message);
            println!("{}", output::dim(format!("Follow along with: vansh watch {project_id}")));
        }
        return Ok(None);
    };
    watcher.println(format!("{} {}", output::ok("✓"), accepted.message));
    let result = watcher.follow(Until::Finished { job, auto_generate }).await;
    let project = watcher.projector().project().cloned();
    watcher.close().await;
    result?;
    Ok(project)
}

async fn send_with_retry(
    api: &ApiClient,
    project_id: &str,
    submit: &Submit,
    auto_generate: bool,
) -> Result<JobAccepted, ApiError> {
    match submit.send(api, project_id, auto_generate).await {
        Err(ApiError::RateLimited {
            retry_after: Some(wait),
        }) if wait <= MAX_RATE_LIMIT_WAIT => {
            tracing::warn!(?wait, "rate limited, retrying once");
            tokio::time::sleep(wait).await;
            submit.send(api, project_id, auto_generate).await
        }
        other => other,
    }
}

pub async fn image(ctx: &Ctx, project_id: &str, chapter: &str, watch: bool) -> Result<()> {
    let project = fetch(ctx, project_id).await?;
    let chapter = project.chapters[resolve_chapter(&project, chapter)?].clone();
    if chapter.locked {
        bail!("chapter \"{}\" is locked; unlock it first", chapter.title);
    }
    start_job(ctx, project_id, Submit::Image(chapter), watch, false).await?;
    Ok(())
}

pub async fn pdf(ctx: &Ctx, project_id: &str, watch: bool, output: Option<PathBuf>) -> Result<()> {
    let watch = watch || output.is_some();
    let project = start_job(ctx, project_id, Submit::Pdf, watch, false).await?;
    if let (Some(dest), Some(project)) = (output, project) {
        let url = project
            .pdf_url
            .as_deref()
            .ok_or_else(|| anyhow!("the server did not report a PDF location"))?;
        save(ctx, url, &dest).await?;
    }
    Ok(())
}

pub async fn download(ctx: &Ctx, project_id: &str, output: Option<PathBuf>) -> Result<()> {
    let project = fetch(ctx, project_id).await?;
    let url = project
        .pdf_url
        .as_deref()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| anyhow!("no PDF yet; run `vansh pdf {project_id} --watch` first"))?;
    let dest = output.unwrap_or_else(|| PathBuf::from(format!("{}.pdf", project.file_stem())));
    save(ctx, url, &dest).await
}

pub async fn docx(ctx: &Ctx, project_id: &str, output: Option<PathBuf>) -> Result<()> {
    let project = fetch(ctx, project_id).await?;
    let dest = output.unwrap_or_else(|| PathBuf::from(format!("{}.docx", project.file_stem())));
    let spinner = spinner(ctx, &dest);
    let written = ctx.api.download_docx(&project.id, &dest).await;
    spinner.finish_and_clear();
    report_saved(ctx, &dest, written?)
}

async fn save(ctx: &Ctx, url: &str, dest: &Path) -> Result<()> {
    let spinner = spinner(ctx, dest);
    let written = ctx.api.download(url, dest).await;
    spinner.finish_and_clear();
    report_saved(ctx, dest, written?)
}

fn spinner(ctx: &Ctx, dest: &Path) -> ProgressBar {
    if ctx.json {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("downloading {}", dest.display()));
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn report_saved(ctx: &Ctx, dest: &Path, bytes: u64) -> Result<()> {
    if ctx.json {
        return output::print_json(&json!({"path": dest, "bytes": bytes}));
    }
    ctx.done(format!("Saved {} ({} KB)", dest.display(), bytes.div_ceil(1024)));
    Ok(())
}

// ── chapters ────────────────────────────────────────────────────────

/// Accept a chapter id or a 1-based position.
pub fn resolve_chapter(project: &ProjectView, key: &str) -> Result<usize> {
    if let Some(i) = project.chapter_index(key) {
        return Ok(i);
    }
    match key.parse::<usize>() {
        Ok(n) if (1..=project.chapters.len()).contains(&n) => Ok(n - 1),
        _ => bail!(
            "no chapter {key} in \"{}\" ({} chapters)",
            project.display_title(),
            project.chapters.len()
        ),
    }
}

pub async fn chapters(ctx: &Ctx, command: ChaptersCommand) -> Result<()> {
    let (project_id, chapter) = match &command {
        ChaptersCommand::Edit { project, chapter, .. }
        | ChaptersCommand::Lock { project, chapter }
        | ChaptersCommand::Unlock { project, chapter }
        | ChaptersCommand::Delete { project, chapter }
        | ChaptersCommand::Move { project, chapter, .. }
        | ChaptersCommand::AttachImage { project, chapter, .. }
        | ChaptersCommand::ClearImage { project, chapter } => (project.clone(), chapter.clone()),
    };
    let project = fetch(ctx, &project_id).await?;
    let index = resolve_chapter(&project, &chapter)?;
    let chapter_id = project.chapters[index].id.clone();

    let edit = match command {
        ChaptersCommand::Edit {
            title, content_file, ..
        } => {
            let content = match content_file {
                Some(path) => Some(
                    tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("reading {}", path.display()))?,
                ),
                None => None,
            };
            if title.is_none() && content.is_none() {
                bail!("nothing to change; pass --title and/or --content-file");
            }
            ChapterEdit::UpdateText {
                chapter_id,
                title,
                content,
            }
        }
        ChaptersCommand::Lock { .. } => ChapterEdit::SetLocked {
            chapter_id,
            locked: true,
        },
        ChaptersCommand::Unlock { .. } => ChapterEdit::SetLocked {
            chapter_id,
            locked: false,
        },
        ChaptersCommand::Delete { .. } => ChapterEdit::Delete { chapter_id },
        ChaptersCommand::Move { position, .. } => ChapterEdit::Move {
            chapter_id,
            to: position
                .checked_sub(1)
                .ok_or_else(|| anyhow!("positions start at 1"))?,
        },
        ChaptersCommand::AttachImage { image, .. } => {
            if project.chapters[index].locked {
                bail!("chapter \"{}\" is locked; unlock it first", project.chapters[index].title);
            }
            let image_url = ctx.api.upload_image(&project.id, &chapter_id, &image).await?;
            ChapterEdit::AttachImage {
                chapter_id,
                image_url,
            }
        }
        ChaptersCommand::ClearImage { .. } => ChapterEdit::ClearImage { chapter_id },
    };
    save_edit(ctx, project, edit).await
}

pub async fn cover(ctx: &Ctx, project_id: &str, title: Option<String>, subtitle: Option<String>) -> Result<()> {
    if title.is_none() && subtitle.is_none() {
        bail!("nothing to change; pass --title and/or --subtitle");
    }
    let project = fetch(ctx, project_id).await?;
    save_edit(ctx, project, ChapterEdit::Cover { title, subtitle }).await
}

async fn save_edit(ctx: &Ctx, mut project: ProjectView, edit: ChapterEdit) -> Result<()> {
    edit.apply(&mut project)?;
    let saved = ctx.api.save_edit(&project, &edit).await.map_err(signed_in_hint)?;
    if ctx.json {
        return output::print_json(&saved);
    }
    ctx.done("Saved");
    output::chapters(&saved.chapters);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> ProjectView {
        let mut p = ProjectView::new("p1", "Grandpa");
        p.chapters = vec![
            Chapter::new("c1", "Roots", "a"),
            Chapter::new("c2", "War", "b"),
            Chapter::new("3", "Home", "c"),
        ];
        p
    }

    #[test]
    fn chapters_resolve_by_id_or_position() {
        let p = project();
        assert_eq!(resolve_chapter(&p, "c2").unwrap(), 1);
        assert_eq!(resolve_chapter(&p, "1").unwrap(), 0);
        // An id wins over a position with the same spelling.
        assert_eq!(resolve_chapter(&p, "3").unwrap(), 2);
        assert!(resolve_chapter(&p, "0").is_err());
        assert!(resolve_chapter(&p, "4").is_err());
        assert!(resolve_chapter(&p, "c9").is_err());
    }

    #[test]
    fn submit_maps_to_jobs() {
        assert_eq!(Submit::Text("x".into()).job(), Job::TextRefinement);
        assert_eq!(Submit::Audio("a.wav".into()).job(), Job::Transcription);
        assert_eq!(Submit::Video("v.mp4".into()).job(), Job::VideoProcessing);
        assert_eq!(Submit::Draft.job(), Job::ChapterDraft);
        assert_eq!(Submit::Pdf.job(), Job::Pdf);
    }

    #[tokio::test]
    async fn short_narrative_is_rejected_locally() {
        let err = narrative(Some("Too short.".into()), None).await.unwrap_err();
        assert!(err.to_string().contains("50"), "{err}");

        let story = "My grandfather left his village in 1947 with nothing but a tin trunk.";
        assert_eq!(narrative(Some(format!("  {story}\n")), None).await.unwrap(), story);
    }

    #[test]
    fn hints_follow_input_type() {
        assert!(next_step_hint(InputType::Text, "p1").contains("vansh text p1"));
        assert!(next_step_hint(InputType::UploadAudio, "p1").contains("transcribe"));
    }
}
