//! Thin client for the backend's JSON/multipart HTTP API.
//!
//! Every authenticated call carries the session's bearer token. A 401 on an
//! authenticated call clears the session through [`SessionContext::expire`]
//! so the shell falls back to sign-in.

use std::path::Path;

use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use vansh_core::validate::{self, MediaKind};
use vansh_core::{Chapter, ChapterEdit, InputType, ProjectStatus, ProjectView, User};

use crate::backoff::parse_retry_after;
use crate::config::Config;
use crate::error::ApiError;
use crate::session::{Session, SessionContext};

#[derive(Deserialize)]
struct AuthEnvelope {
    token: String,
    user: User,
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: User,
}

#[derive(Deserialize)]
struct ProjectEnvelope {
    project: ProjectView,
}

#[derive(Deserialize)]
struct ProjectsEnvelope {
    #[serde(default)]
    projects: Vec<ProjectView>,
}

#[derive(Deserialize)]
struct ImageEnvelope {
    image_url: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Acknowledgement of a job the backend runs in the background.
#[derive(Debug, Clone, Deserialize)]
pub struct JobAccepted {
    #[serde(default)]
    pub message: String,
}

/// Partial update for `PUT /api/projects/{id}`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapters: Option<Vec<Chapter>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refined_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
}

impl ProjectPatch {
    /// The server-side write that makes an already-applied local edit durable.
    pub fn for_edit(edit: &ChapterEdit, project: &ProjectView) -> Self {
        match edit {
            ChapterEdit::Cover { .. } => Self {
                cover_title: project.cover_title.clone(),
                cover_subtitle: project.cover_subtitle.clone(),
                ..Default::default()
            },
            _ => Self {
                chapters: Some(project.chapters.clone()),
                ..Default::default()
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.cover_title.is_none()
            && self.cover_subtitle.is_none()
            && self.chapters.is_none()
            && self.transcript.is_none()
            && self.refined_text.is_none()
            && self.status.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: SessionContext,
}

impl ApiClient {
    pub fn new(config: &Config, session: SessionContext) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("vansh-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_url.clone(),
            session,
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a server-relative asset path (`/api/unguided/...`).
    pub fn absolute_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, builder: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let token = self.session.token().ok_or(ApiError::Unauthorized)?;
        Ok(builder.bearer_auth(token))
    }

    /// Map non-success statuses to [`ApiError`].
    async fn check(&self, resp: Response, authed: bool) -> Result<Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::UNAUTHORIZED && authed {
            self.session.expire();
            return Err(ApiError::Unauthorized);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(ApiError::RateLimited { retry_after });
        }
        let url = resp.url().path().to_string();
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|b| b.error.or(b.message))
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
        log::debug!("{url} -> {status}: {message}");
        Err(ApiError::Server {
            status: status.as_u16(),
            message,
        })
    }

    async fn json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        authed: bool,
    ) -> Result<T, ApiError> {
        let resp = self.check(builder.send().await?, authed).await?;
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    // ── auth ────────────────────────────────────────────────────────

    pub async fn register(&self, email: &str, password: &str, name: &str) -> Result<User, ApiError> {
        let email = validate::registration(email, password, name)?;
        let body = json!({"email": email, "password": password, "name": name.trim()});
        let auth: AuthEnvelope = self
            .json(self.http.post(self.url("/api/auth/register")).json(&body), false)
            .await?;
        self.store_session(auth)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let email = validate::email(email)?;
        let body = json!({"email": email, "password": password});
        let auth: AuthEnvelope = self
            .json(self.http.post(self.url("/api/auth/login")).json(&body), false)
            .await?;
        self.store_session(auth)
    }

    fn store_session(&self, auth: AuthEnvelope) -> Result<User, ApiError> {
        let user = auth.user.clone();
        self.session.sign_in(Session {
            token: auth.token,
            user: auth.user,
        })?;
        Ok(user)
    }

    /// Check the stored token against the server.
    pub async fn me(&self) -> Result<User, ApiError> {
        let req = self.authed(self.http.get(self.url("/api/auth/me")))?;
        let env: UserEnvelope = self.json(req, true).await?;
        Ok(env.user)
    }

    pub fn sign_out(&self) -> Result<(), ApiError> {
        Ok(self.session.sign_out()?)
    }

    // ── projects ────────────────────────────────────────────────────

    pub async fn list_projects(&self) -> Result<Vec<ProjectView>, ApiError> {
        let req = self.authed(self.http.get(self.url("/api/projects")))?;
        let env: ProjectsEnvelope = self.json(req, true).await?;
        Ok(env.projects)
    }

    pub async fn create_project(&self, title: &str, input_type: InputType) -> Result<ProjectView, ApiError> {
        let body = json!({"title": validate::project_title(title), "input_type": input_type.as_str()});
        let req = self.authed(self.http.post(self.url("/api/projects")).json(&body))?;
        let env: ProjectEnvelope = self.json(req, true).await?;
        Ok(env.project)
    }

    pub async fn get_project(&self, id: &str) -> Result<ProjectView, ApiError> {
        let req = self.authed(self.http.get(self.url(&format!("/api/projects/{id}"))))?;
        let env: ProjectEnvelope = self.json(req, true).await?;
        Ok(env.project)
    }

    pub async fn update_project(&self, id: &str, patch: &ProjectPatch) -> Result<ProjectView, ApiError> {
        let req = self.authed(
            self.http
                .put(self.url(&format!("/api/projects/{id}")))
                .json(patch),
        )?;
        let env: ProjectEnvelope = self.json(req, true).await?;
        Ok(env.project)
    }

    pub async fn delete_project(&self, id: &str) -> Result<(), ApiError> {
        let req = self.authed(self.http.delete(self.url(&format!("/api/projects/{id}"))))?;
        self.check(req.send().await?, true).await?;
        Ok(())
    }

    /// Persist an edit already applied to `project` locally.
    pub async fn save_edit(&self, project: &ProjectView, edit: &ChapterEdit) -> Result<ProjectView, ApiError> {
        self.update_project(&project.id, &ProjectPatch::for_edit(edit, project))
            .await
    }

    // ── jobs ────────────────────────────────────────────────────────

    async fn media_part(kind: MediaKind, path: &Path) -> Result<Part, ApiError> {
        let size = tokio::fs::metadata(path).await?.len();
        let extension = validate::media_file(kind, path, size)?;
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("upload.{extension}"));
        Ok(Part::bytes(bytes)
            .file_name(name)
            .mime_str(kind.mime_for(&extension))?)
    }

    async fn submit(&self, path: &str, body: serde_json::Value) -> Result<JobAccepted, ApiError> {
        let req = self.authed(self.http.post(self.url(path)).json(&body))?;
        self.json(req, true).await
    }

    async fn submit_form(&self, path: &str, form: Form) -> Result<JobAccepted, ApiError> {
        let req = self.authed(self.http.post(self.url(path)).multipart(form))?;
        self.json(req, true).await
    }

    pub async fn transcribe_audio(
        &self,
        project_id: &str,
        audio: &Path,
        auto_generate: bool,
    ) -> Result<JobAccepted, ApiError> {
        let form = Form::new()
            .part("audio", Self::media_part(MediaKind::Audio, audio).await?)
            .text("project_id", project_id.to_string())
            .text("auto_generate", auto_generate.to_string());
        self.submit_form("/api/unguided/transcribe", form).await
    }

    pub async fn upload_video(
        &self,
        project_id: &str,
        video: &Path,
        auto_generate: bool,
    ) -> Result<JobAccepted, ApiError> {
        let form = Form::new()
            .part("video", Self::media_part(MediaKind::Video, video).await?)
            .text("project_id", project_id.to_string())
            .text("auto_generate", auto_generate.to_string());
        self.submit_form("/api/unguided/upload-video", form).await
    }

    pub async fn process_text(
        &self,
        project_id: &str,
        text: &str,
        auto_generate: bool,
    ) -> Result<JobAccepted, ApiError> {
        let text = validate::narrative(text)?;
        self.submit(
            "/api/unguided/process-text",
            json!({"project_id": project_id, "text": text, "auto_generate": auto_generate}),
        )
        .await
    }

    pub async fn generate_book(&self, project_id: &str) -> Result<JobAccepted, ApiError> {
        self.submit("/api/unguided/generate-book", json!({"project_id": project_id}))
            .await
    }

    pub async fn generate_image(&self, project_id: &str, chapter: &Chapter) -> Result<JobAccepted, ApiError> {
        self.submit(
            "/api/unguided/generate-image",
            json!({
                "project_id": project_id,
                "chapter_id": chapter.id,
                "chapter_summary": chapter.image_prompt(),
            }),
        )
        .await
    }

    pub async fn generate_all_images(&self, project_id: &str) -> Result<JobAccepted, ApiError> {
        self.submit("/api/unguided/generate-all-images", json!({"project_id": project_id}))
            .await
    }

    pub async fn generate_pdf(&self, project_id: &str) -> Result<JobAccepted, ApiError> {
        self.submit("/api/unguided/generate-pdf", json!({"project_id": project_id}))
            .await
    }

    /// Upload an illustration for one chapter; returns its URL.
    pub async fn upload_image(&self, project_id: &str, chapter_id: &str, image: &Path) -> Result<String, ApiError> {
        let form = Form::new()
            .part("image", Self::media_part(MediaKind::Image, image).await?)
            .text("project_id", project_id.to_string())
            .text("chapter_id", chapter_id.to_string());
        let req = self.authed(self.http.post(self.url("/api/unguided/upload-image")).multipart(form))?;
        let env: ImageEnvelope = self.json(req, true).await?;
        Ok(env.image_url)
    }

    // ── downloads ───────────────────────────────────────────────────

    /// Stream an authenticated download to `dest`. Returns bytes written.
    pub async fn download(&self, url_or_path: &str, dest: &Path) -> Result<u64, ApiError> {
        let req = self.authed(self.http.get(self.absolute_url(url_or_path)))?;
        let resp = self.check(req.send().await?, true).await?;

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = resp.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        log::info!("downloaded {written} bytes to {}", dest.display());
        Ok(written)
    }

    pub async fn download_docx(&self, project_id: &str, dest: &Path) -> Result<u64, ApiError> {
        self.download(&format!("/api/unguided/download-docx/{project_id}"), dest)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_edit_patches_only_cover_fields() {
        let mut project = ProjectView::new("p", "Story");
        project.cover_title = Some("Roots".into());
        project.chapters = vec![Chapter::new("c1", "One", "x")];
        let patch = ProjectPatch::for_edit(
            &ChapterEdit::Cover {
                title: Some("Roots".into()),
                subtitle: None,
            },
            &project,
        );
        let v = serde_json::to_value(&patch).unwrap();
        assert_eq!(v, json!({"cover_title": "Roots"}));
    }

    #[test]
    fn chapter_edit_sends_full_chapter_set() {
        let mut project = ProjectView::new("p", "Story");
        project.chapters = vec![Chapter::new("c1", "One", "x")];
        let patch = ProjectPatch::for_edit(
            &ChapterEdit::Delete {
                chapter_id: "c0".into(),
            },
            &project,
        );
        let v = serde_json::to_value(&patch).unwrap();
        assert_eq!(v["chapters"][0]["chapter_title"], "One");
        assert!(v.get("cover_title").is_none());
        assert!(ProjectPatch::default().is_empty());
    }
}
