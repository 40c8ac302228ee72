use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use vansh_client::{ApiClient, ApiError, Config, ProjectPatch, SessionContext, SessionStore};
use vansh_core::{ChapterEdit, InputType, ProjectStatus};

const TOKEN: &str = "header.eyJzdWIiOiJ1MSJ9.sig";

#[derive(Clone, Default)]
struct Backend {
    hits: Arc<AtomicUsize>,
}

fn bearer_ok(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

fn project_doc(id: &str) -> Value {
    json!({
        "_id": id,
        "user_id": "u1",
        "title": "Grandpa",
        "input_type": "audio",
        "status": "chapters_ready",
        "transcript": "Hello world.",
        "chapters": [
            {"id": "c1", "chapter_title": "Roots", "content": "a", "locked": false,
             "image_url": null, "image_type": null}
        ],
        "cover_title": "Grandfather's Journey",
        "created_at": "2024-05-01T10:11:12",
    })
}

async fn login(State(b): State<Backend>, Json(body): Json<Value>) -> impl IntoResponse {
    b.hits.fetch_add(1, Ordering::SeqCst);
    if body["password"] == "hunter22" {
        (
            StatusCode::OK,
            Json(json!({
                "token": TOKEN,
                "user": {"id": "u1", "name": "Asha", "email": body["email"]},
            })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid email or password"})),
        )
    }
}

async fn list_projects(headers: HeaderMap) -> impl IntoResponse {
    if !bearer_ok(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "expired"})));
    }
    (StatusCode::OK, Json(json!({"projects": [project_doc("p1")]})))
}

async fn get_project(headers: HeaderMap, Path(id): Path<String>) -> impl IntoResponse {
    if !bearer_ok(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "expired"})));
    }
    if id == "p1" {
        (StatusCode::OK, Json(json!({"project": project_doc("p1")})))
    } else {
        (StatusCode::NOT_FOUND, Json(json!({"error": "Project not found"})))
    }
}

async fn put_project(Path(id): Path<String>, Json(body): Json<Value>) -> impl IntoResponse {
    let mut doc = project_doc(&id);
    if let Some(obj) = body.as_object() {
        for (k, v) in obj {
            doc[k] = v.clone();
        }
    }
    Json(json!({"message": "Project updated", "project": doc}))
}

async fn me() -> impl IntoResponse {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "Invalid or expired token"})),
    )
}

async fn process_text(State(b): State<Backend>) -> impl IntoResponse {
    b.hits.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::ACCEPTED,
        Json(json!({"message": "Text processing started"})),
    )
}

async fn generate_pdf() -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert("retry-after", "3".parse().unwrap());
    (StatusCode::TOO_MANY_REQUESTS, headers, "slow down")
}

async fn upload_image(mut multipart: Multipart) -> impl IntoResponse {
    let mut fields = Vec::new();
    let mut image_len = 0;
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let data = field.bytes().await.unwrap();
        if name == "image" {
            image_len = data.len();
        }
        fields.push(name);
    }
    fields.sort();
    Json(json!({
        "message": "Image saved successfully",
        "image_url": format!("/api/unguided/images/{}-{}.png", fields.join("+"), image_len),
    }))
}

async fn pdf(headers: HeaderMap, Path(file): Path<String>) -> impl IntoResponse {
    if !bearer_ok(&headers) {
        return (StatusCode::UNAUTHORIZED, Vec::new());
    }
    (StatusCode::OK, format!("%PDF-{file}").into_bytes())
}

async fn serve(backend: Backend) -> String {
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/projects", get(list_projects))
        .route("/api/projects/{id}", get(get_project).put(put_project))
        .route("/api/unguided/process-text", post(process_text))
        .route("/api/unguided/generate-pdf", post(generate_pdf))
        .route("/api/unguided/upload-image", post(upload_image))
        .route("/api/unguided/pdf/{file}", get(pdf))
        .with_state(backend);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn client(base: &str, dir: &tempfile::TempDir) -> ApiClient {
    let config = Config {
        api_url: base.to_string(),
        request_timeout: Duration::from_secs(5),
        ..Config::default()
    };
    let store = SessionStore::new(dir.path().join("session.json"));
    ApiClient::new(&config, SessionContext::empty(store)).unwrap()
}

#[tokio::test]
async fn login_then_fetch_projects() {
    let base = serve(Backend::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let api = client(&base, &dir);

    let user = api.login(" Asha@Example.com", "hunter22").await.unwrap();
    assert_eq!(user.email, "asha@example.com");
    assert!(dir.path().join("session.json").exists());

    let projects = api.list_projects().await.unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].status, ProjectStatus::ChaptersReady);

    let project = api.get_project("p1").await.unwrap();
    assert_eq!(project.chapters[0].title, "Roots");
    assert_eq!(project.display_title(), "Grandfather's Journey");
}

#[tokio::test]
async fn wrong_password_is_a_server_error_not_an_expiry() {
    let base = serve(Backend::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let api = client(&base, &dir);

    match api.login("asha@example.com", "nope").await {
        Err(ApiError::Server { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid email or password");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(!api.session().is_signed_in());
}

#[tokio::test]
async fn rejected_token_clears_the_session() {
    let base = serve(Backend::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let api = client(&base, &dir);
    api.login("asha@example.com", "hunter22").await.unwrap();
    let mut rx = api.session().subscribe();
    let _ = rx.borrow_and_update();

    assert!(matches!(api.me().await, Err(ApiError::Unauthorized)));
    assert!(!api.session().is_signed_in());
    assert!(rx.has_changed().unwrap());
    assert!(!dir.path().join("session.json").exists());

    // Without a session nothing is sent.
    assert!(matches!(
        api.list_projects().await,
        Err(ApiError::Unauthorized)
    ));
}

#[tokio::test]
async fn error_body_is_surfaced() {
    let base = serve(Backend::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let api = client(&base, &dir);
    api.login("asha@example.com", "hunter22").await.unwrap();

    match api.get_project("missing").await {
        Err(ApiError::Server { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "Project not found");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn short_text_never_reaches_the_server() {
    let backend = Backend::default();
    let base = serve(backend.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let api = client(&base, &dir);
    api.login("asha@example.com", "hunter22").await.unwrap();
    let before = backend.hits.load(Ordering::SeqCst);

    let err = api.process_text("p1", "too short", false).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
    assert_eq!(backend.hits.load(Ordering::SeqCst), before);

    let story = "My grandfather left his village in 1947 with nothing but a tin trunk.";
    api.process_text("p1", story, true).await.unwrap();
    assert_eq!(backend.hits.load(Ordering::SeqCst), before + 1);
}

#[tokio::test]
async fn rate_limit_reports_retry_after() {
    let base = serve(Backend::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let api = client(&base, &dir);
    api.login("asha@example.com", "hunter22").await.unwrap();

    match api.generate_pdf("p1").await {
        Err(e @ ApiError::RateLimited { .. }) => {
            assert!(e.is_transient());
            if let ApiError::RateLimited { retry_after } = e {
                assert_eq!(retry_after, Some(Duration::from_secs(3)));
            }
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn saving_a_cover_edit_round_trips() {
    let base = serve(Backend::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let api = client(&base, &dir);
    api.login("asha@example.com", "hunter22").await.unwrap();

    let mut project = api.get_project("p1").await.unwrap();
    let edit = ChapterEdit::Cover {
        title: Some("Roots and Rivers".into()),
        subtitle: None,
    };
    edit.apply(&mut project).unwrap();
    let saved = api.save_edit(&project, &edit).await.unwrap();
    assert_eq!(saved.cover_title.as_deref(), Some("Roots and Rivers"));

    let created = api
        .update_project(
            "p1",
            &ProjectPatch {
                title: Some("Renamed".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(created.title, "Renamed");
    assert_eq!(created.input_type, InputType::Audio);
}

#[tokio::test]
async fn upload_image_sends_multipart_fields() {
    let base = serve(Backend::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let api = client(&base, &dir);
    api.login("asha@example.com", "hunter22").await.unwrap();

    let image = dir.path().join("portrait.PNG");
    std::fs::write(&image, [0x89, b'P', b'N', b'G']).unwrap();
    let url = api.upload_image("p1", "c1", &image).await.unwrap();
    assert_eq!(url, "/api/unguided/images/chapter_id+image+project_id-4.png");

    let wrong = dir.path().join("portrait.bmp");
    std::fs::write(&wrong, [1]).unwrap();
    assert!(matches!(
        api.upload_image("p1", "c1", &wrong).await,
        Err(ApiError::Validation(_))
    ));
}

#[tokio::test]
async fn download_streams_to_disk() {
    let base = serve(Backend::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let api = client(&base, &dir);
    api.login("asha@example.com", "hunter22").await.unwrap();

    let dest = dir.path().join("out").join("book.pdf");
    let written = api
        .download("/api/unguided/pdf/book.pdf", &dest)
        .await
        .unwrap();
    let bytes = std::fs::read(&dest).unwrap();
    assert_eq!(written as usize, bytes.len());
    assert_eq!(bytes, b"%PDF-book.pdf");
}
