use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use catalog_sync::api::{create_app_state, router};
use catalog_sync::clients::{CatalogSource, CatalogSources};
use catalog_sync::config::Config;
use catalog_sync::db::Store;
use catalog_sync::domain::{ContentType, ExternalId, ScoreScale, SourceKind, TitleId};
use catalog_sync::models::ExternalMedia;
use catalog_sync::services::SyncError;
use catalog_sync::state::SharedState;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

/// Serves two anime on page 1 and nothing after it.
struct StaticSource;

fn media(id: i32, title: &str) -> ExternalMedia {
    let mut media = ExternalMedia::bare(ExternalId::new(id), ScoreScale::Ten);
    media.title_english = Some(title.to_string());
    media.score = Some(7.5);
    media.genres = Some(vec!["Comedy".to_string()]);
    media
}

#[async_trait::async_trait]
impl CatalogSource for StaticSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Jikan
    }

    fn max_page_size(&self) -> u32 {
        25
    }

    async fn fetch_page(
        &self,
        _content_type: ContentType,
        page: u32,
        _per_page: u32,
    ) -> Result<Vec<ExternalMedia>, SyncError> {
        if page == 1 {
            Ok(vec![media(20, "Naruto"), media(21, "Bleach")])
        } else {
            Ok(Vec::new())
        }
    }

    async fn fetch_one(
        &self,
        _content_type: ContentType,
        id: ExternalId,
    ) -> Result<Option<ExternalMedia>, SyncError> {
        Ok((id.value() == 20).then(|| media(20, "Naruto")))
    }
}

struct TestApp {
    app: axum::Router,
    shared: Arc<SharedState>,
}

async fn spawn_app_with(api_key: Option<&str>) -> TestApp {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.sync.default_source = SourceKind::Jikan;
    config.sync.page_delay_ms = 0;
    config.server.api_key = api_key.map(str::to_string);

    let store = Store::new("sqlite::memory:")
        .await
        .expect("Failed to open test database");
    let sources = CatalogSources::new().with(Arc::new(StaticSource));
    let shared = Arc::new(SharedState::with_parts(config, store, sources));

    let state = create_app_state(shared.clone(), None).await;
    TestApp {
        app: router(state).await,
        shared,
    }
}

async fn spawn_app() -> TestApp {
    spawn_app_with(None).await
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_live_is_public() {
    let app = spawn_app_with(Some("secret")).await;
    let (status, body) = send(&app.app, get("/api/system/health/live")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "alive");
}

#[tokio::test]
async fn health_ready_reports_sources() {
    let app = spawn_app().await;
    let (status, body) = send(&app.app, get("/api/system/health/ready")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ready"], true);
    assert_eq!(body["data"]["database"], true);
    assert_eq!(body["data"]["sources"], json!(["jikan"]));
}

#[tokio::test]
async fn sync_returns_the_bare_report() {
    let app = spawn_app().await;
    let (status, body) = send(
        &app.app,
        post_json("/api/sync", &json!({ "contentType": "anime", "maxPages": 3 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["processed"], 2);
    assert_eq!(body["created"], 2);
    assert_eq!(body["updated"], 0);
    assert_eq!(body["errors"], json!([]));
    assert_eq!(body["pagesFetched"], 2);
    assert!(body["runId"].is_string());
    assert!(body["durationMs"].is_u64());
    assert!(body.get("data").is_none());

    assert_eq!(app.shared.store.count_titles(None).await.unwrap(), 2);
}

#[tokio::test]
async fn sync_response_carries_run_and_request_ids() {
    let app = spawn_app().await;
    let mut request = post_json("/api/sync", &json!({ "contentType": "anime", "maxPages": 1 }));
    request
        .headers_mut()
        .insert("x-request-id", "client-chosen-id".parse().unwrap());

    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(headers["x-run-id"].to_str().unwrap(), body["runId"].as_str().unwrap());
    assert_eq!(headers["x-request-id"], "client-chosen-id");

    // Without one from the caller, an id is generated.
    let response = app.app.clone().oneshot(get("/api/titles/count")).await.unwrap();
    assert!(!response.headers()["x-request-id"].is_empty());
    assert!(response.headers().get("x-run-id").is_none());
}

#[tokio::test]
async fn sync_rejects_malformed_requests() {
    let app = spawn_app().await;

    let (status, body) = send(
        &app.app,
        post_json("/api/sync", &json!({ "contentType": "novel", "maxPages": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = send(
        &app.app,
        post_json("/api/sync", &json!({ "contentType": "anime", "maxPages": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app.app,
        post_json(
            "/api/sync",
            &json!({ "contentType": "anime", "maxPages": 1, "source": "anilist" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("anilist"));
}

#[tokio::test]
async fn api_key_guards_protected_routes() {
    let app = spawn_app_with(Some("secret")).await;

    let (status, _) = send(&app.app, get("/api/titles/count")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .uri("/api/titles/count")
        .header("X-Api-Key", "nope")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let header = Request::builder()
        .uri("/api/titles/count")
        .header("X-Api-Key", "secret")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.app, header).await;
    assert_eq!(status, StatusCode::OK);

    let bearer = Request::builder()
        .uri("/api/titles/count")
        .header("Authorization", "Bearer secret")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.app, bearer).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn runs_and_counts_reflect_a_sync() {
    let app = spawn_app().await;
    send(
        &app.app,
        post_json("/api/sync", &json!({ "contentType": "anime", "maxPages": 1 })),
    )
    .await;

    let (status, body) = send(&app.app, get("/api/titles/count")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "anime": 2, "manga": 0, "total": 2 }));

    let (status, body) = send(&app.app, get("/api/sync/runs?limit=5")).await;
    assert_eq!(status, StatusCode::OK);
    let runs = body["data"].as_array().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["source"], "jikan");
    assert_eq!(runs[0]["status"], "completed");
    assert_eq!(runs[0]["processed"], 2);

    let (status, _) = send(&app.app, get("/api/sync/runs?limit=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn incomplete_titles_can_be_listed_and_repaired() {
    let app = spawn_app().await;
    send(
        &app.app,
        post_json("/api/sync", &json!({ "contentType": "anime", "maxPages": 1 })),
    )
    .await;

    for external_id in [20, 21] {
        let title = app
            .shared
            .store
            .find_title(SourceKind::Jikan, ContentType::Anime, ExternalId::new(external_id))
            .await
            .unwrap()
            .unwrap();
        app.shared
            .store
            .delete_title_detail(TitleId::new(title.id))
            .await
            .unwrap();
    }

    let (status, body) = send(&app.app, get("/api/titles/incomplete?contentType=anime")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"][0]["externalId"], 20);

    let (status, _) = send(&app.app, get("/api/titles/incomplete?contentType=novel")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let repair = Request::builder()
        .method("POST")
        .uri("/api/repair")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app.app, repair).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["examined"], 2);
    assert_eq!(body["data"]["repaired"], 1);
    assert_eq!(body["data"]["missingUpstream"], 1);

    let (_, body) = send(&app.app, get("/api/titles/incomplete")).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn repair_rejects_unconfigured_source() {
    let app = spawn_app().await;
    let (status, body) = send(
        &app.app,
        post_json("/api/repair", &json!({ "source": "anilist" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn metrics_without_exporter_explains_itself() {
    let app = spawn_app().await;
    let (status, body) = send(&app.app, get("/api/metrics")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.as_str().unwrap().contains("Metrics not enabled"));
}
