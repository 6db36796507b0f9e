use super::*;
use crate::Config;
use crate::catalog::{CatalogFrontEnd, SearchSummary};
use crate::fetcher::BoundedFetcher;
use crate::jobs::{CbzRequest, JobSnapshot};
use crate::pipeline::{ComicMetadata, Passthrough, ResolvedVolume, VolumeSource};
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

/// Catalog answering from memory, no network
struct FakeCatalog;

#[async_trait]
impl VolumeSource for FakeCatalog {
    async fn resolve(&self, request: &CbzRequest) -> Result<ResolvedVolume> {
        if request.volume_name == "missing" {
            return Err(Error::Resolution(format!(
                "volume {} not found for manga {} ({})",
                request.volume_name, request.manga_id, request.language
            )));
        }
        Ok(ResolvedVolume {
            metadata: ComicMetadata {
                descriptor: "<ComicInfo><Series>Fake</Series></ComicInfo>".into(),
                comment: "{\"ComicBookInfo/1.0\":{}}".into(),
            },
            entries: Vec::new(),
        })
    }
}

#[async_trait]
impl CatalogFrontEnd for FakeCatalog {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchSummary>> {
        Ok((0..max_results)
            .map(|i| SearchSummary {
                title: format!("{} #{}", query, i),
                manga_id: format!("m{}", i),
                authors: vec!["Author".into()],
                cover_url: String::new(),
            })
            .collect())
    }

    async fn manga_page(&self, manga_id: &str) -> Result<String> {
        Ok(format!("<html><body>{}</body></html>", manga_id))
    }
}

struct TestApp {
    router: Router,
    _dir: TempDir,
}

fn test_app(configure: impl FnOnce(&mut Config)) -> TestApp {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.jobs.artifact_dir = dir.path().join("cbz");
    config.jobs.thumbnail_dir = dir.path().join("thumbs");
    config.jobs.wait_timeout = Duration::from_secs(5);
    configure(&mut config);

    let fetcher = BoundedFetcher::with_client(reqwest::Client::new(), 2, Duration::from_secs(1));
    let catalog = Arc::new(FakeCatalog);
    let engine = CbzEngine::with_collaborators(
        config,
        fetcher,
        catalog.clone(),
        catalog,
        Arc::new(Passthrough),
    )
    .unwrap();

    TestApp {
        router: create_router(Arc::new(engine)),
        _dir: dir,
    }
}

fn get_from(uri: &str, peer: &str) -> Request<Body> {
    let mut request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
    request
}

fn get(uri: &str) -> Request<Body> {
    get_from(uri, "127.0.0.1:40000")
}

async fn send(app: &TestApp, request: Request<Body>) -> Response {
    app.router.clone().oneshot(request).await.unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn to_cbz_uri(volume: &str) -> String {
    format!(
        "/to_cbz?manga_id=m1&language=en&volume_name={}&chapter_names={}&prefix=Series&part=0",
        volume,
        urlencoding::encode(r#"["1","2"]"#)
    )
}

async fn poll_until_done(app: &TestApp, task_id: &str) -> serde_json::Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let response = send(app, get(&format!("/task/{}/status", task_id))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let snapshot: serde_json::Value = json_body(response).await;
        let status = snapshot["status"].as_str().unwrap().to_string();
        if status == "completed" || status.starts_with("error: ") {
            return snapshot;
        }
        assert!(tokio::time::Instant::now() < deadline, "task never finished");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app(|_| {});
    let response = send(&app, get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let health: serde_json::Value = json_body(response).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(health["bridge_running"], true);
    assert_eq!(health["jobs"]["completed"], 0);
}

#[tokio::test]
async fn test_non_loopback_callers_get_empty_404() {
    let app = test_app(|_| {});

    for uri in ["/health", "/search?q=x&max_results=1", &to_cbz_uri("1")] {
        let response = send(&app, get_from(uri, "192.168.1.20:51000")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        assert!(body_bytes(response).await.is_empty());
    }
}

#[tokio::test]
async fn test_callers_without_peer_address_get_404() {
    let app = test_app(|_| {});
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ipv6_loopback_is_accepted() {
    let app = test_app(|_| {});
    let response = send(&app, get_from("/health", "[::1]:40000")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_search_returns_summaries() {
    let app = test_app(|_| {});
    let response = send(&app, get("/search?q=one%20piece&max_results=2")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let results: Vec<SearchSummary> = json_body(response).await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].title, "one piece #0");
    assert_eq!(results[1].manga_id, "m1");
}

#[tokio::test]
async fn test_search_with_missing_parameters_is_404() {
    let app = test_app(|_| {});
    for uri in ["/search?q=x", "/search?max_results=3", "/search?q=x&max_results=lots"] {
        let response = send(&app, get(uri)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        assert!(body_bytes(response).await.is_empty());
    }
}

#[tokio::test]
async fn test_manga_page_is_html() {
    let app = test_app(|_| {});
    let response = send(&app, get("/manga/abc-123")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.contains("abc-123"));
}

#[tokio::test]
async fn test_to_cbz_with_malformed_parameters_is_404() {
    let app = test_app(|_| {});
    let bad = [
        "/to_cbz?manga_id=m1&language=en&volume_name=1&prefix=S",
        "/to_cbz?manga_id=m1&language=en&volume_name=1&chapter_names=1,2&prefix=S",
        "/to_cbz?language=en&volume_name=1&chapter_names=%5B%5D&prefix=S",
    ];
    for uri in bad {
        let response = send(&app, get(uri)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn test_to_cbz_poll_and_download() {
    let app = test_app(|_| {});

    let response = send(&app, get(&to_cbz_uri("1"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let first: JobSnapshot = json_body(response).await;
    assert_eq!(first.task_id.len(), 64);
    assert!(
        ["scheduled", "running", "completed"].contains(&first.status.as_str()),
        "{}",
        first.status
    );

    // Repeating the call names the same task
    let again: JobSnapshot = json_body(send(&app, get(&to_cbz_uri("1"))).await).await;
    assert_eq!(again.task_id, first.task_id);

    let done = poll_until_done(&app, &first.task_id).await;
    assert_eq!(done["status"], "completed");
    let url = done["url"].as_str().unwrap().to_string();
    assert_eq!(url, format!("/download/{}", first.task_id));

    let response = send(&app, get(&url)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "application/zip");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Series.1.0.en.m1.cbz\""
    );
    let body = body_bytes(response).await;
    assert_eq!(
        headers[header::CONTENT_LENGTH].to_str().unwrap(),
        body.len().to_string()
    );
    assert!(body.starts_with(b"PK"));
}

#[tokio::test]
async fn test_failed_job_is_reported_through_polling() {
    let app = test_app(|_| {});

    let first: JobSnapshot = json_body(send(&app, get(&to_cbz_uri("missing"))).await).await;
    let done = poll_until_done(&app, &first.task_id).await;

    assert_eq!(
        done["status"],
        "error: volume missing not found for manga m1 (en)"
    );
    assert!(done.get("url").is_none());
}

#[tokio::test]
async fn test_status_of_unknown_tasks() {
    let app = test_app(|_| {});
    let never_submitted = "0".repeat(64);

    for id in [never_submitted.as_str(), "not-a-task"] {
        let response = send(&app, get(&format!("/task/{}/status", id))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let snapshot: serde_json::Value = json_body(response).await;
        assert_eq!(snapshot["task_id"], id);
        assert_eq!(snapshot["status"], "unknown task");
    }
}

#[tokio::test]
async fn test_download_of_unknown_task_is_404() {
    let app = test_app(|_| {});
    for id in ["f".repeat(64), "..%2F..%2Fetc%2Fpasswd".to_string()] {
        let response = send(&app, get(&format!("/download/{}", id))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{id}");
    }
}

#[tokio::test]
async fn test_openapi_endpoint() {
    let app = test_app(|_| {});
    let response = send(&app, get("/openapi.json")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let doc: serde_json::Value = json_body(response).await;
    assert!(doc["paths"]["/to_cbz"].is_object());
}

#[tokio::test]
async fn test_cors_enabled() {
    let app = test_app(|config| config.api.cors_enabled = true);

    let mut request = get("/health");
    request
        .headers_mut()
        .insert("Origin", "http://localhost:3000".parse().unwrap());
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}

#[tokio::test]
async fn test_api_server_serves_real_connections() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.jobs.artifact_dir = dir.path().join("cbz");
    config.jobs.thumbnail_dir = dir.path().join("thumbs");
    let fetcher = BoundedFetcher::with_client(reqwest::Client::new(), 2, Duration::from_secs(1));
    let catalog = Arc::new(FakeCatalog);
    let engine = Arc::new(
        CbzEngine::with_collaborators(config, fetcher, catalog.clone(), catalog, Arc::new(Passthrough))
            .unwrap(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(serve_listener(listener, engine, async {
        stop_rx.await.ok();
    }));

    let health: serde_json::Value = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
