//! Handler-level tests using tower::ServiceExt::oneshot.
//!
//! Tests the full Axum router (middleware + handlers) without binding a TCP
//! listener. A wiremock server stands in for the origin so upstream calls can
//! be counted.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use hlscache::cache::EntryState;
use hlscache::config::Config;
use hlscache::server::{build_router, state::AppState};
use http_body_util::BodyExt;
use std::path::Path;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PLAYLIST: &str = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10,\nseg001.ts\n";

/// Build a test config pointing at `origin`, caching into `cache_dir`.
fn test_config(origin: &str, cache_dir: &Path, static_dir: &Path) -> Config {
    Config {
        port: 0,
        origin_url: origin.to_string(),
        is_dev: true,
        manifest_ttl_secs: 4,
        segment_ttl_secs: 60,
        sweep_interval_secs: None,
        fetch_timeout_secs: 5,
        cache_dir: cache_dir.to_path_buf(),
        static_dir: static_dir.to_path_buf(),
        user_agent: "hlscache-test".to_string(),
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ── Health endpoint ─────────────────────────────────────────────────────────

#[tokio::test]
async fn health_returns_200_with_json() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config("http://127.0.0.1:1", dir.path(), dir.path());
    let state = AppState::new(config).unwrap();
    let app = build_router(state);

    let resp = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["cached_objects"], 0);
    assert!(json["uptime_seconds"].is_number());
}

// ── Version header ──────────────────────────────────────────────────────────

#[tokio::test]
async fn all_responses_include_version_header() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config("http://127.0.0.1:1", dir.path(), dir.path());
    let state = AppState::new(config).unwrap();
    let app = build_router(state);

    let resp = app.oneshot(get("/health")).await.unwrap();
    let version = resp
        .headers()
        .get("x-hlscache-version")
        .expect("missing X-Hlscache-Version header");

    assert_eq!(version.to_str().unwrap(), env!("CARGO_PKG_VERSION"));
}

// ── Metrics endpoint ────────────────────────────────────────────────────────

#[tokio::test]
async fn metrics_without_recorder_returns_404() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config("http://127.0.0.1:1", dir.path(), dir.path());
    let state = AppState::new(config).unwrap();
    let app = build_router(state);

    let resp = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ── Cached objects ──────────────────────────────────────────────────────────

#[tokio::test]
async fn manifest_is_fetched_once_and_served_from_cache() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live/stream.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PLAYLIST))
        .expect(1)
        .mount(&origin)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&origin.uri(), dir.path(), dir.path());
    let state = AppState::new(config).unwrap();
    let registry = state.registry().clone();
    let app = build_router(state);

    for _ in 0..2 {
        let resp = app.clone().oneshot(get("/live/stream.m3u8")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/x-mpegURL"
        );

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, PLAYLIST.as_bytes());
    }

    assert_eq!(origin.received_requests().await.unwrap().len(), 1);
    assert_eq!(registry.ref_count("stream.m3u8"), Some(0));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn segment_served_with_mpeg_ts_headers() {
    let origin = MockServer::start().await;
    let payload = vec![0x47u8; 188 * 50];
    Mock::given(method("GET"))
        .and(path("/live/seg001.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .mount(&origin)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&origin.uri(), dir.path(), dir.path());
    let state = AppState::new(config).unwrap();
    let app = build_router(state);

    let resp = app.oneshot(get("/live/seg001.ts")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("content-type").unwrap(), "video/MP2T");
    assert_eq!(
        resp.headers().get("content-length").unwrap(),
        &payload.len().to_string()
    );

    let body = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.as_ref(), payload.as_slice());
}

#[tokio::test]
async fn upstream_failure_returns_bad_gateway() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&origin)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&origin.uri(), dir.path(), dir.path());
    let state = AppState::new(config).unwrap();
    let registry = state.registry().clone();
    let app = build_router(state);

    let resp = app.clone().oneshot(get("/live/seg404.ts")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

    let entry = registry.get("seg404.ts").unwrap();
    assert_eq!(entry.state(), EntryState::Failed);
    assert_eq!(registry.ref_count("seg404.ts"), Some(0));

    // Failed entries are not retried until they expire.
    let resp = app.oneshot(get("/live/seg404.ts")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn empty_upstream_body_is_an_error() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&origin)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&origin.uri(), dir.path(), dir.path());
    let state = AppState::new(config).unwrap();
    let app = build_router(state);

    let resp = app.oneshot(get("/live/stream.m3u8")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn parent_segments_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config("http://127.0.0.1:1", dir.path(), dir.path());
    let state = AppState::new(config).unwrap();
    let app = build_router(state);

    let resp = app.oneshot(get("/live/../private/seg001.ts")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn non_get_methods_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config("http://127.0.0.1:1", dir.path(), dir.path());
    let state = AppState::new(config).unwrap();
    let app = build_router(state);

    let req = Request::builder()
        .method("POST")
        .uri("/live/seg001.ts")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// ── Cache bypass ────────────────────────────────────────────────────────────

#[tokio::test]
async fn unclassified_paths_are_served_from_static_dir() {
    let origin = MockServer::start().await;
    let cache_dir = tempfile::tempdir().unwrap();
    let static_dir = tempfile::tempdir().unwrap();
    std::fs::write(static_dir.path().join("player.html"), "<video></video>").unwrap();

    let config = test_config(&origin.uri(), cache_dir.path(), static_dir.path());
    let state = AppState::new(config).unwrap();
    let registry = state.registry().clone();
    let app = build_router(state);

    let resp = app.clone().oneshot(get("/player.html")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, "<video></video>".as_bytes());

    let resp = app.oneshot(get("/missing.html")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    assert!(registry.is_empty());
    assert!(origin.received_requests().await.unwrap().is_empty());
}
