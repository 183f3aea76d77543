//! Asset router tests: every request class answered through `oneshot`.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use moduless::tunnel::server::{router, AssetState};
use moduless::ProjectGraph;
use tempfile::TempDir;
use tower::ServiceExt;

const WS_PORT: u16 = 4321;

fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(
        root.join("tsconfig.json"),
        r#"{
            "compilerOptions": { "outFile": "build/out.js" },
            "moduless": { "scripts": ["https://cdn.example.com/lib.js"] }
        }"#,
    )
    .unwrap();
    fs::create_dir_all(root.join("build")).unwrap();
    fs::write(
        root.join("build/out.js"),
        "function coverA() {\n    return () => true;\n}\n",
    )
    .unwrap();
    fs::write(root.join("notes.txt"), "plain text").unwrap();
    dir
}

async fn get(root: &Path, uri: &str) -> (StatusCode, String, String) {
    let graph = Arc::new(ProjectGraph::discover(root).unwrap());
    let app = router(AssetState::new(graph, WS_PORT));
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let mime = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, mime, String::from_utf8_lossy(&body).into_owned())
}

fn url(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn test_bundle_is_served_instrumented() {
    let dir = workspace();
    let (status, mime, body) = get(dir.path(), &url(&dir.path().join("build/out.js"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(mime.starts_with("text/javascript"));
    assert!(body.contains(";Moduless.addCover(coverA);"));
    assert!(body.contains("//# sourceMappingURL=out.js.map"));
}

#[tokio::test]
async fn test_source_map_is_served_beside_bundle() {
    let dir = workspace();
    let (status, mime, body) = get(dir.path(), &url(&dir.path().join("build/out.js.map"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mime, "application/json");
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(json.get("mappings").is_some());
}

#[tokio::test]
async fn test_runner_script_points_at_channel_port() {
    let dir = workspace();
    let (status, mime, body) = get(dir.path(), "/??moduless.tunnel.js").await;
    assert_eq!(status, StatusCode::OK);
    assert!(mime.starts_with("text/javascript"));
    assert!(body.contains("__wsPort__ = 4321;"));

    let (status, _, body) = get(dir.path(), "/??moduless.common.js").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("#__value_is_undefined™__#"));
}

#[tokio::test]
async fn test_document_by_config_and_by_directory() {
    let dir = workspace();
    let by_config = get(dir.path(), &format!("/??{}", url(&dir.path().join("tsconfig.json")))).await;
    let by_dir = get(dir.path(), &format!("/??{}", url(dir.path()))).await;

    for (status, mime, body) in [by_config, by_dir] {
        assert_eq!(status, StatusCode::OK);
        assert!(mime.starts_with("text/html"));
        let lines: Vec<_> = body.lines().collect();
        assert_eq!(lines[0], "<!doctype html>");
        assert_eq!(lines[1], "<script src=\"/??moduless.common.js\"></script>");
        assert_eq!(lines[2], "<script src=\"/??moduless.tunnel.js\"></script>");
        assert_eq!(lines[3], "<script src=\"https://cdn.example.com/lib.js\"></script>");
        assert!(lines[4].ends_with("/build/out.js\"></script>"));
    }
}

#[tokio::test]
async fn test_raw_file_through_double_question_mark() {
    let dir = workspace();
    let (status, mime, body) = get(dir.path(), &format!("/??{}", url(&dir.path().join("notes.txt")))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(mime.starts_with("text/plain"));
    assert_eq!(body, "plain text");
}

#[tokio::test]
async fn test_plain_file_from_disk() {
    let dir = workspace();
    let (status, _, body) = get(dir.path(), &url(&dir.path().join("notes.txt"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "plain text");
}

#[tokio::test]
async fn test_missing_file_is_500_with_empty_body() {
    let dir = workspace();
    let (status, _, body) = get(dir.path(), &url(&dir.path().join("missing.js"))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.is_empty());

    let (status, _, body) = get(dir.path(), "/??/nowhere/at/all").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_responses_are_not_cached() {
    let dir = workspace();
    let graph = Arc::new(ProjectGraph::discover(dir.path()).unwrap());
    let app = router(AssetState::new(graph, WS_PORT));
    for uri in [url(&dir.path().join("build/out.js")), "/??/nowhere/at/all".to_string()] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    }
}
