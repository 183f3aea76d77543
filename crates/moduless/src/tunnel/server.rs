//! HTTP asset server.
//!
//! ```text
//! /<outFile>            instrumented bundle
//! /<outFile>.map        its composed source map
//! /??moduless.*.js      page-side scripts
//! /??<config or dir>    test document for a project
//! /??<file.ext>         raw file
//! /<anything else>      file from disk, or 500 with an empty body
//! ```

use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;

use super::assets;
use crate::config::to_url_path;
use crate::graph::ProjectGraph;

/// Shared state of the asset router
#[derive(Debug, Clone)]
pub struct AssetState {
    graph: Arc<ProjectGraph>,
    ws_port: u16,
}

impl AssetState {
    /// State serving `graph`, pointing pages at channel port `ws_port`
    #[must_use]
    pub fn new(graph: Arc<ProjectGraph>, ws_port: u16) -> Self {
        Self { graph, ws_port }
    }
}

/// Build the asset router. Every response is marked uncacheable.
pub fn router(state: AssetState) -> Router {
    let state = Arc::new(state);
    Router::new()
        .fallback(move |uri: Uri| serve(state.clone(), uri))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        ))
}

async fn serve(state: Arc<AssetState>, uri: Uri) -> Response {
    let path = decode(uri.path());

    if let Some(specifier) = uri.query().and_then(|q| q.strip_prefix('?')) {
        let specifier = decode(specifier.trim_start_matches('?'));
        return serve_moduless(&state, &specifier).await;
    }

    if let Some(response) = serve_bundle(&state.graph, &path) {
        return response;
    }

    if path == "/favicon.ico" {
        return ok(Vec::new(), "image/x-icon");
    }
    serve_file(&path).await
}

/// Requests addressed with a double question mark
async fn serve_moduless(state: &AssetState, specifier: &str) -> Response {
    if let Some(script) = assets::fixed_asset(specifier, state.ws_port) {
        return ok(script.into_bytes(), &assets::mime_type(specifier));
    }

    let by_config = state
        .graph
        .find(Path::new(specifier))
        .filter(|p| p.config_path() == Path::new(specifier));
    if let Some(project) = by_config {
        return ok(document(&state.graph, project.id()), "text/html; charset=utf-8");
    }

    if Path::new(specifier).extension().is_some() {
        return serve_file(specifier).await;
    }

    match state.graph.find(Path::new(specifier)) {
        Some(project) => ok(document(&state.graph, project.id()), "text/html; charset=utf-8"),
        None => {
            tracing::warn!("No project found for {specifier}");
            failure()
        }
    }
}

fn document(graph: &ProjectGraph, id: crate::project::ProjectId) -> Vec<u8> {
    assets::document_html(&graph.each_script(id)).into_bytes()
}

/// A project's instrumented bundle or its source map
fn serve_bundle(graph: &ProjectGraph, path: &str) -> Option<Response> {
    for project in graph.iter() {
        let Some(out_file) = project.out_file() else {
            continue;
        };
        let bundle = to_url_path(out_file);
        if path == bundle {
            return Some(ok(
                project.instrumented_code().into_bytes(),
                &assets::mime_type(path),
            ));
        }
        if path.strip_suffix(".map") == Some(bundle.as_str()) {
            return Some(match project.source_map_json() {
                Some(json) => ok(json.into_bytes(), "application/json"),
                None => failure(),
            });
        }
    }
    None
}

async fn serve_file(path: &str) -> Response {
    match tokio::fs::read(path).await {
        Ok(contents) => ok(contents, &assets::mime_type(path)),
        Err(err) => {
            tracing::debug!("Cannot serve {path}: {err}");
            failure()
        }
    }
}

fn ok(body: Vec<u8>, mime: &str) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime)
        .body(Body::from(body))
        .unwrap_or_else(|_| failure())
}

fn failure() -> Response {
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

fn decode(text: &str) -> String {
    percent_encoding::percent_decode_str(text)
        .decode_utf8_lossy()
        .into_owned()
}
