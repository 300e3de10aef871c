use crate::error::ApiError;
use ano_core::AnonError;
use ano_engine::{FilesOptions, RepositoryRegistry};
use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt, stream};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Header carrying the number of originals an ambiguous path matched
pub const AMBIGUOUS_HEADER: &str = "x-anonymization-ambiguous";

#[derive(Clone)]
struct AppState {
    registry: Arc<RepositoryRegistry>,
}

#[derive(Debug, Deserialize)]
struct FilesParams {
    #[serde(default)]
    include_sha: bool,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshParams {
    #[serde(default)]
    force: bool,
}

pub struct AnonServer;

impl AnonServer {
    pub async fn serve(registry: Arc<RepositoryRegistry>, host: &str, port: u16) -> anyhow::Result<()> {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        let app = router(registry).layer(cors);

        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&addr).await?;

        info!("Anonymized repositories served on {}", addr);

        axum::serve(listener, app).await?;

        Ok(())
    }
}

pub fn router(registry: Arc<RepositoryRegistry>) -> Router {
    Router::new()
        .route("/health", get(handle_info))
        .route("/api/repo/:repo_id/files", get(api_files))
        .route("/api/repo/:repo_id/refresh", post(api_refresh))
        .route("/r/:repo_id/*path", get(serve_file))
        .with_state(AppState { registry })
}

/// GET /health
async fn handle_info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "ano",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/repo/:repo_id/files - Anonymized tree
#[tracing::instrument(skip(state))]
async fn api_files(
    State(state): State<AppState>,
    Path(repo_id): Path<String>,
    Query(params): Query<FilesParams>,
) -> Result<Response, ApiError> {
    let repository = state.registry.get(&repo_id)?;
    let tree = repository
        .anonymized_files(&FilesOptions {
            include_sha: params.include_sha,
            path: params.path,
        })
        .await?;
    Ok(Json(tree).into_response())
}

/// POST /api/repo/:repo_id/refresh - Rebuild the snapshot if needed
#[tracing::instrument(skip(state))]
async fn api_refresh(
    State(state): State<AppState>,
    Path(repo_id): Path<String>,
    Query(params): Query<RefreshParams>,
) -> Result<Response, ApiError> {
    let repository = state.registry.get(&repo_id)?;
    let outcome = repository.refresh(params.force, None).await?;
    Ok(Json(outcome).into_response())
}

/// GET /r/:repo_id/*path - Anonymized file content
#[tracing::instrument(skip(state))]
async fn serve_file(
    State(state): State<AppState>,
    Path((repo_id, path)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let repository = state.registry.get(&repo_id)?;
    let file = repository.file(path);
    let content = file.content().await?;
    let transform = content.state();
    let size = content.size;
    let mut body = content.stream;

    // Look ahead two chunks: classification settles on the first, and a
    // missing second one means the whole file is known.
    let mut head = Vec::new();
    let mut finished = false;
    for _ in 0..2 {
        match body.try_next().await? {
            Some(chunk) => head.push(chunk),
            None => {
                finished = true;
                break;
            }
        }
    }

    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("none"));
    headers.insert(
        header::CONTENT_TYPE,
        content_type(file.extension().as_deref(), transform.is_text()),
    );
    if file.is_ambiguous() {
        headers.insert(AMBIGUOUS_HEADER, HeaderValue::from(file.candidates()));
    }
    let length = match transform.is_text() {
        Some(false) => Some(size),
        _ if finished && !transform.was_modified() => {
            Some(head.iter().map(|chunk| chunk.len() as u64).sum())
        }
        _ => None,
    };
    if let Some(length) = length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    let anonymized_path = file.anonymized_path().to_string();
    let rest = body.inspect_err(move |e| {
        tracing::error!("Stream of {}/{} failed: {}", repo_id, anonymized_path, e);
    });
    let stream = stream::iter(head.into_iter().map(Ok::<Bytes, AnonError>)).chain(rest);
    Ok((headers, Body::from_stream(stream)).into_response())
}

/// Mime type by extension, else by classification. `ts` is looked up as
/// text: its registered type is MPEG transport stream.
fn content_type(extension: Option<&str>, is_text: Option<bool>) -> HeaderValue {
    let guessed = extension
        .filter(|ext| *ext != "ts")
        .and_then(|ext| mime_guess::from_ext(ext).first());
    if let Some(mime) = guessed
        && let Ok(value) = HeaderValue::from_str(mime.as_ref())
    {
        return value;
    }
    if is_text == Some(true) {
        HeaderValue::from_static("text/plain")
    } else {
        HeaderValue::from_static("application/octet-stream")
    }
}
