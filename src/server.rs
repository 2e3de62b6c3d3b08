//! HTTP surface: `POST /upload` accepts one archive and answers with the
//! triage report as a JSON array.

use crate::error::{Result, TriageError};
use crate::rules::RuleSet;
use crate::triage::{Pipeline, TriageConfig};
use axum::extract::multipart::{Field, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pipeline: Pipeline,
    upload_dir: PathBuf,
}

impl AppState {
    pub fn new(config: Arc<TriageConfig>, rules: Arc<RuleSet>) -> Self {
        let upload_dir = config.storage.upload_dir.clone();
        Self {
            pipeline: Pipeline::new(config, rules),
            upload_dir,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Error body `{"error": ...}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<TriageError> for ApiError {
    fn from(err: TriageError) -> Self {
        let status = match &err {
            TriageError::ArchiveOpen(_)
            | TriageError::ArchiveEntry { .. }
            | TriageError::PathTraversal { .. }
            | TriageError::BadRequest(_) => StatusCode::BAD_REQUEST,
            TriageError::ArchiveTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            // Server-side details (scratch paths, OS errors) stay in the log.
            crate::log_error!(err, "upload failed");
            return Self::new(status, INTERNAL_ERROR_MESSAGE);
        }
        warn!(error = %err, "upload rejected");
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let limit = state.pipeline.config().server.max_upload_bytes;
    Router::new()
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

async fn upload(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Response, ApiError> {
    let mut multipart =
        multipart.map_err(|e| ApiError::new(e.status(), e.body_text()))?;

    let mut saved = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(e.status(), e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Err(ApiError::new(StatusCode::BAD_REQUEST, "No selected file"));
        }
        saved = Some(save_upload(&state.upload_dir, &file_name, field).await?);
        break;
    }
    let Some(upload) = saved else {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "No file part"));
    };

    let report = state.pipeline.triage_archive(&upload).await?;
    info!(files = report.len(), "upload triaged");
    if let Err(e) = upload.close() {
        warn!(error = %e, "failed to remove upload");
    }
    Ok(Json(report).into_response())
}

/// Stream the field into a uniquely named file under `dir`.
///
/// The returned path deletes the file when dropped.
async fn save_upload(
    dir: &Path,
    file_name: &str,
    mut field: Field<'_>,
) -> std::result::Result<TempPath, ApiError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| TriageError::io_at(dir, e))?;
    let suffix = format!("-{}", secure_filename(file_name));
    let named = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(&suffix)
        .tempfile_in(dir)
        .map_err(|e| TriageError::io_at(dir, e))?;
    let (std_file, path) = named.into_parts();
    let mut out = tokio::fs::File::from_std(std_file);

    let mut written: u64 = 0;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::new(e.status(), e.body_text()))?
    {
        out.write_all(&chunk)
            .await
            .map_err(|e| TriageError::io_at(&*path, e))?;
        written += chunk.len() as u64;
    }
    out.flush().await.map_err(|e| TriageError::io_at(&*path, e))?;
    info!(name = %file_name, bytes = written, "upload received");
    Ok(path)
}

/// Reduce a client-supplied name to a safe single path component.
///
/// Keeps ASCII letters, digits, `.`, `_` and `-`; whitespace and path
/// separators become `_`; leading and trailing dots and underscores are
/// dropped. Falls back to `upload` when nothing survives.
pub fn secure_filename(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Bind and serve until Ctrl-C.
pub async fn serve(config: Arc<TriageConfig>, rules: Arc<RuleSet>) -> Result<()> {
    config.ensure_directories()?;
    let bind = config.server.bind.clone();
    let app = router(AppState::new(config, rules));
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(address = %bind, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}
