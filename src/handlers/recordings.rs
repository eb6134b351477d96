//! # Recording REST API Handlers
//!
//! The HTTP surface over the recording catalog:
//! - `GET /recordings` — list records, newest first, optionally filtered by
//!   `session_id`, paged with `skip`/`limit`
//! - `GET /recordings/{filename}` — download the finished WAV
//! - `DELETE /recordings/{filename}` — remove the record and its file

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_files::NamedFile;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use tracing::error;

#[derive(Debug, Deserialize)]
pub struct ListRecordingsQuery {
    pub session_id: Option<String>,
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

pub async fn list_recordings(
    state: web::Data<AppState>,
    query: web::Query<ListRecordingsQuery>,
) -> AppResult<HttpResponse> {
    let records = state
        .catalog
        .list(query.session_id.as_deref(), query.skip, query.limit);
    Ok(HttpResponse::Ok().json(records))
}

pub async fn download_recording(
    state: web::Data<AppState>,
    filename: web::Path<String>,
) -> AppResult<NamedFile> {
    let filename = sanitize_filename(filename.into_inner())?;

    let record = state
        .catalog
        .get_by_filename(&filename)
        .ok_or_else(|| AppError::NotFound("Recording not found".to_string()))?;

    let path = recording_path(&state, &record.filename);
    if !path.exists() {
        return Err(AppError::NotFound("File not found".to_string()));
    }

    NamedFile::open(path).map_err(|e| AppError::Internal(e.to_string()))
}

pub async fn delete_recording(
    state: web::Data<AppState>,
    filename: web::Path<String>,
) -> AppResult<HttpResponse> {
    let filename = sanitize_filename(filename.into_inner())?;

    let record = state
        .catalog
        .delete(&filename)
        .ok_or_else(|| AppError::NotFound("Recording not found".to_string()))?;

    let path = recording_path(&state, &record.filename);
    if path.exists() {
        if let Err(e) = std::fs::remove_file(&path) {
            error!(filename = %record.filename, error = %e, "Failed to delete recording file");
            return Err(AppError::Internal(format!("Failed to delete file: {}", e)));
        }
    }

    Ok(HttpResponse::Ok().json(json!({
        "status": "ok",
        "filename": filename
    })))
}

fn recording_path(state: &AppState, filename: &str) -> PathBuf {
    PathBuf::from(&state.get_config().storage.recordings_dir).join(filename)
}

/// Recordings are addressed by bare filename; anything that could walk out
/// of the recordings directory is rejected.
fn sanitize_filename(filename: String) -> AppResult<String> {
    if filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
    {
        return Err(AppError::BadRequest("Invalid filename".to_string()));
    }
    Ok(filename)
}
