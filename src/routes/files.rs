//! File management endpoints
//!
//! - Upload a file and record its tag
//! - List stored files
//! - Download stored bytes or the `.hmac` sidecar
//! - Simulate tampering, delete one file, reset everything

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::form::FileForm;
use crate::error::{AppError, Result};
use crate::records::StoredRecord;
use crate::state::AppState;

/// Upload response
#[derive(Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    /// Stored id
    pub filename: String,
    pub original_filename: String,
    pub hmac: String,
    pub file_size: u64,
}

/// One entry of the file list
#[derive(Serialize)]
pub struct FileEntry {
    /// Stored id
    pub filename: String,
    pub original_filename: String,
    pub hmac: String,
    pub upload_time: DateTime<Utc>,
    pub file_size: u64,
}

impl From<StoredRecord> for FileEntry {
    fn from(record: StoredRecord) -> Self {
        Self {
            filename: record.stored_id,
            original_filename: record.original_filename,
            hmac: record.tag,
            upload_time: record.upload_time,
            file_size: record.file_size,
        }
    }
}

#[derive(Serialize)]
pub struct FileListResponse {
    pub files: Vec<FileEntry>,
}

#[derive(Serialize)]
pub struct TamperResponse {
    pub success: bool,
    pub message: String,
    pub original_size: u64,
    pub tampered_size: u64,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
    pub deleted_filename: String,
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub success: bool,
    pub message: String,
    pub deleted_count: usize,
}

/// Create the file management router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_file))
        .route("/files", get(list_files))
        .route("/download/:filename", get(download_file))
        .route("/download-hmac/:filename", get(download_sidecar))
        .route("/simulate-tamper/:filename", post(simulate_tamper))
        .route("/delete/:filename", delete(delete_file))
        .route("/reset-all", post(reset_all))
}

/// Upload a file and store its tag
async fn upload_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut form = FileForm::read(multipart).await?;
    let file = form.take_file()?;
    let key = form.secret_key()?;

    let record = state.service().upload(file, &key).await?;

    Ok(Json(UploadResponse {
        success: true,
        message: "File uploaded successfully".to_string(),
        filename: record.stored_id,
        original_filename: record.original_filename,
        hmac: record.tag,
        file_size: record.file_size,
    }))
}

/// List stored files that are still on disk
async fn list_files(State(state): State<AppState>) -> Result<Json<FileListResponse>> {
    let files = state
        .service()
        .list_files()
        .await?
        .into_iter()
        .map(FileEntry::from)
        .collect();

    Ok(Json(FileListResponse { files }))
}

/// Download stored bytes under their original file name
async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response> {
    let (record, data) = state.service().download(&filename).await?;
    attachment(
        guess_content_type(&record.original_filename),
        &record.original_filename,
        data,
    )
}

/// Download the `.hmac` sidecar for a stored file
async fn download_sidecar(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response> {
    let (name, text) = state.service().sidecar(&filename).await?;
    attachment("text/plain; charset=utf-8", &name, text.into_bytes())
}

/// Append a marker to a stored file
async fn simulate_tamper(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<TamperResponse>> {
    let outcome = state.service().simulate_tamper(&filename).await?;

    Ok(Json(TamperResponse {
        success: true,
        message: "File has been tampered with for educational purposes".to_string(),
        original_size: outcome.original_size,
        tampered_size: outcome.tampered_size,
    }))
}

async fn delete_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let record = state.service().delete(&filename).await?;

    Ok(Json(DeleteResponse {
        success: true,
        message: format!("File \"{}\" deleted successfully", record.original_filename),
        deleted_filename: record.stored_id,
    }))
}

async fn reset_all(State(state): State<AppState>) -> Result<Json<ResetResponse>> {
    let deleted_count = state.service().reset_all().await?;

    Ok(Json(ResetResponse {
        success: true,
        message: format!(
            "All files reset successfully. Deleted {} files.",
            deleted_count
        ),
        deleted_count,
    }))
}

fn attachment(content_type: &str, filename: &str, data: Vec<u8>) -> Result<Response> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, data.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from(data))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Guess content type from file extension
fn guess_content_type(filename: &str) -> &'static str {
    let ext = filename.rsplit('.').next().unwrap_or("");
    match ext.to_lowercase().as_str() {
        "txt" | "log" | "md" => "text/plain; charset=utf-8",
        "csv" => "text/csv",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}
