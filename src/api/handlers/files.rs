use axum::body::Body;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use super::upload_error;
use crate::api::response::{ApiError, AuthUser, MessageBody};
use crate::storage::models::{FileRecord, FileStatus};
use crate::uploads::{extension_of, IngestedFile, StagedUpload, StreamUpload};
use crate::AppState;

const OCTET_STREAM: &str = "application/octet-stream";

// ============================================================================
// Types
// ============================================================================

/// File metadata as returned to its owner. The storage path stays internal.
#[derive(Debug, Serialize, Deserialize)]
pub struct FileResponse {
    pub created_at: String,
    pub filename: String,
    pub id: String,
    pub mime_type: String,
    pub original_name: String,
    pub size: i64,
    pub status: FileStatus,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file: IngestedFile,
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let limit = state.uploads.limits().max_buffered;
    let mut upload: Option<StagedUpload> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let original_name = field
            .file_name()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or("upload")
            .to_string();

        // Content type from the part header, or guessed from the file name
        let mime_type = field
            .content_type()
            .filter(|ct| *ct != OCTET_STREAM)
            .map(str::to_string)
            .or_else(|| {
                mime_guess::from_path(&original_name)
                    .first()
                    .map(|m| m.to_string())
            })
            .unwrap_or_else(|| OCTET_STREAM.to_string());

        let (file, size) = state
            .uploads
            .stage_body(&extension_of(&original_name), field, limit)
            .await
            .map_err(|e| upload_error(e, "Error uploading file"))?;

        upload = Some(StagedUpload {
            file,
            original_name,
            mime_type,
            size,
        });
        break;
    }

    let upload = upload.ok_or_else(|| ApiError::bad_request("No file provided"))?;

    let file = state
        .uploads
        .ingest_staged(&user_id, upload)
        .await
        .map_err(|e| upload_error(e, "Error uploading file"))?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            file,
            message: "File uploaded successfully".to_string(),
        }),
    ))
}

/// Raw request body upload. The name comes from `x-file-name`, the type from
/// `content-type`.
pub async fn upload_stream(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<UploadResponse>, ApiError> {
    let upload = StreamUpload {
        declared_length: header_text(&headers, CONTENT_LENGTH.as_str())
            .and_then(|value| value.parse().ok()),
        file_name: header_text(&headers, "x-file-name"),
        mime_type: header_text(&headers, CONTENT_TYPE.as_str()),
    };

    let file = state
        .uploads
        .ingest_stream(&user_id, upload, body.into_data_stream())
        .await
        .map_err(|e| upload_error(e, "Error uploading file"))?;

    Ok(Json(UploadResponse {
        file,
        message: "File uploaded successfully".to_string(),
    }))
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<FileResponse>>, ApiError> {
    let files = state
        .files
        .list(&user_id)
        .await
        .map_err(|e| upload_error(e, "Error listing files"))?;

    Ok(Json(files.iter().map(file_to_response).collect()))
}

pub async fn download_file(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let (file, blob) = state
        .files
        .open(&user_id, &id)
        .await
        .map_err(|e| upload_error(e, "Error downloading file"))?;

    let length = blob
        .metadata()
        .await
        .map_err(|e| upload_error(e.into(), "Error reading file"))?
        .len();

    let content_type =
        HeaderValue::from_str(&file.mime_type).unwrap_or(HeaderValue::from_static(OCTET_STREAM));
    let disposition = HeaderValue::from_str(&content_disposition(&file.original_name))
        .unwrap_or(HeaderValue::from_static("attachment"));

    let headers = [
        (CONTENT_TYPE, content_type),
        (CONTENT_DISPOSITION, disposition),
        (CONTENT_LENGTH, HeaderValue::from(length)),
    ];

    Ok((headers, Body::from_stream(ReaderStream::new(blob))).into_response())
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageBody>, ApiError> {
    state
        .files
        .delete(&user_id, &id)
        .await
        .map_err(|e| upload_error(e, "Error deleting file"))?;

    Ok(MessageBody::new("File deleted successfully"))
}

// ============================================================================
// Helpers
// ============================================================================

fn file_to_response(file: &FileRecord) -> FileResponse {
    FileResponse {
        created_at: file.created_at.to_rfc3339(),
        filename: file.filename.clone(),
        id: file.id.clone(),
        mime_type: file.mime_type.clone(),
        original_name: file.original_name.clone(),
        size: file.size,
        status: file.status,
        updated_at: file.updated_at.to_rfc3339(),
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    ApiError::Fail(e.status(), format!("Invalid multipart data: {}", e.body_text()))
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// `attachment; filename="..."` with the untrusted name reduced to printable
/// ASCII and stripped of quotes and backslashes.
fn content_disposition(original_name: &str) -> String {
    let safe: String = original_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    format!("attachment; filename=\"{safe}\"")
}
