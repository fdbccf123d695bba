mod auth;
mod files;
mod health;

use crate::api::response::ApiError;
use crate::auth::AuthError;
use crate::uploads::UploadError;

pub use auth::{forgot_password, login, register, reset_password};
pub use files::{delete_file, download_file, list_files, upload_file, upload_stream};
pub use health::health;

/// Map an AuthError to an ApiError
fn auth_error(e: AuthError) -> ApiError {
    match e {
        AuthError::DuplicateUser => ApiError::conflict(e.to_string()),
        AuthError::InvalidCredentials => ApiError::unauthorized(e.to_string()),
        AuthError::UserNotFound => ApiError::not_found(e.to_string()),
        AuthError::InvalidOrExpiredToken => ApiError::bad_request(e.to_string()),
        _ => {
            tracing::error!(error = %e, "Credential operation failed");
            ApiError::internal("Internal server error")
        }
    }
}

/// Map an UploadError to an ApiError. `context` is the message for server errors.
fn upload_error(e: UploadError, context: &str) -> ApiError {
    match e {
        UploadError::InvalidType(_) => ApiError::bad_request("Invalid file type"),
        UploadError::TooLarge { .. } => ApiError::payload_too_large("File too large"),
        UploadError::NotFound => ApiError::not_found("File not found"),
        UploadError::Transport(ref detail) => {
            tracing::debug!(error = %detail, "Upload body ended early");
            ApiError::bad_request("Upload was interrupted")
        }
        _ => {
            tracing::error!(error = %e, "{context}");
            ApiError::internal(context)
        }
    }
}
