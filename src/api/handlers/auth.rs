use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth_error;
use crate::api::response::{ApiError, AppJson, MessageBody};
use crate::auth::{PasswordReset, Registration};
use crate::AppState;

const MIN_PASSWORD_LEN: usize = 8;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub message: String,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetTokenResponse {
    pub message: String,
    pub reset_token: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let email = normalize_email(&req.email)?;
    check_password(&req.password)?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }

    let token = state
        .credentials
        .register(Registration {
            email,
            password: req.password,
            name: name.to_string(),
        })
        .await
        .map_err(auth_error)?;

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            message: "User registered successfully".to_string(),
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let email = normalize_email(&req.email)?;
    if req.password.is_empty() {
        return Err(ApiError::bad_request("password must not be empty"));
    }

    let token = state
        .credentials
        .login(&email, &req.password)
        .await
        .map_err(auth_error)?;

    Ok(Json(TokenResponse {
        message: "Login successful".to_string(),
        token,
    }))
}

/// The reset token is returned directly; there is no mail delivery.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<ForgotPasswordRequest>,
) -> Result<Json<ResetTokenResponse>, ApiError> {
    let email = normalize_email(&req.email)?;

    let reset_token = state
        .credentials
        .forgot_password(&email)
        .await
        .map_err(auth_error)?;

    Ok(Json(ResetTokenResponse {
        message: "Password reset token generated".to_string(),
        reset_token,
    }))
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<ResetPasswordRequest>,
) -> Result<Json<MessageBody>, ApiError> {
    let email = normalize_email(&req.email)?;
    if req.token.trim().is_empty() {
        return Err(ApiError::bad_request("token must not be empty"));
    }
    check_password(&req.new_password)?;

    state
        .credentials
        .reset_password(PasswordReset {
            email,
            token: req.token,
            new_password: req.new_password,
        })
        .await
        .map_err(auth_error)?;

    Ok(MessageBody::new("Password reset successful"))
}

// ============================================================================
// Validation
// ============================================================================

/// Trim and lower-case an address after a basic shape check.
fn normalize_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(email)
    } else {
        Err(ApiError::bad_request("A valid email is required"))
    }
}

fn check_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}
