//! Registration, login and password reset over the user repository.

pub mod token;

use std::sync::Arc;

use chrono::{Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::storage::models::NewUser;
use crate::storage::{Changes, FieldValue, Filter, StorageError, UserRepository};
use token::{TokenError, TokenIssuer};

/// bcrypt work factor for stored password hashes
pub const BCRYPT_COST: u32 = 10;

/// Reset tokens carry 256 bits of entropy
const RESET_TOKEN_BYTES: usize = 32;

/// Verified against when the email is unknown, so a miss costs the same bcrypt work as a hit
static DUMMY_HASH: OnceCell<String> = OnceCell::const_new();

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("User already exists")]
    DuplicateUser,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("User not found")]
    UserNotFound,
    #[error("Invalid or expired reset token")]
    InvalidOrExpiredToken,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("Password hashing task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),
    #[error("Token signing failed: {0}")]
    Token(#[from] TokenError),
    #[error("Secure random generator failed")]
    Random,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct PasswordReset {
    pub email: String,
    pub token: String,
    pub new_password: String,
}

pub struct CredentialService {
    users: UserRepository,
    tokens: Arc<dyn TokenIssuer>,
    rng: SystemRandom,
}

impl CredentialService {
    pub fn new(users: UserRepository, tokens: Arc<dyn TokenIssuer>) -> Self {
        Self {
            users,
            tokens,
            rng: SystemRandom::new(),
        }
    }

    /// Create an account and return a bearer token for it.
    pub async fn register(&self, registration: Registration) -> Result<String, AuthError> {
        if self
            .users
            .find_by_email(&registration.email)
            .await?
            .is_some()
        {
            return Err(AuthError::DuplicateUser);
        }

        let password_hash = hash_password(registration.password).await?;
        let user_id = self
            .users
            .create(NewUser {
                email: registration.email,
                name: registration.name,
                password_hash,
            })
            .await
            .map_err(|e| match e {
                // Lost a race with a concurrent registration
                StorageError::Duplicate { .. } => AuthError::DuplicateUser,
                other => AuthError::Storage(other),
            })?;

        tracing::debug!(user_id = %user_id, "Registered user");
        Ok(self.tokens.issue(&user_id)?)
    }

    /// Unknown email and wrong password fail identically.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let Some(user) = self.users.find_by_email(email).await? else {
            let dummy = dummy_hash().await?;
            verify_password(password.to_string(), dummy.to_string()).await?;
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(password.to_string(), user.password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(self.tokens.issue(&user.id)?)
    }

    /// Issue a reset token valid for one hour. Delivery is the caller's concern.
    pub async fn forgot_password(&self, email: &str) -> Result<String, AuthError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let mut bytes = [0u8; RESET_TOKEN_BYTES];
        self.rng.fill(&mut bytes).map_err(|_| AuthError::Random)?;
        let reset_token = hex::encode(bytes);
        let expiry = Utc::now() + Duration::hours(1);

        self.users
            .update(
                &Filter::new().eq("id", &user.id),
                Changes::new()
                    .set("reset_token", &reset_token)
                    .set("reset_token_expiry", expiry),
            )
            .await?;

        tracing::debug!(user_id = %user.id, "Issued password reset token");
        Ok(reset_token)
    }

    /// Replace the password if `token` is the user's current, unexpired reset token.
    pub async fn reset_password(&self, reset: PasswordReset) -> Result<(), AuthError> {
        let user = self
            .users
            .find_one(
                &Filter::new()
                    .eq("email", &reset.email)
                    .eq("reset_token", &reset.token)
                    .gt("reset_token_expiry", Utc::now()),
            )
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        let password_hash = hash_password(reset.new_password).await?;

        // Token and expiry are cleared in the same write as the new hash
        self.users
            .update(
                &Filter::new().eq("id", &user.id),
                Changes::new()
                    .set("password", password_hash)
                    .set("reset_token", FieldValue::Null)
                    .set("reset_token_expiry", FieldValue::Null),
            )
            .await?;

        tracing::debug!(user_id = %user.id, "Password reset");
        Ok(())
    }
}

async fn hash_password(password: String) -> Result<String, AuthError> {
    Ok(tokio::task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST)).await??)
}

async fn dummy_hash() -> Result<&'static str, AuthError> {
    let hash = DUMMY_HASH
        .get_or_try_init(|| hash_password("no account has this password".to_string()))
        .await?;
    Ok(hash.as_str())
}

async fn verify_password(password: String, hash: String) -> Result<bool, AuthError> {
    Ok(tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::BackendKind;
    use crate::testutil::test_state;

    #[tokio::test]
    async fn test_unknown_email_still_verifies_a_hash() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, BackendKind::Relational).await;

        let result = state
            .credentials
            .login("nobody@example.com", "correct horse")
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));

        let dummy = DUMMY_HASH.get().expect("dummy hash computed on first miss");
        assert!(dummy.starts_with("$2"));
        assert!(!bcrypt::verify("correct horse", dummy).unwrap());
    }
}
