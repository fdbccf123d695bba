//! Signed, time-limited bearer tokens.
//!
//! Format: `base64url(claims json) "." base64url(HMAC-SHA256(claims part))`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use ring::hmac;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,
    #[error("Invalid token signature")]
    BadSignature,
    #[error("Token expired")]
    Expired,
    #[error("Failed to encode token claims: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Expiry, unix seconds
    pub exp: i64,
}

/// Issues bearer tokens for a user id. The credential service treats this as opaque.
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, user_id: &str) -> Result<String, TokenError>;
}

pub struct HmacSigner {
    key: hmac::Key,
    ttl_secs: i64,
}

impl HmacSigner {
    pub fn new(secret: &[u8], ttl_secs: i64) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
            ttl_secs,
        }
    }

    /// Check signature and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let (payload, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;

        hmac::verify(&self.key, payload.as_bytes(), &signature)
            .map_err(|_| TokenError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&json).map_err(|_| TokenError::Malformed)?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
        let tag = hmac::sign(&self.key, payload.as_bytes());
        Ok(format!("{payload}.{}", URL_SAFE_NO_PAD.encode(tag.as_ref())))
    }
}

impl TokenIssuer for HmacSigner {
    fn issue(&self, user_id: &str) -> Result<String, TokenError> {
        self.sign(&Claims {
            sub: user_id.to_string(),
            exp: Utc::now().timestamp() + self.ttl_secs,
        })
    }
}
