//! file-vault - user accounts and per-user file storage
//!
//! This crate provides:
//! - A repository layer that runs against SQLite (sqlx) or an embedded
//!   document store (redb), with one filter language for both
//! - Registration, login and password reset with bcrypt hashes and signed
//!   bearer tokens
//! - Multipart and streamed uploads written through a staging area and
//!   atomically renamed into place
//! - REST API for listing, downloading and deleting a user's files

pub mod api;
pub mod auth;
pub mod config;
pub mod storage;
#[cfg(test)]
pub mod testutil;
pub mod uploads;

use std::sync::Arc;

use auth::token::HmacSigner;
use auth::CredentialService;
use config::Config;
use storage::Connection;
use uploads::{BlobDir, FileAccess, IngestPipeline, UploadLimits};

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub credentials: CredentialService,
    pub files: FileAccess,
    pub signer: Arc<HmacSigner>,
    pub uploads: IngestPipeline,
}

impl AppState {
    /// Wire services onto an open storage connection.
    pub fn new(config: Config, connection: &Connection) -> Result<Self, std::io::Error> {
        let signer = Arc::new(HmacSigner::new(
            config.auth.jwt_secret.as_bytes(),
            config.auth.token_ttl_secs,
        ));
        let blobs = Arc::new(BlobDir::new(&config.uploads.dir)?);
        let files = connection.repository();
        let limits = UploadLimits {
            max_buffered: config.uploads.max_upload_size,
            max_stream: config.uploads.max_stream_size,
        };

        Ok(Self {
            credentials: CredentialService::new(connection.repository(), signer.clone()),
            files: FileAccess::new(Arc::clone(&blobs), files.clone()),
            uploads: IngestPipeline::new(blobs, files, limits),
            signer,
            config,
        })
    }
}
