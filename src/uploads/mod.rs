//! File ingestion and owner-scoped file access.
//!
//! Blobs live in a local upload directory under random-derived names; their
//! metadata lives in the file repository. A blob is only left on disk once its
//! metadata row has been written.

mod access;
mod blob_dir;
mod pipeline;
mod staging;

pub use access::FileAccess;
pub use blob_dir::{extension_of, BlobDir};
pub use pipeline::{IngestPipeline, IngestedFile, StagedUpload, StreamUpload};
pub use staging::StagedFile;

use thiserror::Error;

use crate::storage::StorageError;

/// MIME types accepted by buffered (multipart) uploads
pub const ALLOWED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "application/pdf"];

pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 5 * 1024 * 1024;
pub const DEFAULT_MAX_STREAM_SIZE: u64 = 100 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Invalid file type: {0}")]
    InvalidType(String),
    #[error("File too large: limit is {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("File not found")]
    NotFound,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Upload stream failed: {0}")]
    Transport(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Secure random generator failed")]
    Random,
}

/// Size ceilings for the two upload modes
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_buffered: u64,
    pub max_stream: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_buffered: DEFAULT_MAX_UPLOAD_SIZE,
            max_stream: DEFAULT_MAX_STREAM_SIZE,
        }
    }
}

pub fn is_allowed_type(mime_type: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime_type)
}
