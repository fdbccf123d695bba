use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use ring::rand::{SecureRandom, SystemRandom};
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use super::blob_dir::{extension_of, BlobDir};
use super::staging::StagedFile;
use super::{is_allowed_type, UploadError, UploadLimits};
use crate::storage::models::{FileStatus, NewFile};
use crate::storage::FileRepository;

const STORED_NAME_BYTES: usize = 16;

/// A file the upload layer has already written to the staging area.
#[derive(Debug)]
pub struct StagedUpload {
    pub file: StagedFile,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
}

/// Headers describing a raw streamed body.
#[derive(Debug, Clone, Default)]
pub struct StreamUpload {
    pub declared_length: Option<u64>,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

/// Metadata of a successfully stored upload
#[derive(Debug, Clone, Serialize)]
pub struct IngestedFile {
    pub id: String,
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
}

pub struct IngestPipeline {
    blobs: Arc<BlobDir>,
    files: FileRepository,
    limits: UploadLimits,
    rng: SystemRandom,
}

impl IngestPipeline {
    pub fn new(blobs: Arc<BlobDir>, files: FileRepository, limits: UploadLimits) -> Self {
        Self {
            blobs,
            files,
            limits,
            rng: SystemRandom::new(),
        }
    }

    pub fn blobs(&self) -> &BlobDir {
        &self.blobs
    }

    pub fn limits(&self) -> UploadLimits {
        self.limits
    }

    /// Store a fully buffered upload. Only allow-listed MIME types are kept.
    pub async fn ingest_staged(
        &self,
        owner: &str,
        upload: StagedUpload,
    ) -> Result<IngestedFile, UploadError> {
        let StagedUpload {
            file,
            original_name,
            mime_type,
            size,
        } = upload;

        if !is_allowed_type(&mime_type) {
            file.discard().await;
            return Err(UploadError::InvalidType(mime_type));
        }
        if size > self.limits.max_buffered {
            file.discard().await;
            return Err(UploadError::TooLarge {
                limit: self.limits.max_buffered,
            });
        }

        self.finalize(owner, file, original_name, mime_type, size)
            .await
    }

    /// Write a live body to disk and store it.
    ///
    /// A declared length over the ceiling is refused before the body is read.
    /// The bytes actually received decide the recorded size, and are held to the
    /// same ceiling.
    pub async fn ingest_stream<S, E>(
        &self,
        owner: &str,
        upload: StreamUpload,
        body: S,
    ) -> Result<IngestedFile, UploadError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send,
        E: Display,
    {
        let limit = self.limits.max_stream;
        if upload.declared_length.is_some_and(|declared| declared > limit) {
            return Err(UploadError::TooLarge { limit });
        }

        let original_name = upload
            .file_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("upload-{}.bin", Utc::now().timestamp_millis()));
        let mime_type = upload
            .mime_type
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let (staged, size) = self
            .stage_body(&extension_of(&original_name), body, limit)
            .await?;

        self.finalize(owner, staged, original_name, mime_type, size)
            .await
    }

    /// Write a body into a fresh staged file, holding the bytes received to
    /// `limit`. On error the staged file is already gone.
    pub async fn stage_body<S, E>(
        &self,
        extension: &str,
        body: S,
        limit: u64,
    ) -> Result<(StagedFile, u64), UploadError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let (staged, mut file) = self.blobs.stage(extension).await?;

        let result = write_body(&mut file, body, limit).await;
        drop(file);

        match result {
            Ok(size) => Ok((staged, size)),
            Err(e) => {
                staged.discard().await;
                Err(e)
            }
        }
    }

    async fn finalize(
        &self,
        owner: &str,
        mut staged: StagedFile,
        original_name: String,
        mime_type: String,
        size: u64,
    ) -> Result<IngestedFile, UploadError> {
        match self
            .promote_and_record(owner, &mut staged, &original_name, &mime_type, size)
            .await
        {
            Ok((id, filename)) => {
                staged.commit();
                tracing::debug!(file_id = %id, owner = %owner, size, "Stored upload");
                Ok(IngestedFile {
                    id,
                    filename,
                    original_name,
                    mime_type,
                    size,
                })
            }
            Err(e) => {
                staged.discard().await;
                Err(e)
            }
        }
    }

    async fn promote_and_record(
        &self,
        owner: &str,
        staged: &mut StagedFile,
        original_name: &str,
        mime_type: &str,
        size: u64,
    ) -> Result<(String, String), UploadError> {
        let filename = self.stored_name(original_name)?;
        let path = self.blobs.promote(staged, &filename).await?;

        let id = self
            .files
            .create(NewFile {
                user_id: owner.to_string(),
                filename: filename.clone(),
                original_name: original_name.to_string(),
                mime_type: mime_type.to_string(),
                size,
                path: path.to_string_lossy().into_owned(),
                status: FileStatus::Completed,
            })
            .await?;

        Ok((id, filename))
    }

    /// Random stored name that keeps the original extension.
    fn stored_name(&self, original_name: &str) -> Result<String, UploadError> {
        let mut bytes = [0u8; STORED_NAME_BYTES];
        self.rng.fill(&mut bytes).map_err(|_| UploadError::Random)?;
        Ok(format!("{}{}", hex::encode(bytes), extension_of(original_name)))
    }
}

/// Copy the body into `file`, chunk by chunk, returning the byte count.
/// Each write is awaited before the next chunk is pulled.
async fn write_body<S, E>(
    file: &mut tokio::fs::File,
    body: S,
    limit: u64,
) -> Result<u64, UploadError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let mut body = std::pin::pin!(body);
    let mut size: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| UploadError::Transport(e.to_string()))?;
        size += chunk.len() as u64;
        if size > limit {
            return Err(UploadError::TooLarge { limit });
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    Ok(size)
}
