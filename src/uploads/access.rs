use std::path::Path;
use std::sync::Arc;

use super::blob_dir::BlobDir;
use super::UploadError;
use crate::storage::models::FileRecord;
use crate::storage::FileRepository;

/// List, download and delete, scoped to the requesting owner.
pub struct FileAccess {
    blobs: Arc<BlobDir>,
    files: FileRepository,
}

impl FileAccess {
    pub fn new(blobs: Arc<BlobDir>, files: FileRepository) -> Self {
        Self { blobs, files }
    }

    pub async fn list(&self, owner: &str) -> Result<Vec<FileRecord>, UploadError> {
        Ok(self.files.list_for_owner(owner).await?)
    }

    /// Resolve a file's metadata and open its blob for reading.
    pub async fn open(
        &self,
        owner: &str,
        file_id: &str,
    ) -> Result<(FileRecord, tokio::fs::File), UploadError> {
        let file = self
            .files
            .find_for_owner(owner, file_id)
            .await?
            .ok_or(UploadError::NotFound)?;

        match self.blobs.open(Path::new(&file.path)).await {
            Ok(blob) => Ok((file, blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(file_id = %file.id, path = %file.path, "Blob missing for file metadata");
                Err(UploadError::NotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the blob, then the metadata. If the blob can't be removed the
    /// metadata stays, so no row ever points at a half-deleted file.
    pub async fn delete(&self, owner: &str, file_id: &str) -> Result<(), UploadError> {
        let file = self
            .files
            .find_for_owner(owner, file_id)
            .await?
            .ok_or(UploadError::NotFound)?;

        if let Err(e) = self.blobs.remove(Path::new(&file.path)).await {
            tracing::warn!(file_id = %file.id, error = %e, "Failed to remove blob, keeping metadata");
            return Err(e.into());
        }

        self.files.delete_for_owner(owner, file_id).await?;

        tracing::debug!(file_id = %file.id, "Deleted file");
        Ok(())
    }
}
