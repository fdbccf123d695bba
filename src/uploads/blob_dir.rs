use std::path::{Path, PathBuf};

use super::staging::StagedFile;

/// Local upload directory. Staged files live in a `tmp` subdirectory so the
/// final rename never crosses a filesystem boundary.
pub struct BlobDir {
    base_path: PathBuf,
    staging_path: PathBuf,
}

impl BlobDir {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        let staging_path = base_path.join("tmp");
        std::fs::create_dir_all(&staging_path)?;
        Ok(Self {
            base_path,
            staging_path,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn staging_path(&self) -> &Path {
        &self.staging_path
    }

    /// Create an empty staged file with a fresh name and the given extension.
    pub async fn stage(
        &self,
        extension: &str,
    ) -> Result<(StagedFile, tokio::fs::File), std::io::Error> {
        let path = self
            .staging_path
            .join(format!("temp-{}{extension}", uuid::Uuid::new_v4().simple()));
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Ok((StagedFile::new(path), file))
    }

    /// Move a staged file to its final name in the upload directory.
    pub async fn promote(
        &self,
        staged: &mut StagedFile,
        name: &str,
    ) -> Result<PathBuf, std::io::Error> {
        let dest = self.base_path.join(name);
        staged.relocate(dest.clone()).await?;
        Ok(dest)
    }

    pub async fn open(&self, path: &Path) -> Result<tokio::fs::File, std::io::Error> {
        tokio::fs::File::open(path).await
    }

    /// Remove a blob. A blob that is already gone counts as removed.
    pub async fn remove(&self, path: &Path) -> Result<(), std::io::Error> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// The original name's extension, with its dot, if it is short and alphanumeric.
/// Anything else yields an empty string; the original name is untrusted.
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 16 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{e}"))
        .unwrap_or_default()
}
