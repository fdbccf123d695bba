use std::path::{Path, PathBuf};

/// A file on disk that is removed unless explicitly kept.
///
/// Covers every exit path of an upload: errors go through [`discard`](Self::discard),
/// dropped futures (client disconnects) through `Drop`, and success through
/// [`commit`](Self::commit), which hands the file over to its metadata row.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    armed: bool,
}

impl StagedFile {
    /// Take responsibility for an already-written file.
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically rename the file; the guard follows it to `dest`.
    pub async fn relocate(&mut self, dest: PathBuf) -> std::io::Result<()> {
        tokio::fs::rename(&self.path, &dest).await?;
        self.path = dest;
        Ok(())
    }

    /// Keep the file and return where it lives.
    pub fn commit(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }

    /// Remove the file now. A failed removal is logged, never returned, so the
    /// caller can still surface the error that triggered the cleanup.
    pub async fn discard(mut self) {
        self.armed = false;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Failed to remove staged file");
            }
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Removed abandoned staged file");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Failed to remove staged file");
            }
        }
    }
}
