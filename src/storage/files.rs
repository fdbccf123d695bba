use super::filter::Filter;
use super::models::FileRecord;
use super::{Order, Repository, StorageError};

impl Repository<FileRecord> {
    // ========================================================================
    // Owner-scoped file operations
    // ========================================================================

    /// All files belonging to `user_id`, newest first
    pub async fn list_for_owner(&self, user_id: &str) -> Result<Vec<FileRecord>, StorageError> {
        self.find_many(
            &Filter::new().eq("user_id", user_id),
            Some(&Order::desc("created_at")),
        )
        .await
    }

    /// A single file, only if `user_id` owns it
    pub async fn find_for_owner(
        &self,
        user_id: &str,
        file_id: &str,
    ) -> Result<Option<FileRecord>, StorageError> {
        self.find_one(&owned(user_id, file_id)).await
    }

    /// Remove a file's metadata. Returns false if there was nothing to remove.
    pub async fn delete_for_owner(&self, user_id: &str, file_id: &str) -> Result<bool, StorageError> {
        Ok(self.delete(&owned(user_id, file_id)).await? > 0)
    }
}

fn owned(user_id: &str, file_id: &str) -> Filter {
    Filter::new().eq("id", file_id).eq("user_id", user_id)
}
