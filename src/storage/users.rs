use super::filter::Filter;
use super::models::User;
use super::{Repository, StorageError};

impl Repository<User> {
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        self.find_one(&Filter::new().eq("email", email)).await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>, StorageError> {
        self.find_one(&Filter::new().eq("id", id)).await
    }
}
