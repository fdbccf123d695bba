use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value::Changes;
use super::Entity;

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    /// bcrypt hash, never the plain password
    #[serde(rename = "password")]
    #[sqlx(rename = "password")]
    pub password_hash: String,
    #[serde(default)]
    pub reset_token: Option<String>,
    #[serde(default)]
    pub reset_token_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for User {
    const COLLECTION: &'static str = "users";
    const FIELDS: &'static [&'static str] = &[
        "id",
        "email",
        "name",
        "password",
        "reset_token",
        "reset_token_expiry",
        "created_at",
        "updated_at",
    ];
    const TIMESTAMPS: &'static [&'static str] =
        &["reset_token_expiry", "created_at", "updated_at"];
    const UNIQUE: &'static [&'static str] = &["email"];
    const SELECT: &'static str = "CAST(id AS TEXT) AS id, email, name, password, reset_token, \
         reset_token_expiry, created_at, updated_at";
}

/// Fields supplied when registering a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

impl From<NewUser> for Changes {
    fn from(user: NewUser) -> Self {
        Changes::new()
            .set("email", user.email)
            .set("name", user.name)
            .set("password", user.password_hash)
    }
}

/// Processing state of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum FileStatus {
    Processing,
    Completed,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Processing => "processing",
            FileStatus::Completed => "completed",
            FileStatus::Failed => "failed",
        }
    }
}

/// Metadata for a stored blob
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FileRecord {
    pub id: String,
    pub user_id: String,
    /// Random-derived name of the blob on disk
    pub filename: String,
    /// Name supplied by the uploader; untrusted
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    pub path: String,
    pub status: FileStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for FileRecord {
    const COLLECTION: &'static str = "files";
    const FIELDS: &'static [&'static str] = &[
        "id",
        "user_id",
        "filename",
        "original_name",
        "mime_type",
        "size",
        "path",
        "status",
        "created_at",
        "updated_at",
    ];
    const TIMESTAMPS: &'static [&'static str] = &["created_at", "updated_at"];
    const UNIQUE: &'static [&'static str] = &["filename"];
    const SELECT: &'static str = "CAST(id AS TEXT) AS id, CAST(user_id AS TEXT) AS user_id, \
         filename, original_name, mime_type, size, path, status, created_at, updated_at";
}

#[derive(Debug, Clone)]
pub struct NewFile {
    pub user_id: String,
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    pub path: String,
    pub status: FileStatus,
}

impl From<NewFile> for Changes {
    fn from(file: NewFile) -> Self {
        Changes::new()
            .set("user_id", file.user_id)
            .set("filename", file.filename)
            .set("original_name", file.original_name)
            .set("mime_type", file.mime_type)
            .set("size", file.size)
            .set("path", file.path)
            .set("status", file.status.as_str())
    }
}
