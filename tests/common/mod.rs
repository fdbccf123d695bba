#![allow(dead_code)]

use file_vault::config::DatabaseConfig;
use file_vault::storage::models::{NewFile, NewUser, User};
use file_vault::storage::{BackendKind, Connection};

pub async fn open(dir: &tempfile::TempDir, backend: BackendKind) -> Connection {
    let data_dir = dir.path().join("data");
    std::fs::create_dir_all(&data_dir).unwrap();
    let config = DatabaseConfig {
        backend,
        url: format!("sqlite://{}", data_dir.join("test.db").display()),
        data_dir: data_dir.to_string_lossy().to_string(),
    };
    Connection::open(&config).await.unwrap()
}

/// One open connection per backend, each in its own directory.
pub async fn both_backends() -> Vec<(tempfile::TempDir, Connection)> {
    let mut connections = Vec::new();
    for backend in [BackendKind::Relational, BackendKind::Document] {
        let dir = tempfile::tempdir().unwrap();
        let connection = open(&dir, backend).await;
        connections.push((dir, connection));
    }
    connections
}

pub async fn create_user(connection: &Connection, email: &str) -> String {
    connection
        .repository::<User>()
        .create(NewUser {
            email: email.to_string(),
            name: "Test User".to_string(),
            password_hash: "not-a-real-hash".to_string(),
        })
        .await
        .unwrap()
}

pub fn sample_file(user_id: &str, filename: &str, size: u64) -> NewFile {
    NewFile {
        user_id: user_id.to_string(),
        filename: filename.to_string(),
        original_name: format!("original-{filename}"),
        mime_type: "image/png".to_string(),
        size,
        path: format!("/nonexistent/{filename}"),
        status: file_vault::storage::models::FileStatus::Completed,
    }
}
