//! Shared test helpers for file-vault unit tests.

use std::sync::Arc;

use crate::config::{AuthConfig, Config, DatabaseConfig, ServerConfig, UploadConfig};
use crate::storage::{BackendKind, Connection};
use crate::AppState;

pub const TEST_SECRET: &str = "test-secret-test-secret-test-secret";

/// Create a test AppState with a temporary database and upload directory.
pub async fn test_state(temp_dir: &tempfile::TempDir, backend: BackendKind) -> Arc<AppState> {
    let data_dir = temp_dir.path().join("data");
    let upload_dir = temp_dir.path().join("uploads");
    std::fs::create_dir_all(&data_dir).expect("Failed to create test data dir");

    let config = Config {
        auth: AuthConfig {
            jwt_secret: TEST_SECRET.to_string(),
            token_ttl_secs: 3600,
        },
        database: DatabaseConfig {
            backend,
            url: format!("sqlite://{}", data_dir.join("test.db").display()),
            data_dir: data_dir.to_string_lossy().to_string(),
        },
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
        },
        uploads: UploadConfig {
            dir: upload_dir.to_string_lossy().to_string(),
            max_upload_size: 64 * 1024,
            max_stream_size: 256 * 1024,
        },
    };

    let connection = Connection::open(&config.database)
        .await
        .expect("Failed to open test database");

    Arc::new(AppState::new(config, &connection).expect("Failed to create test state"))
}
