use thiserror::Error;

use crate::storage::BackendKind;
use crate::uploads::{DEFAULT_MAX_STREAM_SIZE, DEFAULT_MAX_UPLOAD_SIZE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub uploads: UploadConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Fixed for the life of the process
    pub backend: BackendKind,
    /// Connection URL for the relational backend
    pub url: String,
    /// Directory for the document store (and the default SQLite file)
    pub data_dir: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC key for bearer tokens
    pub jwt_secret: String,
    pub token_ttl_secs: i64,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub dir: String,
    /// Maximum multipart upload size in bytes
    pub max_upload_size: u64,
    /// Maximum streamed upload size in bytes
    pub max_stream_size: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Relational,
            url: "sqlite://./data/file-vault.db".to_string(),
            data_dir: "./data".to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: "./uploads".to_string(),
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            max_stream_size: DEFAULT_MAX_STREAM_SIZE,
        }
    }
}

/// Parse the backend selector. `mongo` is accepted for the document backend.
pub fn parse_backend(value: &str) -> Result<BackendKind, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "sql" | "sqlite" | "relational" => Ok(BackendKind::Relational),
        "mongo" | "document" => Ok(BackendKind::Document),
        other => Err(ConfigError::ValidationError(format!(
            "DB_TYPE must be 'sql' or 'mongo', got '{other}'"
        ))),
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let backend = match std::env::var("DB_TYPE") {
            Ok(value) => parse_backend(&value)?,
            Err(_) => BackendKind::Relational,
        };

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{data_dir}/file-vault.db"));

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| format!("0.0.0.0:{port}"));

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_default();
        let token_ttl_secs = std::env::var("TOKEN_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(24 * 60 * 60);

        let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string());

        let max_upload_size = std::env::var("MAX_UPLOAD_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_SIZE);

        let max_stream_size = std::env::var("MAX_STREAM_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_STREAM_SIZE);

        let config = Config {
            auth: AuthConfig {
                jwt_secret,
                token_ttl_secs,
            },
            database: DatabaseConfig {
                backend,
                url,
                data_dir,
            },
            server: ServerConfig { bind_address },
            uploads: UploadConfig {
                dir: upload_dir,
                max_upload_size,
                max_stream_size,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "JWT_SECRET must be set".to_string(),
            ));
        }

        if self.auth.token_ttl_secs <= 0 {
            return Err(ConfigError::ValidationError(
                "TOKEN_TTL_SECS must be positive".to_string(),
            ));
        }

        if self.uploads.max_upload_size == 0 || self.uploads.max_stream_size == 0 {
            return Err(ConfigError::ValidationError(
                "upload size limits must be greater than 0".to_string(),
            ));
        }

        if self.auth.jwt_secret.len() < 32 {
            tracing::warn!("JWT_SECRET is shorter than 32 bytes; use a longer random secret");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            auth: AuthConfig {
                jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
                token_ttl_secs: 60,
            },
            database: DatabaseConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1:0".to_string(),
            },
            uploads: UploadConfig::default(),
        }
    }

    #[test]
    fn test_parse_backend() {
        assert_eq!(parse_backend("sql").unwrap(), BackendKind::Relational);
        assert_eq!(parse_backend(" MONGO ").unwrap(), BackendKind::Document);
        assert_eq!(parse_backend("document").unwrap(), BackendKind::Document);
        assert!(parse_backend("postgres-ish").is_err());
    }

    #[test]
    fn test_validate_requires_secret() {
        let mut config = sample();
        assert!(config.validate().is_ok());

        config.auth.jwt_secret.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = sample();
        config.uploads.max_stream_size = 0;
        assert!(config.validate().is_err());
    }
}
