//! Configuration management for the HMAC uploader server

use serde::Deserialize;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub records: RecordsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding uploaded files
    pub upload_dir: PathBuf,
    /// Accepted file extensions, without the dot
    pub allowed_extensions: Vec<String>,
    /// Request body limit for uploads and verifications
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordsConfig {
    pub backend: RecordBackend,
    /// JSON record file, used by the `json` backend
    pub json_path: PathBuf,
    /// SQLite URL, used by the `sqlite` backend
    pub database_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordBackend {
    Json,
    Sqlite,
    Memory,
}

impl RecordBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordBackend::Json => "json",
            RecordBackend::Sqlite => "sqlite",
            RecordBackend::Memory => "memory",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "json" => Some(RecordBackend::Json),
            "sqlite" => Some(RecordBackend::Sqlite),
            "memory" => Some(RecordBackend::Memory),
            _ => None,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
            },
            storage: StorageConfig {
                upload_dir: PathBuf::from("uploads"),
                allowed_extensions: vec!["txt".to_string()],
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            },
            records: RecordsConfig {
                backend: RecordBackend::Json,
                json_path: PathBuf::from("hmac_store.json"),
                database_url: "sqlite:./hmac_records.db".to_string(),
            },
        }
    }
}

impl Config {
    /// Read configuration from the environment, falling back to defaults for
    /// unset variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT", defaults.server.port)?,
            },
            storage: StorageConfig {
                upload_dir: env::var("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.upload_dir),
                allowed_extensions: env::var("ALLOWED_EXTENSIONS")
                    .map(|v| parse_extensions(&v))
                    .unwrap_or(defaults.storage.allowed_extensions),
                max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", defaults.storage.max_upload_bytes)?,
            },
            records: RecordsConfig {
                backend: match env::var("RECORD_BACKEND") {
                    Ok(value) => RecordBackend::parse(&value).ok_or(ConfigError::InvalidValue {
                        name: "RECORD_BACKEND",
                        value,
                    })?,
                    Err(_) => defaults.records.backend,
                },
                json_path: env::var("HMAC_STORE_FILE")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.records.json_path),
                database_url: env::var("DATABASE_URL").unwrap_or(defaults.records.database_url),
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(default),
    }
}

/// Split a comma-separated extension list, dropping dots and blanks
fn parse_extensions(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.storage.allowed_extensions, vec!["txt"]);
        assert_eq!(config.records.backend, RecordBackend::Json);
        assert_eq!(config.records.json_path, PathBuf::from("hmac_store.json"));
    }

    #[test]
    fn test_parse_extensions() {
        assert_eq!(parse_extensions("txt, .MD,,log "), vec!["txt", "md", "log"]);
        assert!(parse_extensions(" , ").is_empty());
    }

    #[test]
    fn test_parse_backend() {
        assert_eq!(RecordBackend::parse("SQLite"), Some(RecordBackend::Sqlite));
        assert_eq!(RecordBackend::parse(" json "), Some(RecordBackend::Json));
        assert_eq!(RecordBackend::parse("memory"), Some(RecordBackend::Memory));
        assert_eq!(RecordBackend::parse("mongo"), None);
    }
}
