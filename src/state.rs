//! Application state management

use std::sync::Arc;

use crate::config::{Config, RecordBackend};
use crate::error::StoreError;
use crate::records::{JsonFileRecordStore, MemoryRecordStore, RecordStore, SqliteRecordStore};
use crate::service::IntegrityService;
use crate::storage::LocalFileStorage;

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to open record store: {0}")]
    RecordStore(#[from] StoreError),

    #[error("Failed to prepare upload directory: {0}")]
    UploadDir(#[from] crate::error::AppError),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    service: IntegrityService,
}

impl AppState {
    /// Create state from explicit parts
    pub fn new(config: Config, records: Arc<dyn RecordStore>) -> Self {
        let files = LocalFileStorage::new(config.storage.upload_dir.clone());
        let service = IntegrityService::new(
            records,
            files,
            config.storage.allowed_extensions.clone(),
        );

        Self {
            inner: Arc::new(AppStateInner { config, service }),
        }
    }

    /// Open the configured record store and prepare the upload directory
    pub async fn from_config(config: Config) -> Result<Self, StateError> {
        let records = open_record_store(&config).await?;
        let state = Self::new(config, records);
        let files = state.service().files();
        files.ensure_dir().await?;
        tracing::info!(path = %files.base_path().display(), "Upload directory ready");
        Ok(state)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the integrity service
    pub fn service(&self) -> &IntegrityService {
        &self.inner.service
    }
}

/// Build the record store backend selected by the configuration
pub async fn open_record_store(config: &Config) -> Result<Arc<dyn RecordStore>, StoreError> {
    let store: Arc<dyn RecordStore> = match config.records.backend {
        RecordBackend::Json => {
            let store = JsonFileRecordStore::open(config.records.json_path.clone()).await?;
            tracing::info!(path = %store.path().display(), "Using JSON record store");
            Arc::new(store)
        }
        RecordBackend::Sqlite => {
            tracing::info!(url = %config.records.database_url, "Using SQLite record store");
            Arc::new(SqliteRecordStore::connect(&config.records.database_url).await?)
        }
        RecordBackend::Memory => {
            tracing::warn!("Using in-memory record store; records are lost on restart");
            Arc::new(MemoryRecordStore::new())
        }
    };

    Ok(store)
}
