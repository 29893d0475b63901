//! JSON file record store
//!
//! Keeps every record in one JSON object keyed by stored id:
//!
//! ```json
//! {
//!   "1a2b3c4d_report.txt": {
//!     "original_filename": "report.txt",
//!     "hmac": "...",
//!     "upload_time": "2024-05-01T10:00:00.123456",
//!     "file_size": 1024
//!   }
//! }
//! ```
//!
//! Key order in the file is insertion order. The whole file is rewritten on
//! every mutation through a temp file and rename.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::{parse_timestamp, RecordStore, StoredRecord};
use crate::error::StoreError;

/// On-disk shape of a single record
#[derive(Debug, Serialize, Deserialize)]
struct RecordEntry {
    original_filename: String,
    hmac: String,
    upload_time: String,
    file_size: u64,
}

/// Record store backed by a single JSON file
pub struct JsonFileRecordStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl JsonFileRecordStore {
    /// Open the store, creating an empty file if none exists
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        if !tokio::fs::try_exists(&path).await? {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, b"{}").await?;
            tracing::info!(path = %path.display(), "Created empty record store file");
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<StoredRecord>, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let map: Map<String, Value> = serde_json::from_str(&raw)?;
        map.into_iter()
            .map(|(stored_id, value)| {
                let entry: RecordEntry = serde_json::from_value(value)?;
                let upload_time = parse_timestamp(&entry.upload_time).ok_or_else(|| {
                    StoreError::Corrupt(format!(
                        "{}: unreadable upload_time '{}'",
                        stored_id, entry.upload_time
                    ))
                })?;

                Ok(StoredRecord {
                    stored_id,
                    original_filename: entry.original_filename,
                    tag: entry.hmac,
                    upload_time,
                    file_size: entry.file_size,
                })
            })
            .collect()
    }

    async fn save(&self, records: &[StoredRecord]) -> Result<(), StoreError> {
        let mut map = Map::new();
        for record in records {
            let entry = RecordEntry {
                original_filename: record.original_filename.clone(),
                hmac: record.tag.clone(),
                upload_time: record.upload_time.to_rfc3339(),
                file_size: record.file_size,
            };
            map.insert(record.stored_id.clone(), serde_json::to_value(entry)?);
        }

        let body = serde_json::to_string_pretty(&map)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, body).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn list(&self) -> Result<Vec<StoredRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    async fn get(&self, stored_id: &str) -> Result<Option<StoredRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let records = self.load().await?;
        Ok(records.into_iter().find(|r| r.stored_id == stored_id))
    }

    async fn insert(&self, record: StoredRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;

        if records.iter().any(|r| r.stored_id == record.stored_id) {
            return Err(StoreError::DuplicateId(record.stored_id));
        }

        records.push(record);
        self.save(&records).await
    }

    async fn delete(&self, stored_id: &str) -> Result<Option<StoredRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;

        let Some(idx) = records.iter().position(|r| r.stored_id == stored_id) else {
            return Ok(None);
        };
        let removed = records.remove(idx);
        self.save(&records).await?;

        Ok(Some(removed))
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        let count = self.load().await?.len();
        self.save(&[]).await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::test_support::exercise_store;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_json_store_contract() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileRecordStore::open(dir.path().join("hmac_store.json"))
            .await
            .unwrap();
        exercise_store(&store).await;
    }

    #[tokio::test]
    async fn test_open_creates_empty_object() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("store.json");
        let _store = JsonFileRecordStore::open(&path).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_reads_legacy_layout_in_file_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hmac_store.json");
        std::fs::write(
            &path,
            r#"{
  "9f8e7d6c_zeta.txt": {
    "original_filename": "zeta.txt",
    "hmac": "W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM=",
    "upload_time": "2024-05-01T10:00:00.123456",
    "file_size": 28
  },
  "1a2b3c4d_alpha.txt": {
    "original_filename": "alpha.txt",
    "hmac": "not-a-tag",
    "upload_time": "2024-05-02T11:30:00",
    "file_size": 5
  }
}"#,
        )
        .unwrap();

        let store = JsonFileRecordStore::open(&path).await.unwrap();
        let records = store.list().await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].stored_id, "9f8e7d6c_zeta.txt");
        assert_eq!(records[0].file_size, 28);
        assert_eq!(records[1].original_filename, "alpha.txt");
        assert_eq!(records[1].tag, "not-a-tag");
    }

    #[tokio::test]
    async fn test_writes_hmac_field_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hmac_store.json");
        let store = JsonFileRecordStore::open(&path).await.unwrap();

        store
            .insert(crate::records::test_support::record("abc_a.txt", "a.txt", "TAG", 3))
            .await
            .unwrap();

        let value: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["abc_a.txt"]["hmac"], "TAG");
        assert_eq!(value["abc_a.txt"]["file_size"], 3);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hmac_store.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileRecordStore::open(&path).await.unwrap();
        assert!(matches!(store.list().await, Err(StoreError::Serialization(_))));
    }
}
