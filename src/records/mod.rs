//! Record store
//!
//! Persists one [`StoredRecord`] per uploaded file. Backends:
//! - `memory`: in-process, for tests and throwaway servers
//! - `json_file`: a single JSON object on disk, compatible with `hmac_store.json`
//! - `sqlite`: a table in a SQLite database via sqlx
//!
//! Every backend lists records in insertion order. Quick verification breaks
//! ties by scan order, so that order is part of the contract.

mod json_file;
mod memory;
mod sqlite;

pub use json_file::JsonFileRecordStore;
pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

// ============================================================================
// Record
// ============================================================================

/// Metadata and integrity tag for one uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Unique identifier, also the on-disk file name
    pub stored_id: String,

    /// Sanitized file name as uploaded
    pub original_filename: String,

    /// Base64 HMAC-SHA256 tag computed at upload time
    pub tag: String,

    /// When the file was uploaded
    pub upload_time: DateTime<Utc>,

    /// Size of the uploaded content in bytes
    pub file_size: u64,
}

// ============================================================================
// Store Trait
// ============================================================================

/// Trait for record store backends
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// All records, in insertion order
    async fn list(&self) -> Result<Vec<StoredRecord>, StoreError>;

    /// Look up a record by stored id
    async fn get(&self, stored_id: &str) -> Result<Option<StoredRecord>, StoreError>;

    /// Insert a new record; fails if the stored id is taken
    async fn insert(&self, record: StoredRecord) -> Result<(), StoreError>;

    /// Remove a record, returning it if it existed
    async fn delete(&self, stored_id: &str) -> Result<Option<StoredRecord>, StoreError>;

    /// Remove every record, returning how many were removed
    async fn clear(&self) -> Result<usize, StoreError>;
}

// ============================================================================
// Timestamps
// ============================================================================

/// Parse a stored upload time
///
/// Accepts RFC 3339 and naive ISO-8601 (`2024-05-01T10:00:00.123456`), the
/// latter taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::TimeZone;

    pub fn record(stored_id: &str, filename: &str, tag: &str, size: u64) -> StoredRecord {
        StoredRecord {
            stored_id: stored_id.to_string(),
            original_filename: filename.to_string(),
            tag: tag.to_string(),
            upload_time: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            file_size: size,
        }
    }

    /// Behaviour every backend must share
    pub async fn exercise_store(store: &dyn RecordStore) {
        assert!(store.list().await.unwrap().is_empty());

        for id in ["c", "a", "b"] {
            store
                .insert(record(&format!("{}_f.txt", id), "f.txt", "tag", 10))
                .await
                .unwrap();
        }

        let ids: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.stored_id)
            .collect();
        assert_eq!(ids, vec!["c_f.txt", "a_f.txt", "b_f.txt"]);

        let dup = store.insert(record("a_f.txt", "other.txt", "tag", 1)).await;
        assert!(matches!(dup, Err(StoreError::DuplicateId(_))));

        let got = store.get("a_f.txt").await.unwrap().unwrap();
        assert_eq!(got, record("a_f.txt", "f.txt", "tag", 10));
        assert!(store.get("missing").await.unwrap().is_none());

        let removed = store.delete("a_f.txt").await.unwrap();
        assert_eq!(removed.map(|r| r.stored_id), Some("a_f.txt".to_string()));
        assert!(store.delete("a_f.txt").await.unwrap().is_none());

        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.list().await.unwrap().is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_rfc3339() {
        let dt = parse_timestamp("2024-05-01T10:00:00+02:00").unwrap();
        assert_eq!(dt.hour(), 8);
    }

    #[test]
    fn test_parse_naive_isoformat() {
        let dt = parse_timestamp("2024-05-01T10:00:00.123456").unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.hour(), 10);
        assert_eq!(dt.nanosecond(), 123_456_000);

        assert!(parse_timestamp("2024-05-01T10:00:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
