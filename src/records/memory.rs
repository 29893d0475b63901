//! In-memory record store

use tokio::sync::RwLock;

use super::{RecordStore, StoredRecord};
use crate::error::StoreError;

/// Record store held entirely in process memory
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<Vec<StoredRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with records, kept in the given order
    pub fn with_records(records: Vec<StoredRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryRecordStore {
    async fn list(&self) -> Result<Vec<StoredRecord>, StoreError> {
        Ok(self.records.read().await.clone())
    }

    async fn get(&self, stored_id: &str) -> Result<Option<StoredRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.stored_id == stored_id).cloned())
    }

    async fn insert(&self, record: StoredRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.stored_id == record.stored_id) {
            return Err(StoreError::DuplicateId(record.stored_id));
        }
        records.push(record);
        Ok(())
    }

    async fn delete(&self, stored_id: &str) -> Result<Option<StoredRecord>, StoreError> {
        let mut records = self.records.write().await;
        let removed = records
            .iter()
            .position(|r| r.stored_id == stored_id)
            .map(|idx| records.remove(idx));
        Ok(removed)
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        let mut records = self.records.write().await;
        let count = records.len();
        records.clear();
        Ok(count)
    }
}
