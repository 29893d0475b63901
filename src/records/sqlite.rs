//! SQLite record store

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use super::{parse_timestamp, RecordStore, StoredRecord};
use crate::error::StoreError;

/// Record store backed by a SQLite table
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Connect to a database URL and make sure the schema exists
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Wrap an existing pool; call [`init`](Self::init) before use
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the records table
    pub async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hmac_records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                stored_id TEXT NOT NULL UNIQUE,
                original_filename TEXT NOT NULL,
                tag TEXT NOT NULL,
                upload_time TEXT NOT NULL,
                file_size INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_hmac_records_filename ON hmac_records(original_filename);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordStore for SqliteRecordStore {
    async fn list(&self) -> Result<Vec<StoredRecord>, StoreError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT stored_id, original_filename, tag, upload_time, file_size
            FROM hmac_records
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RecordRow::into_record).collect()
    }

    async fn get(&self, stored_id: &str) -> Result<Option<StoredRecord>, StoreError> {
        let row = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT stored_id, original_filename, tag, upload_time, file_size
            FROM hmac_records
            WHERE stored_id = ?
            "#,
        )
        .bind(stored_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RecordRow::into_record).transpose()
    }

    async fn insert(&self, record: StoredRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO hmac_records (stored_id, original_filename, tag, upload_time, file_size)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.stored_id)
        .bind(&record.original_filename)
        .bind(&record.tag)
        .bind(record.upload_time.to_rfc3339())
        .bind(record.file_size as i64)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateId(record.stored_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, stored_id: &str) -> Result<Option<StoredRecord>, StoreError> {
        let Some(record) = self.get(stored_id).await? else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM hmac_records WHERE stored_id = ?")
            .bind(stored_id)
            .execute(&self.pool)
            .await?;

        Ok(Some(record))
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        let result = sqlx::query("DELETE FROM hmac_records")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() as usize)
    }
}

/// Internal row type for SQLite queries
#[derive(sqlx::FromRow)]
struct RecordRow {
    stored_id: String,
    original_filename: String,
    tag: String,
    upload_time: String,
    file_size: i64,
}

impl RecordRow {
    fn into_record(self) -> Result<StoredRecord, StoreError> {
        let upload_time = parse_timestamp(&self.upload_time).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "{}: unreadable upload_time '{}'",
                self.stored_id, self.upload_time
            ))
        })?;

        let file_size = u64::try_from(self.file_size).map_err(|_| {
            StoreError::Corrupt(format!("{}: negative file_size", self.stored_id))
        })?;

        Ok(StoredRecord {
            stored_id: self.stored_id,
            original_filename: self.original_filename,
            tag: self.tag,
            upload_time,
            file_size,
        })
    }
}
