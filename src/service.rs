//! Integrity service
//!
//! Wires the tag engine and match resolver to the record store and the file
//! storage. HTTP handlers stay thin and call into this layer.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;

use crate::error::{AppError, Result};
use crate::integrity::{self, MatchVerdict, Tag};
use crate::records::{RecordStore, StoredRecord};
use crate::sidecar;
use crate::storage::{generate_stored_id, has_allowed_extension, secure_filename, LocalFileStorage};

/// Text appended by the tamper simulation
pub const TAMPER_MARKER: &str = "\n[TAMPERED] This file has been modified!";

/// Fresh stored ids tried before an upload gives up
const STORED_ID_ATTEMPTS: usize = 8;

/// Builds a stored id from a sanitized file name
pub type StoredIdGenerator = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Loose file types removed by a full reset
const ORPHAN_EXTENSIONS: &[&str] = &["txt", sidecar::SIDECAR_EXTENSION];

// ============================================================================
// Inputs
// ============================================================================

/// Secret key supplied with a single request
///
/// Never persisted; `Debug` output is redacted.
#[derive(Clone)]
pub struct SecretKey(String);

impl SecretKey {
    /// Wrap a key, rejecting a missing or empty one
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(AppError::validation("Secret key is required"));
        }
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

/// A file as received from a client
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }

    fn require_name(&self) -> Result<()> {
        if self.filename.is_empty() {
            return Err(AppError::validation("No file selected"));
        }
        Ok(())
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of checking a file against an explicit tag
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub is_valid: bool,
    pub calculated_tag: Tag,
    pub file_size: u64,
}

/// Result of quick verification
#[derive(Debug, Clone)]
pub struct QuickVerifyOutcome {
    /// Sanitized name of the uploaded file
    pub current_filename: String,
    pub file_size: u64,
    pub verdict: MatchVerdict,
}

/// Result of the tamper simulation
#[derive(Debug, Clone, Copy)]
pub struct TamperOutcome {
    pub original_size: u64,
    pub tampered_size: u64,
}

// ============================================================================
// Service
// ============================================================================

/// Upload, verification and housekeeping operations
#[derive(Clone)]
pub struct IntegrityService {
    records: Arc<dyn RecordStore>,
    files: LocalFileStorage,
    allowed_extensions: Vec<String>,
    new_stored_id: StoredIdGenerator,
}

impl IntegrityService {
    pub fn new(
        records: Arc<dyn RecordStore>,
        files: LocalFileStorage,
        allowed_extensions: Vec<String>,
    ) -> Self {
        Self {
            records,
            files,
            allowed_extensions,
            new_stored_id: Arc::new(generate_stored_id),
        }
    }

    /// Replace the stored id generator
    pub fn with_stored_id_generator(mut self, generator: StoredIdGenerator) -> Self {
        self.new_stored_id = generator;
        self
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    pub fn files(&self) -> &LocalFileStorage {
        &self.files
    }

    /// Store a file and record its tag
    pub async fn upload(&self, file: UploadedFile, key: &SecretKey) -> Result<StoredRecord> {
        file.require_name()?;

        if !has_allowed_extension(&file.filename, &self.allowed_extensions) {
            return Err(AppError::validation(self.extension_message()));
        }

        let original_filename = secure_filename(&file.filename);
        if original_filename.is_empty() {
            return Err(AppError::validation("Invalid file name"));
        }

        let tag = integrity::compute_tag(&file.content, key.as_bytes());
        let stored_id = self.store_bytes(&original_filename, &file.content).await?;

        let record = StoredRecord {
            stored_id: stored_id.clone(),
            original_filename,
            tag: tag.to_base64(),
            upload_time: Utc::now(),
            file_size: file.content.len() as u64,
        };

        if let Err(e) = self.records.insert(record.clone()).await {
            // the bytes were created by this upload, so removing them is safe
            if let Err(cleanup) = self.files.delete(&stored_id).await {
                tracing::error!(
                    stored_id = %stored_id,
                    error = %cleanup,
                    "Failed to remove bytes of unrecorded upload"
                );
            }
            return Err(e.into());
        }

        tracing::info!(
            stored_id = %record.stored_id,
            original_filename = %record.original_filename,
            file_size = record.file_size,
            "File uploaded"
        );

        Ok(record)
    }

    /// Write new bytes under a stored id that neither a record nor a file uses
    async fn store_bytes(&self, original_filename: &str, content: &[u8]) -> Result<String> {
        for _ in 0..STORED_ID_ATTEMPTS {
            let stored_id = (self.new_stored_id)(original_filename);

            if self.records.get(&stored_id).await?.is_some() {
                tracing::warn!(stored_id = %stored_id, "Stored id already recorded, retrying");
                continue;
            }

            if self.files.create(&stored_id, content).await? {
                return Ok(stored_id);
            }
            tracing::warn!(stored_id = %stored_id, "Stored id already on disk, retrying");
        }

        Err(AppError::Internal(format!(
            "no free stored id for {} after {} attempts",
            original_filename, STORED_ID_ATTEMPTS
        )))
    }

    /// Records whose file is still on disk, in insertion order
    pub async fn list_files(&self) -> Result<Vec<StoredRecord>> {
        let mut present = Vec::new();
        for record in self.records.list().await? {
            if self.files.exists(&record.stored_id).await {
                present.push(record);
            } else {
                tracing::debug!(stored_id = %record.stored_id, "Skipping record without file");
            }
        }
        Ok(present)
    }

    /// Stored bytes together with their record
    pub async fn download(&self, stored_id: &str) -> Result<(StoredRecord, Vec<u8>)> {
        if !self.files.exists(stored_id).await {
            return Err(AppError::not_found("File not found"));
        }

        let record = self
            .records
            .get(stored_id)
            .await?
            .ok_or_else(|| AppError::not_found("File information not found"))?;

        let data = self.files.read(stored_id).await?;
        Ok((record, data))
    }

    /// Sidecar text for a record, with its download file name
    pub async fn sidecar(&self, stored_id: &str) -> Result<(String, String)> {
        let record = self
            .records
            .get(stored_id)
            .await?
            .ok_or_else(|| AppError::not_found("File not found"))?;

        let file_name = format!("{}.{}", stored_id, sidecar::SIDECAR_EXTENSION);
        Ok((file_name, sidecar::render(&record)))
    }

    /// Check a file against an explicitly supplied tag
    pub fn verify(
        &self,
        file: &UploadedFile,
        key: &SecretKey,
        expected_tag: &str,
    ) -> Result<VerifyOutcome> {
        if expected_tag.is_empty() {
            return Err(AppError::validation("HMAC value is required"));
        }
        file.require_name()?;

        let calculated_tag = integrity::compute_tag(&file.content, key.as_bytes());
        let is_valid = integrity::compare(&calculated_tag.to_base64(), expected_tag.trim());

        tracing::info!(
            filename = %file.filename,
            file_size = file.content.len(),
            is_valid,
            "Verified file against supplied HMAC"
        );

        Ok(VerifyOutcome {
            is_valid,
            calculated_tag,
            file_size: file.content.len() as u64,
        })
    }

    /// Find the stored record a file corresponds to
    pub async fn quick_verify(
        &self,
        file: &UploadedFile,
        key: &SecretKey,
    ) -> Result<QuickVerifyOutcome> {
        file.require_name()?;

        let current_filename = secure_filename(&file.filename);
        let snapshot = self.records.list().await?;
        let verdict = integrity::resolve_match(
            &current_filename,
            &file.content,
            key.as_bytes(),
            &snapshot,
        );

        tracing::info!(
            filename = %current_filename,
            file_size = file.content.len(),
            records_scanned = snapshot.len(),
            match_type = verdict.kind().as_str(),
            matched = ?verdict.matched_record().map(|r| r.stored_id.as_str()),
            "Quick verification complete"
        );

        Ok(QuickVerifyOutcome {
            current_filename,
            file_size: file.content.len() as u64,
            verdict,
        })
    }

    /// Append a marker to a stored file so later verification fails
    pub async fn simulate_tamper(&self, stored_id: &str) -> Result<TamperOutcome> {
        let original_size = self.files.read(stored_id).await?.len() as u64;
        let tampered_size = self
            .files
            .append(stored_id, TAMPER_MARKER.as_bytes())
            .await?;

        tracing::warn!(
            stored_id = %stored_id,
            original_size,
            tampered_size,
            "Simulated tampering on stored file"
        );

        Ok(TamperOutcome {
            original_size,
            tampered_size,
        })
    }

    /// Remove a file and its record
    pub async fn delete(&self, stored_id: &str) -> Result<StoredRecord> {
        if self.records.get(stored_id).await?.is_none() {
            return Err(AppError::not_found("File not found in records"));
        }

        self.files.delete(stored_id).await?;
        let record = self
            .records
            .delete(stored_id)
            .await?
            .ok_or_else(|| AppError::not_found("File not found in records"))?;

        tracing::info!(stored_id = %stored_id, "Deleted file and record");
        Ok(record)
    }

    /// Remove every stored file and record, plus loose `.txt`/`.hmac` files
    pub async fn reset_all(&self) -> Result<usize> {
        let mut deleted = 0;

        for record in self.records.list().await? {
            if self.files.delete(&record.stored_id).await? {
                deleted += 1;
            }
        }

        let cleared = self.records.clear().await?;
        deleted += self.files.remove_with_extensions(ORPHAN_EXTENSIONS).await?;

        tracing::info!(deleted_files = deleted, cleared_records = cleared, "Reset all files");
        Ok(deleted)
    }

    fn extension_message(&self) -> String {
        let list = self
            .allowed_extensions
            .iter()
            .map(|ext| format!(".{}", ext))
            .collect::<Vec<_>>()
            .join(", ");
        format!("Only {} files are allowed", list)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::integrity::MatchKind;
    use crate::records::test_support::record;
    use crate::records::MemoryRecordStore;
    use axum::{http::StatusCode, response::IntoResponse};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Hands out the given ids in order, then falls back to random ones
    fn scripted_ids(ids: &[&str]) -> StoredIdGenerator {
        let queue = Mutex::new(ids.iter().map(|id| id.to_string()).collect::<VecDeque<_>>());
        Arc::new(move |name: &str| {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| generate_stored_id(name))
        })
    }

    /// Store that looks empty but refuses every insert
    struct RejectingStore;

    #[async_trait::async_trait]
    impl RecordStore for RejectingStore {
        async fn list(&self) -> std::result::Result<Vec<StoredRecord>, StoreError> {
            Ok(Vec::new())
        }

        async fn get(&self, _: &str) -> std::result::Result<Option<StoredRecord>, StoreError> {
            Ok(None)
        }

        async fn insert(&self, record: StoredRecord) -> std::result::Result<(), StoreError> {
            Err(StoreError::DuplicateId(record.stored_id))
        }

        async fn delete(&self, _: &str) -> std::result::Result<Option<StoredRecord>, StoreError> {
            Ok(None)
        }

        async fn clear(&self) -> std::result::Result<usize, StoreError> {
            Ok(0)
        }
    }

    fn service(dir: &TempDir) -> IntegrityService {
        IntegrityService::new(
            Arc::new(MemoryRecordStore::new()),
            LocalFileStorage::new(dir.path()),
            vec!["txt".to_string()],
        )
    }

    fn key() -> SecretKey {
        SecretKey::new("mysecretkey").unwrap()
    }

    #[test]
    fn test_secret_key_rules() {
        assert!(matches!(SecretKey::new(""), Err(AppError::Validation(_))));
        assert_eq!(format!("{:?}", key()), "SecretKey([REDACTED])");
    }

    #[tokio::test]
    async fn test_upload_records_tag() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let record = svc
            .upload(UploadedFile::new("my notes.txt", "hello"), &key())
            .await
            .unwrap();

        assert_eq!(record.original_filename, "my_notes.txt");
        assert!(record.stored_id.ends_with("_my_notes.txt"));
        assert_eq!(record.file_size, 5);
        assert!(integrity::verify_tag(b"hello", b"mysecretkey", &record.tag));
        assert_eq!(svc.files().read(&record.stored_id).await.unwrap(), b"hello");
        assert_eq!(svc.list_files().await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_upload_validation() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let err = svc.upload(UploadedFile::new("", "x"), &key()).await.unwrap_err();
        assert_eq!(err.to_string(), "No file selected");

        let err = svc.upload(UploadedFile::new("a.png", "x"), &key()).await.unwrap_err();
        assert_eq!(err.to_string(), "Only .txt files are allowed");

        let record = svc
            .upload(UploadedFile::new("\u{65e5}\u{672c}.txt", "x"), &key())
            .await
            .unwrap();
        assert_eq!(record.original_filename, "txt");
    }

    #[tokio::test]
    async fn test_verify_and_tamper() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let record = svc
            .upload(UploadedFile::new("doc.txt", "contract v1"), &key())
            .await
            .unwrap();

        let (_, bytes) = svc.download(&record.stored_id).await.unwrap();
        let outcome = svc
            .verify(&UploadedFile::new("doc.txt", bytes), &key(), &record.tag)
            .unwrap();
        assert!(outcome.is_valid);

        let tamper = svc.simulate_tamper(&record.stored_id).await.unwrap();
        assert_eq!(tamper.original_size, 11);
        assert_eq!(tamper.tampered_size, 11 + TAMPER_MARKER.len() as u64);

        let (_, bytes) = svc.download(&record.stored_id).await.unwrap();
        let outcome = svc
            .verify(&UploadedFile::new("doc.txt", bytes), &key(), &record.tag)
            .unwrap();
        assert!(!outcome.is_valid);

        assert!(svc
            .verify(&UploadedFile::new("doc.txt", "x"), &key(), "")
            .is_err());
    }

    #[tokio::test]
    async fn test_quick_verify_uses_sanitized_name() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        svc.upload(UploadedFile::new("my report.txt", "v1"), &key())
            .await
            .unwrap();

        let outcome = svc
            .quick_verify(&UploadedFile::new("my report.txt", vec![b'z'; 500]), &key())
            .await
            .unwrap();

        assert_eq!(outcome.current_filename, "my_report.txt");
        assert_eq!(outcome.verdict.kind(), MatchKind::FilenameMatch);
    }

    #[tokio::test]
    async fn test_quick_verify_does_not_mutate_store() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        svc.upload(UploadedFile::new("a.txt", "alpha"), &key()).await.unwrap();
        let before = svc.records().list().await.unwrap();

        svc.quick_verify(&UploadedFile::new("b.txt", "alpha"), &key())
            .await
            .unwrap();

        assert_eq!(svc.records().list().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_sidecar_and_missing_records() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let record = svc
            .upload(UploadedFile::new("doc.txt", "body"), &key())
            .await
            .unwrap();

        let (name, text) = svc.sidecar(&record.stored_id).await.unwrap();
        assert_eq!(name, format!("{}.hmac", record.stored_id));
        assert_eq!(sidecar::parse(&text).unwrap().tag, record.tag);

        assert!(matches!(svc.sidecar("nope").await, Err(AppError::NotFound(_))));
        assert!(matches!(svc.download("nope").await, Err(AppError::NotFound(_))));
        assert!(matches!(svc.delete("nope").await, Err(AppError::NotFound(_))));
        assert!(matches!(
            svc.simulate_tamper("nope").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_and_reset() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let a = svc.upload(UploadedFile::new("a.txt", "a"), &key()).await.unwrap();
        svc.upload(UploadedFile::new("b.txt", "b"), &key()).await.unwrap();
        std::fs::write(dir.path().join("orphan.txt"), "o").unwrap();

        let removed = svc.delete(&a.stored_id).await.unwrap();
        assert_eq!(removed.stored_id, a.stored_id);
        assert!(!svc.files().exists(&a.stored_id).await);

        let deleted = svc.reset_all().await.unwrap();
        assert_eq!(deleted, 2);
        assert!(svc.records().list().await.unwrap().is_empty());
        assert!(!dir.path().join("orphan.txt").exists());
    }

    #[tokio::test]
    async fn test_list_skips_records_without_files() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let record = svc.upload(UploadedFile::new("a.txt", "a"), &key()).await.unwrap();
        std::fs::remove_file(dir.path().join(&record.stored_id)).unwrap();

        assert!(svc.list_files().await.unwrap().is_empty());
        assert_eq!(svc.records().list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_quick_verify_matches_accented_legacy_name() {
        let dir = TempDir::new().unwrap();
        let svc = IntegrityService::new(
            Arc::new(MemoryRecordStore::with_records(vec![record(
                "1a2b3c4d_cafe.txt",
                "cafe.txt",
                "TAG=",
                10,
            )])),
            LocalFileStorage::new(dir.path()),
            vec!["txt".to_string()],
        );

        let outcome = svc
            .quick_verify(&UploadedFile::new("caf\u{e9}.txt", vec![b'x'; 500]), &key())
            .await
            .unwrap();

        assert_eq!(outcome.current_filename, "cafe.txt");
        assert_eq!(outcome.verdict.kind(), MatchKind::FilenameMatch);
    }

    #[tokio::test]
    async fn test_upload_retries_colliding_stored_id() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir).with_stored_id_generator(scripted_ids(&[
            "deadbeef_a.txt",
            "deadbeef_a.txt",
            "cafef00d_a.txt",
        ]));

        let first = svc.upload(UploadedFile::new("a.txt", "first"), &key()).await.unwrap();
        assert_eq!(first.stored_id, "deadbeef_a.txt");

        let second = svc.upload(UploadedFile::new("a.txt", "second"), &key()).await.unwrap();
        assert_eq!(second.stored_id, "cafef00d_a.txt");

        assert_eq!(svc.files().read("deadbeef_a.txt").await.unwrap(), b"first");
        assert_eq!(svc.files().read("cafef00d_a.txt").await.unwrap(), b"second");
        assert_eq!(svc.list_files().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_upload_skips_id_already_on_disk() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("deadbeef_a.txt"), "stray").unwrap();

        let svc = service(&dir)
            .with_stored_id_generator(scripted_ids(&["deadbeef_a.txt", "cafef00d_a.txt"]));

        let record = svc.upload(UploadedFile::new("a.txt", "new"), &key()).await.unwrap();

        assert_eq!(record.stored_id, "cafef00d_a.txt");
        assert_eq!(
            std::fs::read(dir.path().join("deadbeef_a.txt")).unwrap(),
            b"stray"
        );
    }

    #[tokio::test]
    async fn test_failed_insert_keeps_existing_bytes() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("deadbeef_a.txt"), "existing").unwrap();

        let svc = IntegrityService::new(
            Arc::new(RejectingStore),
            LocalFileStorage::new(dir.path()),
            vec!["txt".to_string()],
        )
        .with_stored_id_generator(scripted_ids(&["deadbeef_a.txt", "cafef00d_a.txt"]));

        let err = svc
            .upload(UploadedFile::new("a.txt", "new"), &key())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Store(StoreError::DuplicateId(_))));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);

        assert_eq!(
            std::fs::read(dir.path().join("deadbeef_a.txt")).unwrap(),
            b"existing"
        );
        assert!(!dir.path().join("cafef00d_a.txt").exists());
    }
}
