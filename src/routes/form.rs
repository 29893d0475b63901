//! Multipart form parsing shared by the upload and verification endpoints
//!
//! Recognized fields: `file` (with a file name), `secret_key`, `hmac`.
//! Unknown fields are ignored.

use axum::extract::Multipart;

use crate::error::{AppError, Result};
use crate::service::{SecretKey, UploadedFile};

/// Parsed form fields; holds the raw key, so no `Debug`
#[derive(Default)]
pub struct FileForm {
    pub file: Option<UploadedFile>,
    pub secret_key: Option<String>,
    pub hmac: Option<String>,
}

impl FileForm {
    /// Drain a multipart body
    pub async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = FileForm::default();

        while let Some(field) = multipart.next_field().await.map_err(|e| {
            tracing::error!("Failed to read multipart field: {}", e);
            AppError::validation(format!("Invalid multipart data: {}", e))
        })? {
            let name = field.name().unwrap_or("").to_string();

            match name.as_str() {
                "file" => {
                    let filename = field.file_name().unwrap_or("").to_string();
                    let data = field.bytes().await.map_err(|e| {
                        tracing::error!("Failed to read file data: {}", e);
                        AppError::validation(format!("Failed to read file data: {}", e))
                    })?;

                    tracing::debug!(filename = %filename, size = data.len(), "Received file field");
                    form.file = Some(UploadedFile::new(filename, data.to_vec()));
                }
                "secret_key" | "hmac" => {
                    let value = field.text().await.map_err(|e| {
                        AppError::validation(format!("Failed to read field '{}': {}", name, e))
                    })?;
                    if name == "secret_key" {
                        form.secret_key = Some(value);
                    } else {
                        form.hmac = Some(value.trim().to_string());
                    }
                }
                other => {
                    tracing::debug!(field = %other, "Ignoring unknown multipart field");
                }
            }
        }

        Ok(form)
    }

    /// The uploaded file, which must be present
    pub fn take_file(&mut self) -> Result<UploadedFile> {
        self.file
            .take()
            .ok_or_else(|| AppError::validation("No file provided"))
    }

    /// The secret key, which must be present and non-empty
    pub fn secret_key(&self) -> Result<SecretKey> {
        SecretKey::new(self.secret_key.clone().unwrap_or_default())
    }
}
