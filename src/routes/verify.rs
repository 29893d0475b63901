//! Verification endpoints
//!
//! `/verify` checks a file against a tag the client supplies.
//! `/quick-verify` finds the stored record a file corresponds to.

use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::form::FileForm;
use crate::error::{AppError, Result};
use crate::integrity::MatchVerdict;
use crate::service::QuickVerifyOutcome;
use crate::state::AppState;

#[derive(Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub is_valid: bool,
    pub message: String,
    pub provided_hmac: String,
    pub calculated_hmac: String,
    pub file_size: u64,
}

/// Quick verification response
///
/// Record fields are present only when a record matched.
#[derive(Serialize)]
pub struct QuickVerifyResponse {
    pub success: bool,
    pub is_valid: bool,
    pub match_found: bool,
    pub match_type: &'static str,
    pub message: String,
    pub current_filename: String,
    pub calculated_hmac: String,
    pub file_size: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_hmac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_file_size: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_renamed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_difference: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl From<QuickVerifyOutcome> for QuickVerifyResponse {
    fn from(outcome: QuickVerifyOutcome) -> Self {
        let verdict = &outcome.verdict;
        let record = verdict.matched_record();

        let mut response = QuickVerifyResponse {
            success: true,
            is_valid: verdict.is_authentic(),
            match_found: record.is_some(),
            match_type: verdict.kind().as_str(),
            message: String::new(),
            current_filename: outcome.current_filename.clone(),
            calculated_hmac: verdict.computed_tag().to_base64(),
            file_size: outcome.file_size,
            stored_filename: record.map(|r| r.stored_id.clone()),
            original_filename: record.map(|r| r.original_filename.clone()),
            upload_time: record.map(|r| r.upload_time),
            stored_hmac: record.map(|r| r.tag.clone()),
            stored_file_size: record.map(|r| r.file_size),
            is_renamed: None,
            warning: None,
            size_difference: None,
            note: None,
            suggestion: None,
        };

        match verdict {
            MatchVerdict::ContentMatch {
                record, is_renamed, ..
            } => {
                response.message =
                    "File integrity verified! This file matches the stored version.".to_string();
                response.is_renamed = Some(*is_renamed);
                if *is_renamed {
                    response.warning = Some(format!(
                        "File was renamed from \"{}\" to \"{}\"",
                        record.original_filename, outcome.current_filename
                    ));
                }
            }
            MatchVerdict::FilenameMatch { .. } => {
                response.message =
                    "File has been modified! Found stored version but content differs."
                        .to_string();
            }
            MatchVerdict::PossiblyModified {
                record, size_delta, ..
            } => {
                response.message = format!(
                    "No exact match, but \"{}\" has a similar size. The file may have been modified.",
                    record.original_filename
                );
                response.size_difference = Some(*size_delta);
                response.note = Some(
                    "Matched by file size only; this is not proof that the files are related."
                        .to_string(),
                );
            }
            MatchVerdict::NoMatch { .. } => {
                response.message = format!(
                    "No stored version found for \"{}\". This might be a new file.",
                    outcome.current_filename
                );
                response.suggestion = Some(
                    "Upload this file first to store its HMAC for future verification."
                        .to_string(),
                );
            }
        }

        response
    }
}

/// Create the verification router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/verify", post(verify_file))
        .route("/quick-verify", post(quick_verify))
}

/// Verify a file against a supplied tag
async fn verify_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<VerifyResponse>> {
    let mut form = FileForm::read(multipart).await?;
    let file = form.take_file()?;
    let key = form.secret_key()?;
    let provided = form
        .hmac
        .clone()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| AppError::validation("HMAC value is required"))?;

    let outcome = state.service().verify(&file, &key, &provided)?;

    let message = if outcome.is_valid {
        "File integrity verified"
    } else {
        "File integrity check failed"
    };

    Ok(Json(VerifyResponse {
        success: true,
        is_valid: outcome.is_valid,
        message: message.to_string(),
        provided_hmac: provided,
        calculated_hmac: outcome.calculated_tag.to_base64(),
        file_size: outcome.file_size,
    }))
}

/// Classify a file against every stored record
async fn quick_verify(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<QuickVerifyResponse>> {
    let mut form = FileForm::read(multipart).await?;
    let file = form.take_file()?;
    let key = form.secret_key()?;

    let outcome = state.service().quick_verify(&file, &key).await?;
    Ok(Json(outcome.into()))
}
