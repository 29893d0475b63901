//! HMAC Uploader Server
//!
//! Upload text files, record an HMAC-SHA256 tag for each, and later check
//! whether a file is authentic, modified, renamed, or unknown.
//!
//! # Modules
//!
//! - `integrity`: tag computation and the quick-verify match resolver
//! - `records`: record store trait and its JSON, SQLite and memory backends
//! - `storage`: uploaded bytes on the local filesystem
//! - `service`: upload/verify/housekeeping operations
//! - `routes`: axum HTTP API

pub mod config;
pub mod error;
pub mod integrity;
pub mod records;
pub mod routes;
pub mod service;
pub mod sidecar;
pub mod state;
pub mod storage;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;
