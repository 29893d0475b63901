//! Storage module for uploaded file bytes
//!
//! Files live in a single local directory, one file per stored id.

mod local;
mod naming;

pub use local::LocalFileStorage;
pub use naming::{generate_stored_id, has_allowed_extension, secure_filename};
