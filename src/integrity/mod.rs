//! Integrity engine
//!
//! - `tag`: HMAC-SHA256 tag computation and constant-time comparison
//! - `resolver`: classifies an uploaded file against stored records

pub mod resolver;
pub mod tag;

pub use resolver::{resolve_match, MatchKind, MatchVerdict, SIZE_SIMILARITY_THRESHOLD};
pub use tag::{
    compare, compute as compute_tag, verify as verify_tag, Tag, TagParseError, TAG_LEN,
};
