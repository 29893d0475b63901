//! Integrity tags
//!
//! Keyed HMAC-SHA256 over raw file bytes, carried around as standard base64.
//! Tags persisted by earlier deployments use the same encoding, so the output
//! of [`compute`] must stay byte-for-byte stable.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// Constants
// ============================================================================

/// Raw tag length in bytes (SHA-256 output)
pub const TAG_LEN: usize = 32;

/// Encoded tag length in characters (base64 with padding)
pub const ENCODED_TAG_LEN: usize = 44;

// ============================================================================
// Tag
// ============================================================================

/// A computed HMAC-SHA256 tag
///
/// Equality is checked in constant time.
#[derive(Clone, Copy)]
pub struct Tag([u8; TAG_LEN]);

/// Error returned when a string is not a well-formed tag
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagParseError {
    #[error("tag is not valid base64")]
    InvalidEncoding,

    #[error("tag decodes to {0} bytes, expected 32")]
    InvalidLength(usize),
}

impl Tag {
    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; TAG_LEN] {
        &self.0
    }

    /// Standard base64 encoding, no whitespace
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for Tag {}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Tag").field(&self.to_base64()).finish()
    }
}

impl FromStr for Tag {
    type Err = TagParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = STANDARD
            .decode(s)
            .map_err(|_| TagParseError::InvalidEncoding)?;
        let raw: [u8; TAG_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TagParseError::InvalidLength(bytes.len()))?;
        Ok(Tag(raw))
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Compute the tag of `content` under `key`
pub fn compute(content: &[u8], key: &[u8]) -> Tag {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(content);

    let mut raw = [0u8; TAG_LEN];
    raw.copy_from_slice(&mac.finalize().into_bytes());
    Tag(raw)
}

/// Compare two encoded tags in constant time
///
/// Anything that does not decode to a full tag compares unequal.
pub fn compare(tag_a: &str, tag_b: &str) -> bool {
    let (Ok(a), Ok(b)) = (tag_a.parse::<Tag>(), tag_b.parse::<Tag>()) else {
        return false;
    };
    a == b
}

/// Check `content` against an expected encoded tag
pub fn verify(content: &[u8], key: &[u8], expected_tag: &str) -> bool {
    compare(&compute(content, key).to_base64(), expected_tag)
}

/// Read a file and compute its tag
pub fn compute_file(path: impl AsRef<Path>, key: &[u8]) -> std::io::Result<Tag> {
    let data = std::fs::read(path)?;
    Ok(compute(&data, key))
}

/// Read a file and check it against an expected tag
///
/// An unreadable file fails verification.
pub fn verify_file(path: impl AsRef<Path>, key: &[u8], expected_tag: &str) -> bool {
    let path = path.as_ref();
    match std::fs::read(path) {
        Ok(data) => verify(&data, key, expected_tag),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot read file for verification");
            false
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
