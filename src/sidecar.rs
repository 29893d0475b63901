//! `.hmac` sidecar files
//!
//! A plain-text companion to an uploaded file carrying its tag:
//!
//! ```text
//! File: report.txt
//! HMAC: W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM=
//! Upload Time: 2024-05-01T10:00:00+00:00
//! File Size: 28 bytes
//! ```
//!
//! Only the `HMAC:` line is required when parsing; every other `key: value`
//! line is kept as informational metadata.

use std::collections::BTreeMap;

use crate::error::{AppError, Result};
use crate::records::StoredRecord;

/// File extension used for sidecars
pub const SIDECAR_EXTENSION: &str = "hmac";

/// Parsed sidecar contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sidecar {
    /// The expected tag
    pub tag: String,

    /// Remaining `key: value` lines
    pub info: BTreeMap<String, String>,
}

/// Render the sidecar for a stored record
pub fn render(record: &StoredRecord) -> String {
    format!(
        "File: {}\nHMAC: {}\nUpload Time: {}\nFile Size: {} bytes\n",
        record.original_filename,
        record.tag,
        record.upload_time.to_rfc3339(),
        record.file_size
    )
}

/// Render a sidecar for a local file that was never uploaded
pub fn render_local(file_name: &str, tag: &str, file_size: u64, generator: &str) -> String {
    format!(
        "File: {}\nHMAC: {}\nFile Size: {} bytes\nGenerated: {}\n",
        file_name, tag, file_size, generator
    )
}

/// Parse sidecar text
pub fn parse(content: &str) -> Result<Sidecar> {
    let mut tag = None;
    let mut info = BTreeMap::new();

    for line in content.trim().lines() {
        if let Some(value) = line.strip_prefix("HMAC:") {
            tag = Some(value.trim().to_string());
        } else if let Some((key, value)) = line.split_once(':') {
            info.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    match tag {
        Some(tag) if !tag.is_empty() => Ok(Sidecar { tag, info }),
        _ => Err(AppError::validation("HMAC file does not contain an HMAC line")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::test_support::record;

    #[test]
    fn test_render_then_parse() {
        let rec = record("1a2b3c4d_report.txt", "report.txt", "TAGVALUE=", 28);
        let text = render(&rec);

        assert!(text.starts_with("File: report.txt\nHMAC: TAGVALUE=\n"));
        assert!(text.contains("File Size: 28 bytes"));

        let parsed = parse(&text).unwrap();
        assert_eq!(parsed.tag, "TAGVALUE=");
        assert_eq!(parsed.info["File"], "report.txt");
        assert_eq!(parsed.info["File Size"], "28 bytes");
        assert_eq!(parsed.info["Upload Time"], "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_parse_keeps_padding_and_colons() {
        let parsed = parse("  HMAC:   abc/def+==  \nNote: a: b\n\n").unwrap();
        assert_eq!(parsed.tag, "abc/def+==");
        assert_eq!(parsed.info["Note"], "a: b");
    }

    #[test]
    fn test_parse_without_tag() {
        assert!(matches!(
            parse("File: report.txt\nFile Size: 3 bytes"),
            Err(AppError::Validation(_))
        ));
        assert!(parse("HMAC:   ").is_err());
    }

    #[test]
    fn test_render_local() {
        let text = render_local("doc.txt", "T=", 4, "hmac-verify");
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed.tag, "T=");
        assert_eq!(parsed.info["Generated"], "hmac-verify");
    }
}
