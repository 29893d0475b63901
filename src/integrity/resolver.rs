//! Match resolution for quick verification
//!
//! Classifies an incoming file against the stored records without being told
//! which record to check. Evidence tiers, strongest first:
//!
//! 1. **Content match**: some record's tag equals the file's tag. Stops the
//!    scan at the first such record; the file name is irrelevant except for
//!    flagging a rename.
//! 2. **Filename match**: no content match, but a record carries the same
//!    file name. The first such record in scan order wins.
//! 3. **Possibly modified**: neither of the above, but some record's size is
//!    within [`SIZE_SIMILARITY_THRESHOLD`] bytes. The closest size wins, ties
//!    going to the earlier record.
//! 4. **No match**.
//!
//! Resolution reads the records and nothing else.

use super::tag::{self, Tag};
use crate::records::StoredRecord;

/// Maximum size difference, in bytes, for a record to count as similar
pub const SIZE_SIMILARITY_THRESHOLD: u64 = 50;

/// Kind of match found for a candidate file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    ContentMatch,
    FilenameMatch,
    PossiblyModified,
    NoMatch,
}

impl MatchKind {
    /// Wire name used by the HTTP API
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::ContentMatch => "content_match",
            MatchKind::FilenameMatch => "filename_only",
            MatchKind::PossiblyModified => "possibly_modified",
            MatchKind::NoMatch => "no_match",
        }
    }
}

/// Outcome of resolving a candidate file against the record set
#[derive(Debug, Clone, PartialEq)]
pub enum MatchVerdict {
    /// Content is byte-identical to a stored file
    ContentMatch {
        record: StoredRecord,
        computed_tag: Tag,
        is_renamed: bool,
    },

    /// Same file name as a stored file, different content
    FilenameMatch {
        record: StoredRecord,
        computed_tag: Tag,
    },

    /// Size close to a stored file; weak evidence only
    PossiblyModified {
        record: StoredRecord,
        computed_tag: Tag,
        size_delta: u64,
    },

    /// Nothing resembles the candidate
    NoMatch { computed_tag: Tag },
}

impl MatchVerdict {
    pub fn kind(&self) -> MatchKind {
        match self {
            MatchVerdict::ContentMatch { .. } => MatchKind::ContentMatch,
            MatchVerdict::FilenameMatch { .. } => MatchKind::FilenameMatch,
            MatchVerdict::PossiblyModified { .. } => MatchKind::PossiblyModified,
            MatchVerdict::NoMatch { .. } => MatchKind::NoMatch,
        }
    }

    /// The stored record the candidate was matched to, if any
    pub fn matched_record(&self) -> Option<&StoredRecord> {
        match self {
            MatchVerdict::ContentMatch { record, .. }
            | MatchVerdict::FilenameMatch { record, .. }
            | MatchVerdict::PossiblyModified { record, .. } => Some(record),
            MatchVerdict::NoMatch { .. } => None,
        }
    }

    /// Tag computed over the candidate content
    pub fn computed_tag(&self) -> &Tag {
        match self {
            MatchVerdict::ContentMatch { computed_tag, .. }
            | MatchVerdict::FilenameMatch { computed_tag, .. }
            | MatchVerdict::PossiblyModified { computed_tag, .. }
            | MatchVerdict::NoMatch { computed_tag } => computed_tag,
        }
    }

    pub fn size_delta(&self) -> Option<u64> {
        match self {
            MatchVerdict::PossiblyModified { size_delta, .. } => Some(*size_delta),
            _ => None,
        }
    }

    pub fn is_renamed(&self) -> Option<bool> {
        match self {
            MatchVerdict::ContentMatch { is_renamed, .. } => Some(*is_renamed),
            _ => None,
        }
    }

    /// Only a content match proves authenticity
    pub fn is_authentic(&self) -> bool {
        matches!(self, MatchVerdict::ContentMatch { .. })
    }
}

/// Resolve a candidate file against `records`, scanned in iteration order
pub fn resolve_match<'r, I>(
    candidate_filename: &str,
    candidate_content: &[u8],
    key: &[u8],
    records: I,
) -> MatchVerdict
where
    I: IntoIterator<Item = &'r StoredRecord>,
{
    let computed_tag = tag::compute(candidate_content, key);
    let encoded = computed_tag.to_base64();
    let candidate_size = candidate_content.len() as u64;

    let mut by_filename: Option<&StoredRecord> = None;
    let mut closest_size: Option<(&StoredRecord, u64)> = None;

    for record in records {
        if tag::compare(&record.tag, &encoded) {
            return MatchVerdict::ContentMatch {
                is_renamed: record.original_filename != candidate_filename,
                record: record.clone(),
                computed_tag,
            };
        }

        if by_filename.is_none() && record.original_filename == candidate_filename {
            by_filename = Some(record);
        }

        let delta = record.file_size.abs_diff(candidate_size);
        if delta <= SIZE_SIMILARITY_THRESHOLD
            && closest_size.map_or(true, |(_, best)| delta < best)
        {
            closest_size = Some((record, delta));
        }
    }

    if let Some(record) = by_filename {
        return MatchVerdict::FilenameMatch {
            record: record.clone(),
            computed_tag,
        };
    }

    if let Some((record, size_delta)) = closest_size {
        return MatchVerdict::PossiblyModified {
            record: record.clone(),
            computed_tag,
            size_delta,
        };
    }

    MatchVerdict::NoMatch { computed_tag }
}

// ============================================================================
// Tests
// ============================================================================
