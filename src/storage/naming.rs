//! File naming helpers
//!
//! Uploaded names are sanitized before they are used anywhere, and stored ids
//! get a random prefix so two uploads of `report.txt` never collide.

use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

/// Reduce a client-supplied file name to a safe, flat ASCII name
///
/// The name is NFKD-decomposed so accented letters keep their base letter,
/// then the remaining non-ASCII is dropped. Path separators become word
/// breaks, whitespace runs become `_`, anything outside `[A-Za-z0-9_.-]` is
/// dropped, and leading/trailing `.` and `_` are trimmed. The result may be
/// empty.
pub fn secure_filename(filename: &str) -> String {
    let flattened: String = filename
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// Build a fresh stored id for a sanitized file name
pub fn generate_stored_id(sanitized_filename: &str) -> String {
    let unique = Uuid::new_v4().simple().to_string();
    format!("{}_{}", &unique[..8], sanitized_filename)
}

/// Whether the file name ends in one of the allowed extensions
///
/// Extensions are compared case-insensitively and without the leading dot.
pub fn has_allowed_extension(filename: &str, allowed: &[String]) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_lowercase();
            allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext))
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("My cool movie.mov"), "My_cool_movie.mov");
        assert_eq!(secure_filename("../../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("report.txt"), "report.txt");
        assert_eq!(secure_filename("  notes  v2 .txt"), "notes_v2_.txt");
        assert_eq!(secure_filename("C:\\Users\\me\\doc.txt"), "C_Users_me_doc.txt");
        assert_eq!(secure_filename("i contain cool \u{fc}ml\u{e4}uts.txt"), "i_contain_cool_umlauts.txt");
        assert_eq!(secure_filename("<script>.txt"), "script.txt");
        assert_eq!(secure_filename("caf\u{e9}.txt"), "cafe.txt");
        assert_eq!(secure_filename("cafe\u{301}.txt"), "cafe.txt");
        assert_eq!(secure_filename("\u{fb01}le.txt"), "file.txt");
    }

    #[test]
    fn test_secure_filename_can_be_empty() {
        assert_eq!(secure_filename(""), "");
        assert_eq!(secure_filename("..."), "");
        assert_eq!(secure_filename("\u{65e5}\u{672c}"), "");
    }

    #[test]
    fn test_generate_stored_id() {
        let id = generate_stored_id("report.txt");
        let (prefix, rest) = id.split_once('_').unwrap();

        assert_eq!(prefix.len(), 8);
        assert!(prefix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(rest, "report.txt");
        assert_ne!(id, generate_stored_id("report.txt"));
    }

    #[test]
    fn test_has_allowed_extension() {
        let allowed = vec!["txt".to_string()];

        assert!(has_allowed_extension("notes.txt", &allowed));
        assert!(has_allowed_extension("NOTES.TXT", &allowed));
        assert!(has_allowed_extension("archive.tar.txt", &allowed));
        assert!(!has_allowed_extension("image.png", &allowed));
        assert!(!has_allowed_extension("txt", &allowed));
        assert!(!has_allowed_extension("", &allowed));
    }
}
