//! Caption → title/filename sanitization.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Used when the caption is absent or sanitizes to nothing.
pub const FALLBACK_TITLE: &str = "Untitled Video";

/// Upper bound on title length, in characters.
pub const MAX_TITLE_CHARS: usize = 100;

/// Most filesystems limit a single path segment to 255 bytes.
pub const MAX_FILE_NAME_BYTES: usize = 255;

const FILE_EXTENSION: &str = ".mp4";

static FORBIDDEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\n]+"#).expect("static pattern"));

/// A caption reduced to something safe both as a YouTube title and as a
/// single path segment. Always non-empty, at most 100 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SanitizedTitle(String);

impl SanitizedTitle {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<title>.mp4`, with the stem cut on a char boundary so the whole
    /// name fits in [`MAX_FILE_NAME_BYTES`].
    pub fn file_name(&self) -> String {
        let budget = MAX_FILE_NAME_BYTES - FILE_EXTENSION.len();
        let mut end = self.0.len().min(budget);
        while !self.0.is_char_boundary(end) {
            end -= 1;
        }
        let stem = self.0[..end].trim_end();
        let stem = if stem.is_empty() { FALLBACK_TITLE } else { stem };
        format!("{}{}", stem, FILE_EXTENSION)
    }
}

impl fmt::Display for SanitizedTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SanitizedTitle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn sanitize(raw: Option<&str>) -> SanitizedTitle {
    let raw = match raw {
        Some(r) => r,
        None => return SanitizedTitle(FALLBACK_TITLE.to_string()),
    };

    let stripped = FORBIDDEN.replace_all(raw, "");
    let title: String = stripped.trim().chars().take(MAX_TITLE_CHARS).collect();

    if title.is_empty() {
        SanitizedTitle(FALLBACK_TITLE.to_string())
    } else {
        SanitizedTitle(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORBIDDEN_CHARS: [char; 10] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*', '\n'];

    #[test]
    fn test_empty_and_absent_fall_back() {
        assert_eq!(sanitize(Some("")).as_str(), "Untitled Video");
        assert_eq!(sanitize(None).as_str(), "Untitled Video");
        assert_eq!(sanitize(Some("   \t ")).as_str(), "Untitled Video");
        assert_eq!(sanitize(Some("<>:\"/\\|?*\n")).as_str(), "Untitled Video");
    }

    #[test]
    fn test_strips_path_breaking_characters() {
        assert_eq!(sanitize(Some("a/b\\c:d")).as_str(), "abcd");
        assert_eq!(sanitize(Some("My Trip: Day 1")).as_str(), "My Trip Day 1");
        assert_eq!(
            sanitize(Some("line one\nline two")).as_str(),
            "line oneline two"
        );
    }

    #[test]
    fn test_truncates_to_100_chars() {
        let long: String = "abcdefghij".repeat(20);
        let title = sanitize(Some(&long));
        assert_eq!(title.as_str().chars().count(), 100);
        assert_eq!(title.as_str(), &long[..100]);
    }

    #[test]
    fn test_truncation_counts_characters_not_bytes() {
        let long: String = "видео🎬".repeat(30);
        let title = sanitize(Some(&long));
        assert_eq!(title.as_str().chars().count(), 100);
    }

    #[test]
    fn test_file_name_fits_segment_limit_for_wide_scripts() {
        let title = sanitize(Some(&"東京旅行の一日目".repeat(13)));
        assert_eq!(title.as_str().chars().count(), 100);
        assert_eq!(title.as_str().len(), 300);

        let name = title.file_name();
        assert!(name.len() <= MAX_FILE_NAME_BYTES, "{} bytes", name.len());
        assert!(name.ends_with(".mp4"));
        assert!(title.as_str().starts_with(name.trim_end_matches(".mp4")));

        let emoji = sanitize(Some(&"🎬".repeat(100)));
        let name = emoji.file_name();
        assert!(name.len() <= MAX_FILE_NAME_BYTES);
        assert_eq!(name, format!("{}.mp4", "🎬".repeat(62)));
    }

    #[test]
    fn test_trims_whitespace() {
        assert_eq!(sanitize(Some("  hello  ")).as_str(), "hello");
        assert_eq!(sanitize(Some("\n\n  hello")).as_str(), "hello");
    }

    #[test]
    fn test_invariants_over_mixed_inputs() {
        let inputs = [
            "",
            "plain",
            "???",
            "a\r\nb",
            "<script>alert(1)</script>",
            "C:\\Users\\me\\video.mp4",
            "  spaced  out  ",
            "🎥 emoji caption 🎉",
            &"x ".repeat(80),
            &"/".repeat(300),
        ];
        for input in inputs {
            let title = sanitize(Some(input));
            let s = title.as_str();
            assert!(!s.is_empty(), "empty output for {:?}", input);
            assert!(s.chars().count() <= MAX_TITLE_CHARS, "too long for {:?}", input);
            assert!(
                !s.chars().any(|c| FORBIDDEN_CHARS.contains(&c)),
                "forbidden char in {:?}",
                s
            );
            assert_eq!(sanitize(Some(input)), title, "not deterministic for {:?}", input);
        }
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            sanitize(Some("My Trip: Day 1")).file_name(),
            "My Trip Day 1.mp4"
        );
    }
}
