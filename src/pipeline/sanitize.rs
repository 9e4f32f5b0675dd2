//! Filename sanitising for the `.md` file stem and the image folder name.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_RESERVED: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[\\/:*?"<>|]"#).unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Turn an arbitrary title into a safe file/folder name.
///
/// Reserved characters become spaces, whitespace runs collapse to one space,
/// and the result is trimmed. An empty result becomes `"untitled"`.
/// The function is total and idempotent.
pub fn sanitize_filename(raw: &str) -> String {
    let spaced = RE_RESERVED.replace_all(raw, " ");
    let collapsed = RE_WHITESPACE.replace_all(&spaced, " ");
    let trimmed = collapsed.trim();
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_reserved_characters() {
        assert_eq!(sanitize_filename("Hello: World/Test?"), "Hello World Test");
        assert_eq!(sanitize_filename(r#"a\b*c"d<e>f|g"#), "a b c d e f g");
    }

    #[test]
    fn trims_and_collapses() {
        assert_eq!(sanitize_filename("  Hello World  "), "Hello World");
        assert_eq!(sanitize_filename("Hello \t\n  World"), "Hello World");
    }

    #[test]
    fn empty_becomes_untitled() {
        assert_eq!(sanitize_filename(""), "untitled");
        assert_eq!(sanitize_filename("???:::"), "untitled");
    }

    #[test]
    fn idempotent() {
        for raw in ["A: B", "  x  y ", "???", "Report | Q3 / 2025"] {
            let once = sanitize_filename(raw);
            assert_eq!(sanitize_filename(&once), once);
        }
    }
}
