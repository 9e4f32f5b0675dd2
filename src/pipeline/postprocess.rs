//! Post-processing: deterministic cleanup of rendered Markdown.
//!
//! ## Why is post-processing necessary?
//!
//! The renderer works node by node and cannot see the whole document, so
//! its output carries artefacts that are harmless individually but ugly
//! together:
//!
//! - runs of blank lines where several empty blocks were adjacent
//! - trailing spaces left over from collapsed inline whitespace
//! - headings glued to the previous paragraph after placeholder expansion
//! - zero-width spaces and soft hyphens copied from the page text
//!
//! Each rule is a pure `&str → String` pass, independently testable.
//!
//! ## Rule Order
//!
//! Normalise line endings before trimming, trim before collapsing blank
//! lines (whitespace-only lines would otherwise not count as blank), and
//! run the final-newline pass last.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all post-processing rules to rendered Markdown.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF)
/// 2. Trim trailing whitespace per line, keeping two-space hard breaks
/// 3. Collapse 3+ consecutive newlines down to one blank line
/// 4. Ensure heading lines have a blank line before them
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 6. Ensure the file ends with exactly one newline
///
/// Rules 2 and 4 leave fenced code blocks alone.
pub fn clean_markdown(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = normalise_heading_spacing(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

/// Tracks whether a line sits inside a fenced code block.
#[derive(Default)]
struct FenceState {
    open: Option<String>,
}

impl FenceState {
    /// Feed one line; returns true if the line belongs to a code block
    /// (fence lines included).
    fn step(&mut self, line: &str) -> bool {
        let trimmed = line.trim_start();
        let marker: String = trimmed
            .chars()
            .take_while(|&c| c == '`' || c == '~')
            .collect();
        let is_fence = marker.len() >= 3
            && (marker.chars().all(|c| c == '`') || marker.chars().all(|c| c == '~'));
        match &self.open {
            Some(open) => {
                if is_fence && marker.starts_with(open.as_str()) && trimmed[marker.len()..].trim().is_empty() {
                    self.open = None;
                }
                true
            }
            None if is_fence => {
                self.open = Some(marker);
                true
            }
            None => false,
        }
    }
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    let mut fences = FenceState::default();
    input
        .lines()
        .map(|line| {
            if fences.step(line) {
                return line.to_string();
            }
            let trimmed = line.trim_end();
            // "text  " is a Markdown hard break; keep exactly two spaces.
            if !trimmed.is_empty() && line.ends_with("  ") {
                format!("{}  ", trimmed)
            } else {
                trimmed.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 3: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 4: Normalise heading spacing ────────────────────────────────────────

static RE_ATX_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6} ").unwrap());

fn normalise_heading_spacing(input: &str) -> String {
    let mut fences = FenceState::default();
    let mut result = String::with_capacity(input.len() + 64);
    for (i, line) in input.lines().enumerate() {
        let in_code = fences.step(line);
        if !in_code && i > 0 && RE_ATX_HEADING.is_match(line) {
            let trimmed = result.trim_end_matches('\n');
            result.truncate(trimmed.len());
            result.push_str("\n\n");
        }
        result.push_str(line);
        result.push('\n');
    }
    result
}

// ── Rule 5: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 6: Ensure file ends with single newline ─────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    let trimmed = trimmed.trim_start_matches('\n');
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
