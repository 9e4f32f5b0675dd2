//! YAML front-matter block for the emitted document.

/// Build a front-matter block from ordered `(key, value)` pairs.
///
/// Absent or empty values are omitted. Values are double-quoted with `"` and
/// `\` escaped; line breaks fold to a space so every field stays on one line.
/// Returns an empty string when no field survives.
pub fn build_frontmatter(fields: &[(&str, Option<&str>)]) -> String {
    let lines: Vec<String> = fields
        .iter()
        .filter_map(|(key, value)| {
            let value = (*value)?;
            if value.is_empty() {
                return None;
            }
            Some(format!("{}: \"{}\"", key, escape(value)))
        })
        .collect();
    if lines.is_empty() {
        return String::new();
    }
    format!("---\n{}\n---\n", lines.join("\n"))
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push(' ');
            }
            '\n' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}
