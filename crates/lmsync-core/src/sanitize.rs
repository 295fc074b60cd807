//! Path sanitization and small helpers shared across crates
//!
//! [`sanitize_path`] must be applied to every server- or user-derived path
//! segment before it touches the filesystem.

use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

/// Characters rejected by at least one common filesystem
const ILLEGAL_CHARS: &[char] = &[':', '*', '?', '"', '<', '>', '|'];

fn control_whitespace() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[\r\n\t]+").expect("static pattern"))
}

/// Makes a relative path safe to create on disk
///
/// - runs of `\r`, `\n` and `\t` collapse to one space
/// - `: * ? " < > |` become `_`
/// - both `/` and `\` are separators; every segment loses leading and
///   trailing dots and spaces, and segments left empty are dropped
///
/// The result uses `/` as separator and is idempotent:
/// `sanitize_path(&sanitize_path(x)) == sanitize_path(x)`.
pub fn sanitize_path(input: &str) -> String {
    let collapsed = control_whitespace().replace_all(input, " ");
    let replaced: String = collapsed
        .chars()
        .map(|c| if ILLEGAL_CHARS.contains(&c) { '_' } else { c })
        .collect();

    replaced
        .split(['/', '\\'])
        .map(|segment| segment.trim_matches(|c| c == '.' || c == ' '))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Inserts ` (n)` before the extension of `filename`
///
/// `numbered_filename("notes.pdf", 1)` is `"notes (1).pdf"`; names without an
/// extension get the suffix at the end.
pub fn numbered_filename(filename: &str, n: usize) -> String {
    match split_extension(filename) {
        (stem, Some(ext)) => format!("{stem} ({n}).{ext}"),
        (stem, None) => format!("{stem} ({n})"),
    }
}

/// Returns the extension of `filename` including the leading dot, or `""`
pub fn extension_with_dot(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => &filename[idx..],
        _ => "",
    }
}

fn split_extension(filename: &str) -> (&str, Option<&str>) {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => (&filename[..idx], Some(&filename[idx + 1..])),
        _ => (filename, None),
    }
}

/// Short correlation id for log lines
pub fn generate_uid() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Formats a byte count for humans
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else if b < GB {
        format!("{:.1} MB", b / MB)
    } else {
        format!("{:.2} GB", b / GB)
    }
}
