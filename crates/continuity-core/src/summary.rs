//! Structural file summaries for the context pack.
//!
//! A summary is a few lines of metadata plus the file's symbol/export
//! lines. It is cached keyed by content hash, so the builder must be a
//! pure function of `(path, contents)`.

use crate::hash::truncate_chars;

/// Maximum symbol lines collected per file.
const MAX_SYMBOLS: usize = 12;

/// Character cap on the joined symbol line.
const MAX_SYMBOLS_CHARS: usize = 900;

/// Character cap on the first-line excerpt.
const MAX_FIRST_LINE_CHARS: usize = 120;

/// Build the summary block for one file.
pub fn build_file_summary(path: &str, contents: &str) -> String {
    let mut out = format!("file: {path}\nlines: {}", contents.lines().count());

    if let Some(first) = contents.lines().find(|l| !l.trim().is_empty()) {
        out.push_str("\nfirst_line: ");
        out.push_str(&truncate_chars(first.trim(), MAX_FIRST_LINE_CHARS));
    }

    let symbols: Vec<&str> = contents
        .lines()
        .map(str::trim)
        .filter(|l| is_symbol_line(l))
        .take(MAX_SYMBOLS)
        .collect();
    if !symbols.is_empty() {
        out.push_str("\nsymbols: ");
        out.push_str(&truncate_chars(&symbols.join(" | "), MAX_SYMBOLS_CHARS));
    }

    out
}

/// Whether a trimmed line looks like a symbol or export declaration.
fn is_symbol_line(trimmed: &str) -> bool {
    if trimmed.starts_with("export ") || trimmed.starts_with("module.exports") {
        return true;
    }
    ["class ", "function ", "interface ", "type "]
        .iter()
        .any(|kw| {
            trimmed
                .strip_prefix(kw)
                .and_then(|rest| rest.chars().next())
                .map(|c| c.is_ascii_alphabetic() || c == '_')
                .unwrap_or(false)
        })
}
