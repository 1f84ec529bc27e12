//! Content hashing and byte-accurate string truncation.
//!
//! Every cache key in the engine is a compound of these hashes, so the
//! functions here must be deterministic down to the byte.

use sha2::{Digest, Sha256};

/// SHA-256 over the UTF-8 bytes of `input`, lowercase hex output.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hash a list of key fields as a single colon-joined string.
///
/// Used for compound cache keys: the joined rendering keeps the hash
/// sensitive to every individual field.
pub fn sha256_fields(fields: &[&str]) -> String {
    sha256_hex(&fields.join(":"))
}

/// Truncate `s` so its UTF-8 byte length is at most `max`.
///
/// Strings already within the bound are returned unchanged. Oversized
/// strings are repeatedly cut to 85% of their current character length
/// until they fit, so the result never splits a code point.
pub fn clamp_by_bytes(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    let mut keep = chars.len();
    let mut out = s.to_string();
    while out.len() > max && keep > 0 {
        keep = keep * 85 / 100;
        out = chars[..keep].iter().collect();
    }
    out
}

/// Truncate `s` to at most `max` characters (not bytes).
///
/// Used for display-oriented caps like the 120-char first-line excerpt
/// in file summaries, where the bound is visual rather than a budget.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // Well-known digest of the empty string.
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_fields_joins_with_colon() {
        assert_eq!(sha256_fields(&["a", "b"]), sha256_hex("a:b"));
        assert_ne!(sha256_fields(&["a", "b"]), sha256_fields(&["a:b"]));
    }

    #[test]
    fn clamp_returns_short_strings_unchanged() {
        assert_eq!(clamp_by_bytes("hello", 5), "hello");
        assert_eq!(clamp_by_bytes("", 0), "");
    }

    #[test]
    fn clamp_cuts_oversized_strings() {
        let s = "x".repeat(1000);
        let out = clamp_by_bytes(&s, 100);
        assert!(out.len() <= 100);
        assert!(!out.is_empty());
    }

    #[test]
    fn clamp_never_splits_code_points() {
        // Multi-byte characters: each '€' is 3 bytes.
        let s = "€".repeat(50);
        let out = clamp_by_bytes(&s, 16);
        assert!(out.len() <= 16);
        assert!(out.chars().all(|c| c == '€'));
    }

    #[test]
    fn clamp_to_zero_yields_empty() {
        assert_eq!(clamp_by_bytes("abc", 0), "");
    }

    #[test]
    fn truncate_chars_counts_characters() {
        assert_eq!(truncate_chars("€€€€", 2), "€€");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
