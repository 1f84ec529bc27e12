//! Prompt tokenization into ranked search terms.

/// Words too generic to rank files by.
pub const STOPWORDS: &[&str] = &[
    "the", "this", "that", "with", "from", "into", "about", "would", "could", "should", "there",
    "their", "your", "need", "have", "please", "just", "when", "what", "where", "which", "while",
    "after", "before", "code", "repo", "project",
];

/// Maximum number of keywords retained from one prompt.
const MAX_KEYWORDS: usize = 6;

/// Minimum token length worth searching for.
const MIN_TOKEN_LEN: usize = 4;

/// Extract up to six search keywords from a prompt.
///
/// Lowercases, splits on anything outside `[a-z0-9_./-]`, drops short
/// tokens and stopwords, and deduplicates preserving first-seen order.
/// Deterministic for identical input.
pub fn extract_keywords(prompt: &str) -> Vec<String> {
    let lower = prompt.to_lowercase();
    let mut keywords: Vec<String> = Vec::new();
    for token in lower.split(|c: char| {
        !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '/' | '-'))
    }) {
        if token.len() < MIN_TOKEN_LEN {
            continue;
        }
        if STOPWORDS.contains(&token) {
            continue;
        }
        if keywords.iter().any(|k| k == token) {
            continue;
        }
        keywords.push(token.to_string());
        if keywords.len() == MAX_KEYWORDS {
            break;
        }
    }
    keywords
}
