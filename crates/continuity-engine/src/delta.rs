//! Delta pack: what changed since this sub-session's previous turn.
//!
//! Three forms, chosen by comparing the current repo state to the last
//! persisted session state: a verbose first-run block, a minimal
//! "unchanged" block, and a full "changed" block with file list and diff.

use continuity_core::envelope::objective_line;
use continuity_core::hash::clamp_by_bytes;
use continuity_core::message::Message;
use continuity_core::state::{RepoState, SessionState};

/// Changed files listed in the delta.
const MAX_DELTA_FILES: usize = 20;

/// Stored messages scanned for the failing-test digest.
const DIGEST_MESSAGES: usize = 12;

/// Matching lines retained in the digest.
const DIGEST_LINES: usize = 40;

/// Byte cap on the digest.
const DIGEST_BYTES: usize = 2_000;

/// Substrings that mark a line as failure output.
const FAILURE_MARKERS: &[&str] = &["fail", "error", "exception", "assert"];

/// Extract recent failure lines from the session's message log.
///
/// Scans the text parts of the last few messages, keeps lines mentioning
/// failures, and clamps the tail. Empty when the session has been quiet.
pub fn failing_test_digest(messages: &[Message]) -> String {
    let start = messages.len().saturating_sub(DIGEST_MESSAGES);
    let mut matching: Vec<&str> = Vec::new();
    for message in &messages[start..] {
        for part in &message.parts {
            for line in part.text.lines() {
                let lower = line.to_lowercase();
                if FAILURE_MARKERS.iter().any(|m| lower.contains(m)) {
                    matching.push(line);
                }
            }
        }
    }
    let start = matching.len().saturating_sub(DIGEST_LINES);
    clamp_by_bytes(&matching[start..].join("\n"), DIGEST_BYTES)
}

/// Build the delta block for this turn.
pub fn build_delta_pack(
    prev: Option<&SessionState>,
    repo_state: &RepoState,
    prompt: &str,
    failing_digest: &str,
    diff_snippet: &str,
) -> String {
    let unchanged = prev
        .map(|p| p.last_changed_files_hash == repo_state.changed_files_hash)
        .unwrap_or(false);

    let mut out = String::new();
    match prev {
        None => out.push_str("first_run: true"),
        Some(_) if unchanged => out.push_str("repo_delta: unchanged"),
        Some(_) => out.push_str("repo_delta: changed"),
    }
    out.push_str("\nobjective: ");
    out.push_str(&objective_line(prompt));

    if !unchanged && !repo_state.changed_files.is_empty() {
        out.push_str("\nchanged_files:");
        for path in repo_state.changed_files.iter().take(MAX_DELTA_FILES) {
            out.push_str("\n- ");
            out.push_str(path);
        }
    }

    if !failing_digest.is_empty() {
        out.push_str("\nfailing_tests:\n");
        out.push_str(failing_digest);
    }

    if !unchanged && !diff_snippet.is_empty() {
        out.push_str("\ndiff:\n");
        out.push_str(diff_snippet);
    }

    out
}
