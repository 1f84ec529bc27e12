//! Post-run event classification.
//!
//! Inspects what a completed turn did to the repository and what the
//! assistant said, and decides which durable artifacts the turn deserves:
//! a devlog entry, an ADR stub, a rejected-approach note, or nothing.

use crate::hash::sha256_hex;
use crate::state::RepoState;
use std::fmt;

/// Path prefixes considered architectural boundaries. A turn that touches
/// any of these warrants an ADR stub for later review.
pub const BOUNDARY_PREFIXES: &[&str] = &[
    "src/main/lib/trpc/",
    "src/main/lib/db/",
    "src/main/lib/continuity/",
    "src/main/lib/plugins/",
    "src/main/lib/mcp-",
    "src/main/lib/oauth",
    "src/main/lib/git/",
];

/// Diff size at which a turn is devlog-worthy on its own.
const DEVLOG_DIFF_LINES: u64 = 120;

/// Changed-file count at which a turn is devlog-worthy on its own.
const DEVLOG_CHANGED_FILES: usize = 6;

/// How much of the assistant response participates in the fingerprint.
const FINGERPRINT_RESPONSE_CHARS: usize = 160;

/// Phrases that signal the assistant abandoned its previous direction.
const DIRECTION_CHANGE_MARKERS: &[&str] = &["instead", "alternative approach", "pivot"];

/// Why a rejected-approach artifact fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectedReason {
    RunError,
    DirectionChange,
}

impl fmt::Display for RejectedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectedReason::RunError => write!(f, "run-error"),
            RejectedReason::DirectionChange => write!(f, "direction-change"),
        }
    }
}

/// Classification of one completed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnEvents {
    pub devlog: bool,
    pub adr: bool,
    pub rejected_approach: bool,
    pub rejected_reason: Option<RejectedReason>,
    pub reasons: Vec<String>,
    pub boundary_files: Vec<String>,
    pub event_fingerprint: String,
}

/// Classify a completed turn. Rules are additive: `devlog` fires if any
/// reason accumulates.
pub fn detect(
    repo_state: &RepoState,
    diff_lines: u64,
    assistant_response: &str,
    was_error: bool,
) -> TurnEvents {
    let mut reasons = Vec::new();
    let mut rejected_reason = None;

    if diff_lines >= DEVLOG_DIFF_LINES {
        reasons.push("diff>120".to_string());
    }
    if repo_state.changed_files.len() >= DEVLOG_CHANGED_FILES {
        reasons.push("changed_files>6".to_string());
    }
    if was_error {
        reasons.push("run-error".to_string());
        rejected_reason = Some(RejectedReason::RunError);
    }

    let boundary_files: Vec<String> = repo_state
        .changed_files
        .iter()
        .filter(|f| BOUNDARY_PREFIXES.iter().any(|p| f.starts_with(p)))
        .cloned()
        .collect();
    if !boundary_files.is_empty() {
        reasons.push("boundary-modules-touched".to_string());
    }

    let response_lower = assistant_response.to_lowercase();
    if !was_error
        && DIRECTION_CHANGE_MARKERS
            .iter()
            .any(|m| response_lower.contains(m))
    {
        rejected_reason = Some(RejectedReason::DirectionChange);
    }

    let fingerprint_head: String = response_lower
        .chars()
        .take(FINGERPRINT_RESPONSE_CHARS)
        .collect();
    let event_fingerprint = sha256_hex(&format!(
        "{}:{}:{}:{}:{}",
        repo_state.head_commit, repo_state.changed_files_hash, diff_lines, was_error,
        fingerprint_head
    ));

    TurnEvents {
        devlog: !reasons.is_empty(),
        adr: !boundary_files.is_empty(),
        rejected_approach: rejected_reason.is_some(),
        rejected_reason,
        reasons,
        boundary_files,
        event_fingerprint,
    }
}
