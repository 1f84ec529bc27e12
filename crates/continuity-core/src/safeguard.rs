//! Branch-aware gate for automatic memory-branch commits.
//!
//! The engine never mutates the repository; it only decides whether a
//! commit of memory artifacts *would* be permitted and records the block
//! when it is not. Auto-commits are confined to the designated memory
//! branch so session artifacts can never land on a work branch.

use crate::settings::{ArtifactPolicy, Settings};

/// Outcome of the safeguard check for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeguardDecision {
    /// The configured policy asked for an automatic commit.
    pub requested: bool,
    /// The commit would be permitted on the current branch.
    pub allowed: bool,
}

impl SafeguardDecision {
    pub fn blocked(&self) -> bool {
        self.requested && !self.allowed
    }
}

/// Evaluate auto-commit eligibility for the current branch.
pub fn evaluate(settings: &Settings, current_branch: &str) -> SafeguardDecision {
    let requested = settings.artifact_policy == ArtifactPolicy::AutoWriteMemoryBranch
        && settings.auto_commit_to_memory_branch;
    SafeguardDecision {
        requested,
        allowed: requested && current_branch == settings.memory_branch,
    }
}

/// Fingerprint for the devlog recording a blocked auto-commit.
pub fn block_fingerprint(head_commit: &str, current_branch: &str) -> String {
    format!("{head_commit}:auto-commit-blocked:{current_branch}")
}
