//! Durable user settings: artifact policy, auto-commit opt-in, memory branch.
//!
//! Stored as a singleton row in the settings table. Missing or unreadable
//! rows fall back to [`Settings::default`], so the engine always has a
//! usable policy.

use crate::budget::TokenMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the engine does with the artifacts it writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactPolicy {
    /// Write drafts; committing them is a manual act.
    #[default]
    AutoWriteManualCommit,
    /// Write drafts and, when permitted, commit them to the memory branch.
    AutoWriteMemoryBranch,
}

impl fmt::Display for ArtifactPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactPolicy::AutoWriteManualCommit => write!(f, "auto-write-manual-commit"),
            ArtifactPolicy::AutoWriteMemoryBranch => write!(f, "auto-write-memory-branch"),
        }
    }
}

impl FromStr for ArtifactPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto-write-manual-commit" => Ok(ArtifactPolicy::AutoWriteManualCommit),
            "auto-write-memory-branch" => Ok(ArtifactPolicy::AutoWriteMemoryBranch),
            other => Err(format!("unknown artifact policy '{other}'")),
        }
    }
}

/// The singleton settings row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub artifact_policy: ArtifactPolicy,
    #[serde(default)]
    pub auto_commit_to_memory_branch: bool,
    #[serde(default)]
    pub token_mode: TokenMode,
    #[serde(default = "default_memory_branch")]
    pub memory_branch: String,
}

fn default_memory_branch() -> String {
    "memory/continuity".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            artifact_policy: ArtifactPolicy::default(),
            auto_commit_to_memory_branch: false,
            token_mode: TokenMode::default(),
            memory_branch: default_memory_branch(),
        }
    }
}
