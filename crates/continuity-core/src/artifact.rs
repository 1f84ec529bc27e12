//! Durable memory artifacts: devlogs, ADR stubs, rejected approaches.
//!
//! Artifacts are append-only drafts de-duplicated by event fingerprint; a
//! downstream reviewer promotes or rejects them later. Content builders
//! live here so the artifact text is a pure function of the turn.

use crate::config::{Provider, SessionMode};
use crate::detector::RejectedReason;
use crate::governor::GovernorAction;
use crate::hash::clamp_by_bytes;
use crate::safeguard::SafeguardDecision;
use crate::settings::Settings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Byte cap on the prompt excerpt embedded in artifact content.
const MAX_PROMPT_BYTES: usize = 900;

/// Byte cap on the assistant-response excerpt.
const MAX_RESPONSE_BYTES: usize = 1_500;

/// Changed files listed in a devlog.
const MAX_DEVLOG_FILES: usize = 24;

/// Boundary files listed in an ADR stub.
const MAX_ADR_FILES: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactType {
    Devlog,
    Adr,
    RejectedApproach,
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactType::Devlog => write!(f, "devlog"),
            ArtifactType::Adr => write!(f, "adr"),
            ArtifactType::RejectedApproach => write!(f, "rejected-approach"),
        }
    }
}

impl FromStr for ArtifactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "devlog" => Ok(ArtifactType::Devlog),
            "adr" => Ok(ArtifactType::Adr),
            "rejected-approach" => Ok(ArtifactType::RejectedApproach),
            other => Err(format!("unknown artifact type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    #[default]
    Draft,
    Accepted,
    Rejected,
}

/// Where an artifact came from; the fingerprint de-duplicates writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub event_fingerprint: String,
    pub created_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: u64,
    pub sub_session_id: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub content: String,
    pub status: ArtifactStatus,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Artifact {
    /// First non-blank content line, for rehydrate carry-over bullets.
    pub fn headline(&self) -> &str {
        self.content
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
            .trim()
    }
}

/// Everything a turn devlog records about what happened.
pub struct DevlogContext<'a> {
    pub provider: Provider,
    pub mode: SessionMode,
    pub head_commit: &'a str,
    pub changed_files: &'a [String],
    pub diff_lines: u64,
    pub reasons: &'a [String],
    pub settings: &'a Settings,
    pub safeguard: SafeguardDecision,
    pub prompt: &'a str,
    pub assistant_response: &'a str,
}

/// Devlog body for a turn the detector found noteworthy.
pub fn devlog_content(ctx: &DevlogContext<'_>) -> String {
    let files = ctx
        .changed_files
        .iter()
        .take(MAX_DEVLOG_FILES)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    let auto_commit = if ctx.safeguard.allowed {
        "allowed"
    } else if ctx.safeguard.requested {
        "blocked"
    } else {
        "not-requested"
    };
    format!(
        "devlog: turn summary\n\
         provider: {}\n\
         mode: {}\n\
         commit: {}\n\
         changed_files: {}\n\
         diff_lines: {}\n\
         reasons: {}\n\
         artifact_policy: {}\n\
         memory_branch: {}\n\
         auto_commit: {}\n\
         prompt: {}\n\
         assistant: {}",
        ctx.provider,
        ctx.mode,
        ctx.head_commit,
        files,
        ctx.diff_lines,
        ctx.reasons.join("; "),
        ctx.settings.artifact_policy,
        ctx.settings.memory_branch,
        auto_commit,
        clamp_by_bytes(ctx.prompt, MAX_PROMPT_BYTES),
        clamp_by_bytes(ctx.assistant_response, MAX_RESPONSE_BYTES),
    )
}

/// ADR stub for a turn that touched boundary modules.
pub fn adr_content(boundary_files: &[String]) -> String {
    format!(
        "adr: boundary modules touched\n\
         modules: {}\n\
         decision: (pending review)\n\
         consequences: (pending review)",
        boundary_files
            .iter()
            .take(MAX_ADR_FILES)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    )
}

/// Rejected-approach note.
pub fn rejected_content(reason: RejectedReason, prompt: &str, assistant_response: &str) -> String {
    format!(
        "rejected-approach: {}\nprompt: {}\nassistant: {}",
        reason,
        clamp_by_bytes(prompt, MAX_PROMPT_BYTES),
        clamp_by_bytes(assistant_response, MAX_RESPONSE_BYTES),
    )
}

/// Devlog recording a non-ok governor action.
pub fn governor_devlog_content(action: GovernorAction, reasons: &[String]) -> String {
    format!(
        "devlog: governor action\naction: {}\nreasons: {}",
        action,
        reasons.join("; ")
    )
}

/// Devlog recording a blocked auto-commit.
pub fn blocked_devlog_content(current_branch: &str, memory_branch: &str) -> String {
    format!(
        "devlog: auto-commit blocked\n\
         current_branch: {current_branch}\n\
         memory_branch: {memory_branch}\n\
         action: none (commit requires the memory branch)"
    )
}
