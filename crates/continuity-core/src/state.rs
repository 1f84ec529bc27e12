//! Repository state, fingerprints, compound cache keys, session counters.

use crate::config::{Provider, SessionMode};
use crate::hash::{sha256_fields, sha256_hex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Head commit used when no VCS is available.
pub const NO_GIT_COMMIT: &str = "no-git";

/// Changed-files hash used when no VCS is available.
pub const NO_CHANGES_HASH: &str = "no-changes";

/// Point-in-time view of the repository, as seen by one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoState {
    pub head_commit: String,
    /// Unique relative paths, lexicographically sorted.
    pub changed_files: Vec<String>,
    /// `sha256` of the sorted paths joined by newline.
    pub changed_files_hash: String,
}

impl RepoState {
    pub fn new(head_commit: String, mut changed_files: Vec<String>) -> Self {
        changed_files.sort();
        changed_files.dedup();
        let changed_files_hash = sha256_hex(&changed_files.join("\n"));
        Self {
            head_commit,
            changed_files,
            changed_files_hash,
        }
    }

    /// Degenerate state for directories without a repository.
    pub fn no_git() -> Self {
        Self {
            head_commit: NO_GIT_COMMIT.to_string(),
            changed_files: Vec::new(),
            changed_files_hash: NO_CHANGES_HASH.to_string(),
        }
    }
}

/// Lowercase the prompt and collapse all whitespace runs to single spaces.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable identity of the task the user is asking for.
pub fn task_fingerprint(prompt: &str) -> String {
    sha256_hex(&normalize_prompt(prompt))
}

/// Primary key for the pack cache.
///
/// Compound over everything that invalidates a pack: the task, the
/// repository state, and the provider/mode/budget the pack was built for.
pub fn cache_key(
    task_fingerprint: &str,
    repo_state: &RepoState,
    provider: Provider,
    mode: SessionMode,
    max_pack_bytes: usize,
) -> String {
    sha256_fields(&[
        task_fingerprint,
        &repo_state.changed_files_hash,
        &repo_state.head_commit,
        &provider.to_string(),
        &mode.to_string(),
        &max_pack_bytes.to_string(),
    ])
}

/// Identifiers surfaced in the envelope's state-ids block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateIds {
    pub anchor_pack_id: Option<String>,
    pub context_pack_id: Option<String>,
    pub plan_contract_id: Option<String>,
    pub delta_pack_id: Option<String>,
}

impl StateIds {
    /// All-`none` ids, as returned when the engine is off.
    pub fn none() -> Self {
        Self::default()
    }

    /// Render the block body: one `camelCase: value` line per id.
    pub fn render(&self) -> String {
        let line = |v: &Option<String>| v.as_deref().unwrap_or("none").to_string();
        format!(
            "anchorPackId: {}\ncontextPackId: {}\nplanContractId: {}\ndeltaPackId: {}",
            line(&self.anchor_pack_id),
            line(&self.context_pack_id),
            line(&self.plan_contract_id),
            line(&self.delta_pack_id),
        )
    }
}

/// Derive the anchor pack id for a repo root at a commit.
pub fn anchor_pack_id(repo_root: &str, head_commit: &str) -> String {
    sha256_hex(&format!("{repo_root}:anchor:{head_commit}"))
}

/// Per-sub-session counters persisted between turns.
///
/// Counters reset to zero atomically with any governor transition out of
/// `ok`; `last_changed_files_hash` always tracks the latest probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub sub_session_id: String,
    pub last_changed_files_hash: String,
    pub turns_since_snapshot: u32,
    pub total_injected_bytes: u64,
    pub last_snapshot_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new(sub_session_id: &str) -> Self {
        Self {
            sub_session_id: sub_session_id.to_string(),
            last_changed_files_hash: String::new(),
            turns_since_snapshot: 0,
            total_injected_bytes: 0,
            last_snapshot_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_state_sorts_and_dedups() {
        let state = RepoState::new(
            "abc".into(),
            vec!["b.rs".into(), "a.rs".into(), "b.rs".into()],
        );
        assert_eq!(state.changed_files, vec!["a.rs", "b.rs"]);
        assert_eq!(state.changed_files_hash, sha256_hex("a.rs\nb.rs"));
    }

    #[test]
    fn no_git_state_uses_sentinels() {
        let state = RepoState::no_git();
        assert_eq!(state.head_commit, "no-git");
        assert!(state.changed_files.is_empty());
        assert_eq!(state.changed_files_hash, "no-changes");
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize_prompt("  Fix\tthe\n\nBug  "), "fix the bug");
    }

    #[test]
    fn fingerprint_ignores_case_and_spacing() {
        assert_eq!(
            task_fingerprint("Fix the bug"),
            task_fingerprint("  fix   THE bug\n")
        );
    }

    #[test]
    fn cache_key_is_deterministic() {
        let state = RepoState::new("abc".into(), vec!["a.rs".into()]);
        let fp = task_fingerprint("do the thing");
        let k1 = cache_key(&fp, &state, Provider::Claude, SessionMode::Agent, 24_000);
        let k2 = cache_key(&fp, &state, Provider::Claude, SessionMode::Agent, 24_000);
        assert_eq!(k1, k2);
    }

    #[test]
    fn cache_key_sensitive_to_every_component() {
        let state = RepoState::new("abc".into(), vec!["a.rs".into()]);
        let state2 = RepoState::new("abd".into(), vec!["a.rs".into()]);
        let fp = task_fingerprint("do the thing");
        let fp2 = task_fingerprint("do the thing!");
        let base = cache_key(&fp, &state, Provider::Claude, SessionMode::Agent, 24_000);
        assert_ne!(
            base,
            cache_key(&fp2, &state, Provider::Claude, SessionMode::Agent, 24_000)
        );
        assert_ne!(
            base,
            cache_key(&fp, &state2, Provider::Claude, SessionMode::Agent, 24_000)
        );
        assert_ne!(
            base,
            cache_key(&fp, &state, Provider::Codex, SessionMode::Agent, 24_000)
        );
        assert_ne!(
            base,
            cache_key(&fp, &state, Provider::Claude, SessionMode::Plan, 24_000)
        );
        assert_ne!(
            base,
            cache_key(&fp, &state, Provider::Claude, SessionMode::Agent, 14_000)
        );
    }

    #[test]
    fn state_ids_render_with_none_placeholders() {
        let ids = StateIds {
            anchor_pack_id: Some("aaa".into()),
            ..StateIds::none()
        };
        let block = ids.render();
        assert_eq!(
            block,
            "anchorPackId: aaa\ncontextPackId: none\nplanContractId: none\ndeltaPackId: none"
        );
    }
}
