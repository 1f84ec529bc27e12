//! Best-effort repository probe.
//!
//! Fast queries (HEAD, branch, status) go through libgit2; anything that
//! can produce unbounded output (diffs, file listings) is shelled out with
//! a hard timeout and a capped buffer. Every operation degrades to the
//! `no-git` defaults instead of failing — a broken or absent repository
//! must never fail the calling turn.

use crate::subprocess::run_cmd_stdout;
use continuity_core::hash::clamp_by_bytes;
use continuity_core::state::RepoState;
use git2::{Repository, StatusOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Byte cap on the unified diff snippet.
const DIFF_SNIPPET_BYTES: usize = 4_000;

/// Timeout for diff subprocesses.
const DIFF_TIMEOUT: Duration = Duration::from_secs(7);

/// Buffer cap for diff subprocesses.
const DIFF_BUFFER_BYTES: usize = 2 * 1024 * 1024;

/// Timeout for the file-listing subprocess.
const LIST_TIMEOUT: Duration = Duration::from_secs(8);

/// Buffer cap for the file-listing subprocess.
const LIST_BUFFER_BYTES: usize = 6 * 1024 * 1024;

/// Branch name reported when none can be determined.
const UNKNOWN_BRANCH: &str = "unknown";

pub struct RepoProbe {
    repo_root: PathBuf,
}

impl RepoProbe {
    pub fn new(repo_root: &Path) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// HEAD commit and changed files as one consistent snapshot.
    pub fn snapshot(&self) -> RepoState {
        match self.head_commit() {
            Some(head) => RepoState::new(head, self.changed_files()),
            None => RepoState::no_git(),
        }
    }

    /// Current commit id, if a repository with a resolvable HEAD exists.
    pub fn head_commit(&self) -> Option<String> {
        let repo = Repository::open(&self.repo_root).ok()?;
        let head = repo.head().ok()?;
        Some(head.target()?.to_string())
    }

    /// Short branch name, or `"unknown"`.
    pub fn current_branch(&self) -> String {
        let branch = Repository::open(&self.repo_root)
            .ok()
            .and_then(|repo| {
                repo.head()
                    .ok()
                    .and_then(|head| head.shorthand().map(str::to_string))
            });
        branch.unwrap_or_else(|| UNKNOWN_BRANCH.to_string())
    }

    /// Union of staged and unstaged modified paths, untracked included.
    /// Sorted and deduplicated by [`RepoState::new`]'s caller contract.
    pub fn changed_files(&self) -> Vec<String> {
        let repo = match Repository::open(&self.repo_root) {
            Ok(repo) => repo,
            Err(_) => return Vec::new(),
        };
        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = match repo.statuses(Some(&mut options)) {
            Ok(statuses) => statuses,
            Err(e) => {
                tracing::debug!(error = %e, "status probe failed");
                return Vec::new();
            }
        };
        statuses
            .iter()
            .filter_map(|entry| entry.path().map(str::to_string))
            .collect()
    }

    /// Unified diff of the working tree against HEAD, context 1, truncated.
    pub async fn diff_snippet(&self) -> String {
        let stdout = run_cmd_stdout(
            "git",
            &["diff", "HEAD", "-U1"],
            &self.repo_root,
            DIFF_TIMEOUT,
            DIFF_BUFFER_BYTES,
        )
        .await
        .unwrap_or_default();
        clamp_by_bytes(&stdout, DIFF_SNIPPET_BYTES)
    }

    /// Total added plus removed lines across all changed files.
    pub async fn diff_stats(&self) -> u64 {
        let stdout = run_cmd_stdout(
            "git",
            &["diff", "HEAD", "--numstat"],
            &self.repo_root,
            DIFF_TIMEOUT,
            DIFF_BUFFER_BYTES,
        )
        .await
        .unwrap_or_default();
        sum_numstat(&stdout)
    }

    /// Tracked-file listing via `rg --files` (respects ignore rules).
    /// Returns empty when the tool is absent; the context pack then
    /// degrades to changed files only.
    pub async fn list_files(&self) -> Vec<String> {
        let stdout = run_cmd_stdout(
            "rg",
            &["--files"],
            &self.repo_root,
            LIST_TIMEOUT,
            LIST_BUFFER_BYTES,
        )
        .await
        .unwrap_or_default();
        stdout
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Sum the added/removed columns of `git diff --numstat` output.
/// Binary files report `-` and contribute nothing.
fn sum_numstat(numstat: &str) -> u64 {
    numstat
        .lines()
        .map(|line| {
            let mut cols = line.split_whitespace();
            let added = cols.next().and_then(|c| c.parse::<u64>().ok()).unwrap_or(0);
            let removed = cols.next().and_then(|c| c.parse::<u64>().ok()).unwrap_or(0);
            added + removed
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run git in a directory with a scrubbed environment, so fixture
    /// repos stay isolated from any outer repository.
    fn git_in(dir: &Path, args: &[&str]) {
        std::process::Command::new("git")
            .args(args)
            .current_dir(dir)
            .env_remove("GIT_DIR")
            .env_remove("GIT_INDEX_FILE")
            .env_remove("GIT_WORK_TREE")
            .output()
            .unwrap();
    }

    fn init_test_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        git_in(p, &["init", "-b", "main"]);
        git_in(p, &["config", "user.email", "test@test.com"]);
        git_in(p, &["config", "user.name", "Test"]);
        git_in(p, &["config", "commit.gpgsign", "false"]);
        std::fs::write(p.join("README.md"), "# Fixture\n").unwrap();
        git_in(p, &["add", "."]);
        git_in(p, &["commit", "-m", "initial"]);
        dir
    }

    #[test]
    fn no_repo_degrades_to_no_git() {
        let dir = tempfile::tempdir().unwrap();
        let probe = RepoProbe::new(dir.path());
        let state = probe.snapshot();
        assert_eq!(state.head_commit, "no-git");
        assert_eq!(state.changed_files_hash, "no-changes");
        assert_eq!(probe.current_branch(), "unknown");
    }

    #[test]
    fn snapshot_reads_head_and_changes() {
        let dir = init_test_repo();
        let probe = RepoProbe::new(dir.path());

        std::fs::write(dir.path().join("b.rs"), "fn b() {}\n").unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn a() {}\n").unwrap();

        let state = probe.snapshot();
        assert_eq!(state.head_commit.len(), 40);
        assert_eq!(state.changed_files, vec!["a.rs", "b.rs"]);
    }

    #[test]
    fn changed_files_unions_staged_and_unstaged() {
        let dir = init_test_repo();
        let probe = RepoProbe::new(dir.path());

        std::fs::write(dir.path().join("staged.rs"), "fn s() {}\n").unwrap();
        git_in(dir.path(), &["add", "staged.rs"]);
        std::fs::write(dir.path().join("README.md"), "# changed\n").unwrap();

        let files = probe.snapshot().changed_files;
        assert!(files.contains(&"staged.rs".to_string()));
        assert!(files.contains(&"README.md".to_string()));
    }

    #[test]
    fn current_branch_reads_short_name() {
        let dir = init_test_repo();
        let probe = RepoProbe::new(dir.path());
        assert_eq!(probe.current_branch(), "main");
    }

    #[tokio::test]
    async fn diff_snippet_and_stats_track_edits() {
        let dir = init_test_repo();
        let probe = RepoProbe::new(dir.path());

        std::fs::write(dir.path().join("README.md"), "# Fixture\nline two\nline three\n")
            .unwrap();

        let snippet = probe.diff_snippet().await;
        assert!(snippet.contains("line two"));
        assert!(snippet.len() <= 4_000);

        let stats = probe.diff_stats().await;
        assert_eq!(stats, 2);
    }

    #[tokio::test]
    async fn diff_outside_repo_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let probe = RepoProbe::new(dir.path());
        assert_eq!(probe.diff_snippet().await, "");
        assert_eq!(probe.diff_stats().await, 0);
    }

    #[test]
    fn sum_numstat_skips_binary_markers() {
        let numstat = "3\t1\tsrc/a.rs\n-\t-\tassets/logo.png\n10\t0\tsrc/b.rs\n";
        assert_eq!(sum_numstat(numstat), 14);
    }
}
