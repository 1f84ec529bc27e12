//! Context pack: summaries of the repo files most relevant to the prompt.
//!
//! Relevance is plain substring scoring of extracted keywords against the
//! file listing; changed files always rank ahead of search hits. Search
//! results and file summaries are cached (hot map in front of the store),
//! and every cache failure silently degrades to recomputing.

use chrono::{DateTime, Duration, Utc};
use continuity_core::budget::BudgetProfile;
use continuity_core::hash::{sha256_fields, sha256_hex};
use continuity_core::keywords::extract_keywords;
use continuity_core::state::RepoState;
use continuity_core::summary::build_file_summary;
use continuity_db::search_store::{SearchCacheEntry, SearchStore, SEARCH_TTL_SECS};
use continuity_db::summary_store::{FileSummaryEntry, SummaryStore};
use redb::Database;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Returned when the prompt yields no usable keywords.
pub const NO_RELEVANT_FILES: &str = "No relevant files identified.";

/// Search hits retained after scoring.
const SEARCH_RESULT_LIMIT: usize = 24;

/// Changed files always considered as candidates.
const CHANGED_FILE_CANDIDATES: usize = 4;

/// Separator between accumulated summaries.
const SUMMARY_SEPARATOR: &str = "\n\n---\n\n";

/// Score added when a keyword occurs anywhere in the path.
const PATH_SCORE: u32 = 3;

/// Additional score when the keyword occurs in the basename.
const BASENAME_SCORE: u32 = 4;

/// Shared caches in front of the persistent stores. Process-local
/// optimizations only; the store remains the source of truth.
pub struct ContextCaches {
    pub search: Mutex<HashMap<String, (DateTime<Utc>, Vec<String>)>>,
    pub summaries: Mutex<HashMap<String, String>>,
}

impl ContextCaches {
    pub fn new() -> Self {
        Self {
            search: Mutex::new(HashMap::new()),
            summaries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for ContextCaches {
    fn default() -> Self {
        Self::new()
    }
}

/// Score the file listing against keywords and keep the best hits.
///
/// Deterministic: stable sort by descending score preserves listing order
/// among ties.
pub fn search_relevant_files(listing: &[String], keywords: &[String]) -> Vec<String> {
    let mut scored: Vec<(u32, &String)> = listing
        .iter()
        .filter_map(|path| {
            let lower = path.to_lowercase();
            let basename = lower.rsplit('/').next().unwrap_or(&lower).to_string();
            let mut score = 0;
            for kw in keywords {
                if lower.contains(kw) {
                    score += PATH_SCORE;
                    if basename.contains(kw) {
                        score += BASENAME_SCORE;
                    }
                }
            }
            (score > 0).then_some((score, path))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .take(SEARCH_RESULT_LIMIT)
        .map(|(_, path)| path.clone())
        .collect()
}

/// Build the context pack for one turn.
pub async fn build_context_pack(
    db: &Database,
    caches: &ContextCaches,
    repo_root: &Path,
    listing: &[String],
    repo_state: &RepoState,
    prompt: &str,
    budget: &BudgetProfile,
) -> String {
    let keywords = extract_keywords(prompt);
    if keywords.is_empty() {
        return NO_RELEVANT_FILES.to_string();
    }

    let hits = cached_search(db, caches, repo_root, listing, repo_state, &keywords);

    let mut candidates: Vec<String> = Vec::new();
    for path in repo_state
        .changed_files
        .iter()
        .take(CHANGED_FILE_CANDIDATES)
        .chain(hits.iter())
    {
        if !candidates.contains(path) {
            candidates.push(path.clone());
        }
        if candidates.len() == budget.max_context_files {
            break;
        }
    }

    let mut pack = String::new();
    for path in &candidates {
        let summary = match summarize_file(db, caches, repo_root, path, budget).await {
            Some(summary) => summary,
            None => continue,
        };
        let addition = if pack.is_empty() {
            summary.len()
        } else {
            SUMMARY_SEPARATOR.len() + summary.len()
        };
        if pack.len() + addition > budget.max_context_summary_bytes {
            break;
        }
        if !pack.is_empty() {
            pack.push_str(SUMMARY_SEPARATOR);
        }
        pack.push_str(&summary);
    }
    pack
}

/// Search with the 60-second result cache in front.
fn cached_search(
    db: &Database,
    caches: &ContextCaches,
    repo_root: &Path,
    listing: &[String],
    repo_state: &RepoState,
    keywords: &[String],
) -> Vec<String> {
    let query = keywords.join(",");
    let key = format!(
        "{}:{}:{query}",
        repo_root.display(),
        repo_state.head_commit
    );
    let now = Utc::now();

    {
        let hot = caches.search.lock().unwrap();
        if let Some((written, files)) = hot.get(&key) {
            if now - *written <= Duration::seconds(SEARCH_TTL_SECS) {
                return files.clone();
            }
        }
    }

    let store = SearchStore::new(db);
    match store.get_fresh(&key, now) {
        Ok(Some(entry)) => {
            let mut hot = caches.search.lock().unwrap();
            hot.insert(key, (entry.updated_at, entry.result_files.clone()));
            return entry.result_files;
        }
        Ok(None) => {}
        Err(e) => tracing::debug!(error = %e, "search cache read failed"),
    }

    let files = search_relevant_files(listing, keywords);
    if let Err(e) = store.upsert(&SearchCacheEntry {
        key: key.clone(),
        repo_root: repo_root.display().to_string(),
        query,
        commit_hash: repo_state.head_commit.clone(),
        scope: "files".to_string(),
        result_files: files.clone(),
        updated_at: now,
    }) {
        tracing::debug!(error = %e, "search cache write failed");
    }
    caches
        .search
        .lock()
        .unwrap()
        .insert(key, (now, files.clone()));
    files
}

/// Summary for one candidate file, via the content-hash-keyed cache.
/// `None` for missing, oversized, or non-regular files.
async fn summarize_file(
    db: &Database,
    caches: &ContextCaches,
    repo_root: &Path,
    path: &str,
    budget: &BudgetProfile,
) -> Option<String> {
    let full_path = repo_root.join(path);
    let meta = tokio::fs::metadata(&full_path).await.ok()?;
    if !meta.is_file() || meta.len() > budget.max_file_read_bytes {
        return None;
    }
    let contents = tokio::fs::read_to_string(&full_path).await.ok()?;
    let content_hash = sha256_hex(&contents);
    let root = repo_root.display().to_string();
    let key = sha256_fields(&[&root, path, &content_hash]);

    {
        let hot = caches.summaries.lock().unwrap();
        if let Some(summary) = hot.get(&key) {
            return Some(summary.clone());
        }
    }

    let store = SummaryStore::new(db);
    match store.get(&key) {
        Ok(Some(entry)) => {
            caches
                .summaries
                .lock()
                .unwrap()
                .insert(key, entry.summary.clone());
            return Some(entry.summary);
        }
        Ok(None) => {}
        Err(e) => tracing::debug!(error = %e, "summary cache read failed"),
    }

    let summary = build_file_summary(path, &contents);
    if let Err(e) = store.upsert(&FileSummaryEntry {
        key: key.clone(),
        repo_root: root,
        file_path: path.to_string(),
        content_hash,
        summary: summary.clone(),
        updated_at: Utc::now(),
    }) {
        tracing::debug!(error = %e, "summary cache write failed");
    }
    caches
        .summaries
        .lock()
        .unwrap()
        .insert(key, summary.clone());
    Some(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use continuity_core::budget::TokenMode;

    fn listing(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|s| s.to_string()).collect()
    }

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn basename_match_outranks_path_match() {
        let files = listing(&["src/bucket/mod.rs", "src/rate/bucket.rs"]);
        let hits = search_relevant_files(&files, &kw(&["bucket"]));
        // Both match in the path, but only the second matches the basename.
        assert_eq!(hits[0], "src/rate/bucket.rs");
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn unmatched_files_are_dropped() {
        let files = listing(&["src/a.rs", "src/b.rs"]);
        assert!(search_relevant_files(&files, &kw(&["governor"])).is_empty());
    }

    #[test]
    fn ties_preserve_listing_order() {
        let files = listing(&["src/one/governor.rs", "src/two/governor.rs"]);
        let hits = search_relevant_files(&files, &kw(&["governor"]));
        assert_eq!(hits, files);
    }

    #[test]
    fn results_capped_at_24() {
        let files: Vec<String> = (0..40).map(|i| format!("src/pack_{i:02}.rs")).collect();
        let hits = search_relevant_files(&files, &kw(&["pack"]));
        assert_eq!(hits.len(), 24);
    }

    fn test_db() -> Database {
        let dir = tempfile::tempdir().unwrap();
        continuity_db::open_db(&dir.path().join("test.redb")).unwrap()
    }

    #[tokio::test]
    async fn empty_keywords_yield_placeholder() {
        let db = test_db();
        let caches = ContextCaches::new();
        let dir = tempfile::tempdir().unwrap();
        let state = RepoState::no_git();
        let pack = build_context_pack(
            &db,
            &caches,
            dir.path(),
            &[],
            &state,
            "fix it", // every token under four chars or stopworded
            &TokenMode::Normal.profile(),
        )
        .await;
        assert_eq!(pack, NO_RELEVANT_FILES);
    }

    #[tokio::test]
    async fn summarizes_matching_files_within_budget() {
        let db = test_db();
        let caches = ContextCaches::new();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("governor.ts"),
            "export function decide() {}\n",
        )
        .unwrap();

        let state = RepoState::new("abc".into(), vec![]);
        let pack = build_context_pack(
            &db,
            &caches,
            dir.path(),
            &listing(&["governor.ts"]),
            &state,
            "tighten governor thresholds",
            &TokenMode::Normal.profile(),
        )
        .await;
        assert!(pack.contains("file: governor.ts"));
        assert!(pack.contains("export function decide() {}"));
    }

    #[tokio::test]
    async fn changed_files_rank_ahead_of_search_hits() {
        let db = test_db();
        let caches = ContextCaches::new();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("changed.ts"), "class Changed {}\n").unwrap();
        std::fs::write(dir.path().join("governor.ts"), "class Governor {}\n").unwrap();

        let state = RepoState::new("abc".into(), vec!["changed.ts".into()]);
        let pack = build_context_pack(
            &db,
            &caches,
            dir.path(),
            &listing(&["governor.ts"]),
            &state,
            "tighten governor thresholds",
            &TokenMode::Normal.profile(),
        )
        .await;
        let changed_pos = pack.find("file: changed.ts").unwrap();
        let governor_pos = pack.find("file: governor.ts").unwrap();
        assert!(changed_pos < governor_pos);
    }

    #[tokio::test]
    async fn missing_files_are_skipped() {
        let db = test_db();
        let caches = ContextCaches::new();
        let dir = tempfile::tempdir().unwrap();
        let state = RepoState::new("abc".into(), vec!["ghost.ts".into()]);
        let pack = build_context_pack(
            &db,
            &caches,
            dir.path(),
            &[],
            &state,
            "tighten governor thresholds",
            &TokenMode::Normal.profile(),
        )
        .await;
        assert!(pack.is_empty());
    }

    #[tokio::test]
    async fn summary_cache_is_reused_across_builds() {
        let db = test_db();
        let caches = ContextCaches::new();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("governor.ts"), "class Governor {}\n").unwrap();
        let state = RepoState::new("abc".into(), vec!["governor.ts".into()]);

        let first = build_context_pack(
            &db,
            &caches,
            dir.path(),
            &[],
            &state,
            "tighten governor thresholds",
            &TokenMode::Normal.profile(),
        )
        .await;
        let second = build_context_pack(
            &db,
            &caches,
            dir.path(),
            &[],
            &state,
            "tighten governor thresholds",
            &TokenMode::Normal.profile(),
        )
        .await;
        assert_eq!(first, second);
        assert_eq!(caches.summaries.lock().unwrap().len(), 1);
    }
}
