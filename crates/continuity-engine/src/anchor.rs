//! Anchor pack: static repo-wide context from a fixed file set.

use continuity_core::hash::clamp_by_bytes;
use std::path::Path;

/// Repo-root documents read into every full pack, in order.
pub const ANCHOR_FILES: &[&str] = &["AGENTS.md", "CLAUDE.md", "README.md"];

/// Byte cap applied to each anchor document.
const ANCHOR_FILE_BYTES: usize = 3_000;

/// Returned when none of the anchor files exist.
pub const NO_ANCHORS: &str = "No anchor files found.";

/// Read and clamp the anchor documents under `repo_root`.
pub async fn build_anchor_pack(repo_root: &Path) -> String {
    let mut sections = Vec::new();
    for name in ANCHOR_FILES {
        match tokio::fs::read_to_string(repo_root.join(name)).await {
            Ok(contents) => {
                sections.push(format!(
                    "## {name}\n{}",
                    clamp_by_bytes(&contents, ANCHOR_FILE_BYTES)
                ));
            }
            Err(_) => continue,
        }
    }
    if sections.is_empty() {
        NO_ANCHORS.to_string()
    } else {
        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_files_yield_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(build_anchor_pack(dir.path()).await, NO_ANCHORS);
    }

    #[tokio::test]
    async fn reads_existing_anchors_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "# Project readme").unwrap();
        std::fs::write(dir.path().join("AGENTS.md"), "Agent notes").unwrap();

        let pack = build_anchor_pack(dir.path()).await;
        let agents_pos = pack.find("## AGENTS.md").unwrap();
        let readme_pos = pack.find("## README.md").unwrap();
        assert!(agents_pos < readme_pos);
        assert!(pack.contains("Agent notes"));
        assert!(pack.contains("# Project readme"));
        assert!(!pack.contains("CLAUDE.md"));
    }

    #[tokio::test]
    async fn oversized_anchor_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "r".repeat(10_000)).unwrap();
        let pack = build_anchor_pack(dir.path()).await;
        assert!(pack.len() <= "## README.md\n".len() + 3_000);
    }
}
