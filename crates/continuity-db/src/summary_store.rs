//! File-summary cache keyed by `(repo root, path, content hash)`.
//!
//! A summary stays valid for as long as the underlying file's content
//! hash matches — the hash is baked into the key, so stale contents
//! simply miss and a fresh entry is written alongside the old one.

use anyhow::Result;
use chrono::{DateTime, Utc};
use redb::{Database, TableDefinition};
use serde::{Deserialize, Serialize};

/// redb table: summary key hex string -> JSON-serialized [`FileSummaryEntry`].
pub const SUMMARY_TABLE: TableDefinition<&str, &str> = TableDefinition::new("file_summary_cache");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummaryEntry {
    pub key: String,
    pub repo_root: String,
    pub file_path: String,
    pub content_hash: String,
    pub summary: String,
    pub updated_at: DateTime<Utc>,
}

pub struct SummaryStore<'a> {
    db: &'a Database,
}

impl<'a> SummaryStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn upsert(&self, entry: &FileSummaryEntry) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SUMMARY_TABLE)?;
            let json = serde_json::to_string(entry)?;
            table.insert(entry.key.as_str(), json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<FileSummaryEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SUMMARY_TABLE)?;
        match table.get(key)? {
            Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
            None => Ok(None),
        }
    }
}
