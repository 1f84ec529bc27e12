//! Keyword-search result cache with a short TTL.
//!
//! Search results are only as fresh as the working tree, so entries
//! expire 60 seconds after they were written; expired rows are treated
//! as misses on read and overwritten in place on the next write.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use redb::{Database, TableDefinition};
use serde::{Deserialize, Serialize};

/// redb table: search key string -> JSON-serialized [`SearchCacheEntry`].
pub const SEARCH_TABLE: TableDefinition<&str, &str> = TableDefinition::new("search_cache");

/// How long a cached search result stays valid.
pub const SEARCH_TTL_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCacheEntry {
    pub key: String,
    pub repo_root: String,
    pub query: String,
    pub commit_hash: String,
    pub scope: String,
    pub result_files: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

pub struct SearchStore<'a> {
    db: &'a Database,
}

impl<'a> SearchStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn upsert(&self, entry: &SearchCacheEntry) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SEARCH_TABLE)?;
            let json = serde_json::to_string(entry)?;
            table.insert(entry.key.as_str(), json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a cached result that is still within the TTL at `now`.
    pub fn get_fresh(&self, key: &str, now: DateTime<Utc>) -> Result<Option<SearchCacheEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SEARCH_TABLE)?;
        match table.get(key)? {
            Some(guard) => {
                let entry: SearchCacheEntry = serde_json::from_str(guard.value())?;
                if now - entry.updated_at <= Duration::seconds(SEARCH_TTL_SECS) {
                    Ok(Some(entry))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }
}
