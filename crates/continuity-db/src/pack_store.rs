//! Persistent pack cache keyed by compound hash.
//!
//! Entries persist indefinitely; new packs for the same key upsert. A
//! cache hit touches `updated_at` without rewriting the pack text.

use anyhow::Result;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

/// redb table: cache key hex string -> JSON-serialized [`PackCacheEntry`].
pub const PACK_TABLE: TableDefinition<&str, &str> = TableDefinition::new("pack_cache");

/// One assembled pack plus the key components it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackCacheEntry {
    pub key: String,
    pub task_fingerprint: String,
    pub changed_files_hash: String,
    pub head_commit: String,
    pub provider: String,
    pub mode: String,
    pub budget_bytes: usize,
    pub pack: String,
    pub updated_at: DateTime<Utc>,
}

pub struct PackStore<'a> {
    db: &'a Database,
}

impl<'a> PackStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert or overwrite the entry for its key.
    pub fn upsert(&self, entry: &PackCacheEntry) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PACK_TABLE)?;
            let json = serde_json::to_string(entry)?;
            table.insert(entry.key.as_str(), json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<PackCacheEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PACK_TABLE)?;
        match table.get(key)? {
            Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Refresh `updated_at` on a hit, leaving the pack text untouched.
    pub fn touch(&self, key: &str, now: DateTime<Utc>) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PACK_TABLE)?;
            let existing = table.get(key)?.map(|guard| guard.value().to_string());
            if let Some(json) = existing {
                let mut entry: PackCacheEntry = serde_json::from_str(&json)?;
                entry.updated_at = now;
                let json = serde_json::to_string(&entry)?;
                table.insert(key, json.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        let dir = tempfile::tempdir().unwrap();
        crate::open_db(&dir.path().join("test.redb")).unwrap()
    }

    fn sample(key: &str) -> PackCacheEntry {
        PackCacheEntry {
            key: key.into(),
            task_fingerprint: "fp".into(),
            changed_files_hash: "cfh".into(),
            head_commit: "abc123".into(),
            provider: "claude".into(),
            mode: "agent".into(),
            budget_bytes: 24_000,
            pack: "[PACK]".into(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn get_missing_returns_none() {
        let db = test_db();
        let store = PackStore::new(&db);
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn upsert_and_get_roundtrip() {
        let db = test_db();
        let store = PackStore::new(&db);
        let entry = sample("k1");
        store.upsert(&entry).unwrap();
        assert_eq!(store.get("k1").unwrap().unwrap(), entry);
    }

    #[test]
    fn upsert_overwrites_same_key() {
        let db = test_db();
        let store = PackStore::new(&db);
        store.upsert(&sample("k1")).unwrap();
        let mut updated = sample("k1");
        updated.pack = "[PACK v2]".into();
        store.upsert(&updated).unwrap();
        assert_eq!(store.get("k1").unwrap().unwrap().pack, "[PACK v2]");
    }

    #[test]
    fn touch_only_moves_updated_at() {
        let db = test_db();
        let store = PackStore::new(&db);
        let entry = sample("k1");
        store.upsert(&entry).unwrap();

        let later = Utc::now() + chrono::Duration::seconds(90);
        store.touch("k1", later).unwrap();

        let got = store.get("k1").unwrap().unwrap();
        assert_eq!(got.pack, entry.pack);
        assert_eq!(got.updated_at, later);
    }

    #[test]
    fn touch_missing_key_is_noop() {
        let db = test_db();
        let store = PackStore::new(&db);
        store.touch("ghost", Utc::now()).unwrap();
        assert!(store.get("ghost").unwrap().is_none());
    }
}
