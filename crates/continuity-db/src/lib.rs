//! redb-backed persistence for the continuity engine.
//!
//! One store module per table. All values are JSON-serialized rows keyed
//! by stable string ids, and every upsert is idempotent, so concurrent
//! sub-sessions can share one database file.

pub mod artifact_store;
pub mod chat_store;
pub mod pack_store;
pub mod search_store;
pub mod session_store;
pub mod settings_store;
pub mod summary_store;

use anyhow::Result;
use redb::Database;
use std::path::Path;

/// Open (or create) the continuity database at the given path.
pub fn open_db(path: &Path) -> Result<Database> {
    let db = Database::create(path)?;
    // Ensure all tables exist by doing a write transaction
    let write_txn = db.begin_write()?;
    {
        let _packs = write_txn.open_table(pack_store::PACK_TABLE)?;
        let _summaries = write_txn.open_table(summary_store::SUMMARY_TABLE)?;
        let _searches = write_txn.open_table(search_store::SEARCH_TABLE)?;
        let _sessions = write_txn.open_table(session_store::SESSION_TABLE)?;
        let _artifacts = write_txn.open_table(artifact_store::ARTIFACT_TABLE)?;
        let _counter = write_txn.open_table(artifact_store::COUNTER_TABLE)?;
        let _settings = write_txn.open_table(settings_store::SETTINGS_TABLE)?;
        let _subs = write_txn.open_table(chat_store::SUB_SESSION_TABLE)?;
        let _chats = write_txn.open_table(chat_store::CHAT_TABLE)?;
    }
    write_txn.commit()?;
    Ok(db)
}
