//! Per-sub-session governor counters.
//!
//! One row per sub-session, created on the first `apply` and mutated only
//! at the single commit point of each public engine operation.

use anyhow::Result;
use chrono::{DateTime, Utc};
use continuity_core::state::SessionState;
use redb::{Database, TableDefinition};
use serde::{Deserialize, Serialize};

/// redb table: sub-session id -> JSON-serialized row.
pub const SESSION_TABLE: TableDefinition<&str, &str> = TableDefinition::new("session_state");

/// Storage row: the core state plus a bookkeeping timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionRow {
    #[serde(flatten)]
    state: SessionState,
    updated_at: DateTime<Utc>,
}

pub struct SessionStore<'a> {
    db: &'a Database,
}

impl<'a> SessionStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn get(&self, sub_session_id: &str) -> Result<Option<SessionState>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SESSION_TABLE)?;
        match table.get(sub_session_id)? {
            Some(guard) => {
                let row: SessionRow = serde_json::from_str(guard.value())?;
                Ok(Some(row.state))
            }
            None => Ok(None),
        }
    }

    pub fn upsert(&self, state: &SessionState) -> Result<()> {
        let row = SessionRow {
            state: state.clone(),
            updated_at: Utc::now(),
        };
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSION_TABLE)?;
            let json = serde_json::to_string(&row)?;
            table.insert(state.sub_session_id.as_str(), json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
