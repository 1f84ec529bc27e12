//! Append-only artifact log with fingerprint de-duplication.
//!
//! Ids are assigned from a counter table so insertion order is recoverable
//! from the key alone; `insert_if_new` checks the last few artifacts of the
//! same `(sub_session, type)` for a matching event fingerprint before
//! writing, which keeps retried turns from producing duplicate drafts.

use anyhow::Result;
use chrono::Utc;
use continuity_core::artifact::{Artifact, ArtifactStatus, ArtifactType, Provenance};
use redb::{Database, ReadableTable, TableDefinition};

/// redb table: zero-padded artifact id -> JSON-serialized [`Artifact`].
pub const ARTIFACT_TABLE: TableDefinition<&str, &str> = TableDefinition::new("artifacts");

/// Auto-increment counter table: "next_artifact_id" -> u64.
pub const COUNTER_TABLE: TableDefinition<&str, u64> = TableDefinition::new("artifact_counters");

const NEXT_ID_KEY: &str = "next_artifact_id";

/// How many recent artifacts are scanned for a duplicate fingerprint.
const DEDUP_WINDOW: usize = 12;

pub struct ArtifactStore<'a> {
    db: &'a Database,
}

impl<'a> ArtifactStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a new draft artifact, assigning it an auto-incremented id.
    pub fn insert(
        &self,
        sub_session_id: &str,
        artifact_type: ArtifactType,
        event_fingerprint: &str,
        content: &str,
        created_by: &str,
    ) -> Result<Artifact> {
        let now = Utc::now();
        let write_txn = self.db.begin_write()?;
        let artifact;
        {
            let mut counter = write_txn.open_table(COUNTER_TABLE)?;
            let next_id = counter.get(NEXT_ID_KEY)?.map(|v| v.value()).unwrap_or(1);
            counter.insert(NEXT_ID_KEY, next_id + 1)?;

            artifact = Artifact {
                id: next_id,
                sub_session_id: sub_session_id.to_string(),
                artifact_type,
                content: content.to_string(),
                status: ArtifactStatus::Draft,
                provenance: Provenance {
                    event_fingerprint: event_fingerprint.to_string(),
                    created_by: created_by.to_string(),
                },
                created_at: now,
                updated_at: now,
            };
            let json = serde_json::to_string(&artifact)?;
            let mut table = write_txn.open_table(ARTIFACT_TABLE)?;
            table.insert(id_key(next_id).as_str(), json.as_str())?;
        }
        write_txn.commit()?;
        Ok(artifact)
    }

    /// Insert unless a recent artifact of the same type already carries
    /// this event fingerprint. Returns `None` on a duplicate.
    pub fn insert_if_new(
        &self,
        sub_session_id: &str,
        artifact_type: ArtifactType,
        event_fingerprint: &str,
        content: &str,
        created_by: &str,
    ) -> Result<Option<Artifact>> {
        let recent = self.recent(sub_session_id, Some(artifact_type), DEDUP_WINDOW)?;
        if recent
            .iter()
            .any(|a| a.provenance.event_fingerprint == event_fingerprint)
        {
            tracing::debug!(
                sub_session_id,
                %artifact_type,
                event_fingerprint,
                "skipping duplicate artifact"
            );
            return Ok(None);
        }
        self.insert(
            sub_session_id,
            artifact_type,
            event_fingerprint,
            content,
            created_by,
        )
        .map(Some)
    }

    /// Most recent artifacts for a sub-session, newest first, optionally
    /// filtered by type.
    pub fn recent(
        &self,
        sub_session_id: &str,
        type_filter: Option<ArtifactType>,
        limit: usize,
    ) -> Result<Vec<Artifact>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ARTIFACT_TABLE)?;
        let mut result = Vec::new();

        // Keys are zero-padded ids, so reverse iteration is newest-first.
        for entry in table.iter()?.rev() {
            let (_, value) = entry?;
            let artifact: Artifact = serde_json::from_str(value.value())?;
            if artifact.sub_session_id != sub_session_id {
                continue;
            }
            if let Some(t) = type_filter {
                if artifact.artifact_type != t {
                    continue;
                }
            }
            result.push(artifact);
            if result.len() == limit {
                break;
            }
        }
        Ok(result)
    }
}

fn id_key(id: u64) -> String {
    format!("{id:012}")
}
