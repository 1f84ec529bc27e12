//! Singleton settings row.
//!
//! Reads fall back to [`Settings::default`] when the row is absent, so
//! callers never branch on a missing configuration.

use anyhow::Result;
use chrono::{DateTime, Utc};
use continuity_core::settings::Settings;
use redb::{Database, TableDefinition};
use serde::{Deserialize, Serialize};

/// redb table: the literal key "singleton" -> JSON-serialized row.
pub const SETTINGS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("settings");

const SINGLETON_KEY: &str = "singleton";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettingsRow {
    #[serde(flatten)]
    settings: Settings,
    updated_at: DateTime<Utc>,
}

pub struct SettingsStore<'a> {
    db: &'a Database,
}

impl<'a> SettingsStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// The stored settings, or defaults when no row exists.
    pub fn get(&self) -> Result<Settings> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SETTINGS_TABLE)?;
        match table.get(SINGLETON_KEY)? {
            Some(guard) => {
                let row: SettingsRow = serde_json::from_str(guard.value())?;
                Ok(row.settings)
            }
            None => Ok(Settings::default()),
        }
    }

    /// Whether an explicit row has been written.
    pub fn exists(&self) -> Result<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SETTINGS_TABLE)?;
        Ok(table.get(SINGLETON_KEY)?.is_some())
    }

    pub fn set(&self, settings: &Settings) -> Result<()> {
        let row = SettingsRow {
            settings: settings.clone(),
            updated_at: Utc::now(),
        };
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SETTINGS_TABLE)?;
            let json = serde_json::to_string(&row)?;
            table.insert(SINGLETON_KEY, json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
