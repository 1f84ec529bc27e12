//! redb implementation of the sub-session message store.
//!
//! Holds the conversational log the host app normally owns, so the
//! workspace is runnable end-to-end without it. Owns an `Arc<Database>`
//! (unlike the borrowing stores) because the engine consumes it as a
//! long-lived `Arc<dyn MessageStore>`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use continuity_core::message::{Message, MessageStore, SubSession};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// redb table: sub-session id -> JSON-serialized [`SubSession`].
pub const SUB_SESSION_TABLE: TableDefinition<&str, &str> = TableDefinition::new("sub_sessions");

/// redb table: chat id -> JSON-serialized [`ChatRecord`].
pub const CHAT_TABLE: TableDefinition<&str, &str> = TableDefinition::new("chats");

/// Parent chat bookkeeping; only `updated_at` matters to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    pub chat_id: String,
    pub updated_at: DateTime<Utc>,
}

pub struct ChatStore {
    db: Arc<Database>,
}

impl ChatStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create or overwrite a sub-session record.
    pub fn put_sub_session(&self, session: &SubSession) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SUB_SESSION_TABLE)?;
            let json = serde_json::to_string(session)?;
            table.insert(session.sub_session_id.as_str(), json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn chat(&self, chat_id: &str) -> Result<Option<ChatRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CHAT_TABLE)?;
        match table.get(chat_id)? {
            Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
            None => Ok(None),
        }
    }

    fn touch_chat(
        table: &mut redb::Table<'_, &str, &str>,
        chat_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let record = ChatRecord {
            chat_id: chat_id.to_string(),
            updated_at: now,
        };
        let json = serde_json::to_string(&record)?;
        table.insert(chat_id, json.as_str())?;
        Ok(())
    }
}

impl MessageStore for ChatStore {
    fn load(&self, sub_session_id: &str) -> Result<Option<SubSession>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SUB_SESSION_TABLE)?;
        match table.get(sub_session_id)? {
            Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
            None => Ok(None),
        }
    }

    fn replace_with_carryover(&self, sub_session_id: &str, message: Message) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut sessions = write_txn.open_table(SUB_SESSION_TABLE)?;
            let existing = sessions
                .get(sub_session_id)?
                .map(|guard| guard.value().to_string());
            if let Some(json) = existing {
                let mut session: SubSession = serde_json::from_str(&json)?;
                session.messages = vec![message];
                session.session_id = None;
                session.stream_id = None;
                let json = serde_json::to_string(&session)?;
                sessions.insert(sub_session_id, json.as_str())?;

                let mut chats = write_txn.open_table(CHAT_TABLE)?;
                Self::touch_chat(&mut chats, &session.chat_id, Utc::now())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use continuity_core::config::SessionMode;

    fn test_store() -> ChatStore {
        let dir = tempfile::tempdir().unwrap();
        let db = crate::open_db(&dir.path().join("test.redb")).unwrap();
        ChatStore::new(Arc::new(db))
    }

    fn sample() -> SubSession {
        SubSession {
            sub_session_id: "sub-1".into(),
            chat_id: "chat-1".into(),
            mode: SessionMode::Agent,
            messages: vec![Message::user("hello"), Message::assistant("hi")],
            session_id: Some("prov-1".into()),
            stream_id: Some("stream-1".into()),
        }
    }

    #[test]
    fn load_missing_returns_none() {
        let store = test_store();
        assert!(store.load("nope").unwrap().is_none());
    }

    #[test]
    fn put_and_load_roundtrip() {
        let store = test_store();
        store.put_sub_session(&sample()).unwrap();
        let got = store.load("sub-1").unwrap().unwrap();
        assert_eq!(got.messages.len(), 2);
        assert_eq!(got.chat_id, "chat-1");
    }

    #[test]
    fn carryover_rewrites_log_and_touches_chat() {
        let store = test_store();
        store.put_sub_session(&sample()).unwrap();

        store
            .replace_with_carryover("sub-1", Message::assistant("carry"))
            .unwrap();

        let session = store.load("sub-1").unwrap().unwrap();
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].role, "assistant");
        assert!(session.session_id.is_none());
        assert!(session.stream_id.is_none());

        let chat = store.chat("chat-1").unwrap().unwrap();
        assert_eq!(chat.chat_id, "chat-1");
    }

    #[test]
    fn carryover_on_missing_session_is_noop() {
        let store = test_store();
        store
            .replace_with_carryover("ghost", Message::assistant("x"))
            .unwrap();
        assert!(store.load("ghost").unwrap().is_none());
        assert!(store.chat("chat-1").unwrap().is_none());
    }
}
