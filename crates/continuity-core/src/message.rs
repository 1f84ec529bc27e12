//! Sub-session message log: the collaborator interface the engine reads
//! for failing-test digests and rewrites on rehydrate.
//!
//! The engine only ever needs two operations, so the store is a small
//! trait; the redb implementation lives in `continuity-db` and tests use
//! [`InMemoryMessageStore`].

use crate::config::SessionMode;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// One typed fragment of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePart {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub parts: Vec<MessagePart>,
}

impl Message {
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            parts: vec![MessagePart::text(text)],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![MessagePart::text(text)],
        }
    }
}

/// One logical model conversation within a parent chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubSession {
    pub sub_session_id: String,
    pub chat_id: String,
    pub mode: SessionMode,
    pub messages: Vec<Message>,
    /// Provider-side session handle, cleared on rehydrate.
    pub session_id: Option<String>,
    /// Provider-side stream handle, cleared on rehydrate.
    pub stream_id: Option<String>,
}

/// Read/rewrite access to sub-session message logs.
pub trait MessageStore: Send + Sync {
    fn load(&self, sub_session_id: &str) -> Result<Option<SubSession>>;

    /// Replace the session's messages with a single carry-over message,
    /// clear provider handles, and touch the parent chat.
    fn replace_with_carryover(&self, sub_session_id: &str, message: Message) -> Result<()>;
}

/// Map-backed store for tests and dry runs.
#[derive(Default)]
pub struct InMemoryMessageStore {
    sessions: Mutex<HashMap<String, SubSession>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, session: SubSession) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.sub_session_id.clone(), session);
    }
}

impl MessageStore for InMemoryMessageStore {
    fn load(&self, sub_session_id: &str) -> Result<Option<SubSession>> {
        Ok(self.sessions.lock().unwrap().get(sub_session_id).cloned())
    }

    fn replace_with_carryover(&self, sub_session_id: &str, message: Message) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get_mut(sub_session_id) {
            session.messages = vec![message];
            session.session_id = None;
            session.stream_id = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SubSession {
        SubSession {
            sub_session_id: "sub-1".into(),
            chat_id: "chat-1".into(),
            mode: SessionMode::Agent,
            messages: vec![Message::user("hello"), Message::assistant("hi")],
            session_id: Some("prov-123".into()),
            stream_id: Some("stream-9".into()),
        }
    }

    #[test]
    fn load_missing_returns_none() {
        let store = InMemoryMessageStore::new();
        assert!(store.load("nope").unwrap().is_none());
    }

    #[test]
    fn carryover_replaces_messages_and_clears_handles() {
        let store = InMemoryMessageStore::new();
        store.put(sample());

        store
            .replace_with_carryover("sub-1", Message::assistant("carry-over"))
            .unwrap();

        let session = store.load("sub-1").unwrap().unwrap();
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].parts[0].text, "carry-over");
        assert!(session.session_id.is_none());
        assert!(session.stream_id.is_none());
    }

    #[test]
    fn carryover_on_missing_session_is_noop() {
        let store = InMemoryMessageStore::new();
        store
            .replace_with_carryover("ghost", Message::assistant("x"))
            .unwrap();
        assert!(store.load("ghost").unwrap().is_none());
    }

    #[test]
    fn part_serde_uses_type_field() {
        let json = serde_json::to_string(&MessagePart::text("t")).unwrap();
        assert!(json.contains("\"type\":\"text\""));
    }
}
