//! Chat sessions keyed by owner and topic.

use crate::message::Message;
use crate::store::{SessionRecord, SessionStore, StoreError};
use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// A chat session between an owner and a counterpart, backed by a shared
/// [`SessionStore`].
///
/// History can be large, so it is read in pages rather than all at once.
#[derive(Clone)]
pub struct ChatSession {
    owner_id: String,
    session_id: String,
    topic: String,
    store: Arc<SessionStore>,
}

impl ChatSession {
    /// Find the owner's session for `topic`, creating it when absent and
    /// `auto_create` is set. Returns `None` when the session does not
    /// exist and creation was not requested.
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure.
    pub fn open(
        store: &Arc<SessionStore>,
        owner_id: &str,
        topic: &str,
        auto_create: bool,
    ) -> Result<Option<Self>, StoreError> {
        if let Some(record) = store.session_by_owner_topic(owner_id, topic)? {
            return Ok(Some(Self {
                owner_id: record.owner,
                session_id: record.id,
                topic: record.topic,
                store: Arc::clone(store),
            }));
        }
        if !auto_create {
            return Ok(None);
        }

        let record = SessionRecord {
            id: format!("CS#{}", Uuid::new_v4().simple()),
            owner: owner_id.to_string(),
            topic: topic.to_string(),
            started_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        };
        store.insert_session(&record)?;
        debug!(session = %record.id, owner = %owner_id, topic = %topic, "created chat session");

        Ok(Some(Self {
            owner_id: record.owner,
            session_id: record.id,
            topic: record.topic,
            store: Arc::clone(store),
        }))
    }

    /// The owner this session belongs to.
    #[must_use]
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// The session id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The session topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Append a message to this session.
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure.
    pub fn append(&self, msg: &Message) -> Result<(), StoreError> {
        self.store.insert_message(&self.session_id, msg)
    }

    /// Append a message posted by the owner (owner → counterpart).
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure.
    pub fn append_post(&self, msg: &Message) -> Result<(), StoreError> {
        self.append(msg)
    }

    /// Append a message received by the owner (counterpart → owner).
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure.
    pub fn append_recv(&self, msg: &Message) -> Result<(), StoreError> {
        self.append(msg)
    }

    /// Read history most-recent-first; restartable from any `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure.
    pub fn read_history(&self, count: u32, offset: u32) -> Result<Vec<Message>, StoreError> {
        self.store.messages(&self.session_id, count, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageStatus;

    fn store() -> Arc<SessionStore> {
        Arc::new(SessionStore::open_in_memory().unwrap())
    }

    #[test]
    fn open_creates_when_requested() {
        let store = store();
        assert!(ChatSession::open(&store, "owner", "daily", false)
            .unwrap()
            .is_none());

        let session = ChatSession::open(&store, "owner", "daily", true)
            .unwrap()
            .unwrap();
        assert_eq!(session.owner_id(), "owner");
        assert_eq!(session.topic(), "daily");
        assert!(session.session_id().starts_with("CS#"));
    }

    #[test]
    fn reopen_returns_the_same_session() {
        let store = store();
        let first = ChatSession::open(&store, "owner", "daily", true)
            .unwrap()
            .unwrap();
        let second = ChatSession::open(&store, "owner", "daily", true)
            .unwrap()
            .unwrap();
        assert_eq!(first.session_id(), second.session_id());

        let other_topic = ChatSession::open(&store, "owner", "weekly", true)
            .unwrap()
            .unwrap();
        assert_ne!(first.session_id(), other_topic.session_id());
    }

    #[test]
    fn history_reads_most_recent_first() {
        let store = store();
        let session = ChatSession::open(&store, "owner", "daily", true)
            .unwrap()
            .unwrap();

        for (id, at, body) in [
            ("m1", "2025-11-03T09:00:01Z", "first"),
            ("m2", "2025-11-03T09:00:02Z", "second"),
            ("m3", "2025-11-03T09:00:03Z", "third"),
        ] {
            session
                .append(&Message {
                    id: id.to_string(),
                    sender: "owner".to_string(),
                    receiver: "agent".to_string(),
                    created_at: at.to_string(),
                    body: body.to_string(),
                    status: MessageStatus::Pending,
                })
                .unwrap();
        }

        let page = session.read_history(2, 0).unwrap();
        assert_eq!(
            page.iter().map(|m| m.body.as_str()).collect::<Vec<_>>(),
            vec!["third", "second"]
        );
        let rest = session.read_history(10, 2).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].body, "first");
    }

    #[test]
    fn post_and_recv_share_one_history() {
        let store = store();
        let session = ChatSession::open(&store, "owner", "daily", true)
            .unwrap()
            .unwrap();

        session
            .append_post(&Message::new("owner", "agent", "ping"))
            .unwrap();
        session
            .append_recv(&Message::new("agent", "owner", "pong"))
            .unwrap();
        assert_eq!(session.read_history(10, 0).unwrap().len(), 2);
    }
}
