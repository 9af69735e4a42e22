//! SQLite storage for chat sessions and messages.
//!
//! The store is an explicit value: callers open it, own it, and pass it to
//! the sessions that use it. There is no ambient per-path cache; sharing is
//! an `Arc` the caller hands out.

use crate::message::{Message, MessageStatus};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

/// Errors from the session store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying database error.
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

/// A stored chat session row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Unique session id.
    pub id: String,
    /// Owner the session belongs to.
    pub owner: String,
    /// Topic distinguishing the owner's sessions.
    pub topic: String,
    /// RFC 3339 creation timestamp.
    pub started_at: String,
}

/// SQLite-backed store for sessions and their messages.
pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    /// Open (or create) a store at `path`, creating tables as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening session store");
        Self::init(Connection::open(path)?)
    }

    /// An in-memory store, for tests and ephemeral sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id         TEXT PRIMARY KEY,
                owner      TEXT NOT NULL,
                topic      TEXT NOT NULL,
                started_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS messages (
                id         TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                sender     TEXT NOT NULL,
                receiver   TEXT NOT NULL,
                created_at TEXT NOT NULL,
                body       TEXT NOT NULL,
                status     INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_messages_session
                ON messages (session_id, created_at);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&conn)?)
    }

    /// Insert a new session row.
    ///
    /// # Errors
    ///
    /// Returns an error on a duplicate id or a database failure.
    pub fn insert_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, owner, topic, started_at) VALUES (?1, ?2, ?3, ?4)",
                params![record.id, record.owner, record.topic, record.started_at],
            )
            .map(|_| ())
        })
    }

    /// Fetch a session by id.
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure.
    pub fn session_by_id(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, owner, topic, started_at FROM sessions WHERE id = ?1",
                params![id],
                Self::session_from_row,
            )
            .optional()
        })
    }

    /// Fetch a session by its owner and topic.
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure.
    pub fn session_by_owner_topic(
        &self,
        owner: &str,
        topic: &str,
    ) -> Result<Option<SessionRecord>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, owner, topic, started_at FROM sessions
                 WHERE owner = ?1 AND topic = ?2",
                params![owner, topic],
                Self::session_from_row,
            )
            .optional()
        })
    }

    /// List sessions most-recent-first with offset pagination.
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure.
    pub fn sessions(&self, limit: u32, offset: u32) -> Result<Vec<SessionRecord>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, owner, topic, started_at FROM sessions
                 ORDER BY started_at DESC, rowid DESC
                 LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt.query_map(
                params![i64::from(limit), i64::from(offset)],
                Self::session_from_row,
            )?;
            rows.collect()
        })
    }

    /// Append a message to a session.
    ///
    /// # Errors
    ///
    /// Returns an error on a duplicate id or a database failure.
    pub fn insert_message(&self, session_id: &str, msg: &Message) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, session_id, sender, receiver, created_at, body, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    msg.id,
                    session_id,
                    msg.sender,
                    msg.receiver,
                    msg.created_at,
                    msg.body,
                    msg.status.code()
                ],
            )
            .map(|_| ())
        })
    }

    /// Fetch a message by id.
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure.
    pub fn message_by_id(&self, id: &str) -> Result<Option<Message>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, sender, receiver, created_at, body, status
                 FROM messages WHERE id = ?1",
                params![id],
                Self::message_from_row,
            )
            .optional()
        })
    }

    /// Read a session's messages most-recent-first with offset pagination;
    /// restartable from any offset.
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure.
    pub fn messages(
        &self,
        session_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender, receiver, created_at, body, status FROM messages
                 WHERE session_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt.query_map(
                params![session_id, i64::from(limit), i64::from(offset)],
                Self::message_from_row,
            )?;
            rows.collect()
        })
    }

    /// Update the delivery status of a message.
    ///
    /// # Errors
    ///
    /// Returns an error on a database failure.
    pub fn update_message_status(
        &self,
        id: &str,
        status: MessageStatus,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET status = ?1 WHERE id = ?2",
                params![status.code(), id],
            )
            .map(|_| ())
        })
    }

    fn session_from_row(row: &rusqlite::Row<'_>) -> Result<SessionRecord, rusqlite::Error> {
        Ok(SessionRecord {
            id: row.get(0)?,
            owner: row.get(1)?,
            topic: row.get(2)?,
            started_at: row.get(3)?,
        })
    }

    fn message_from_row(row: &rusqlite::Row<'_>) -> Result<Message, rusqlite::Error> {
        Ok(Message {
            id: row.get(0)?,
            sender: row.get(1)?,
            receiver: row.get(2)?,
            created_at: row.get(3)?,
            body: row.get(4)?,
            status: MessageStatus::from_code(row.get(5)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn msg(id: &str, created_at: &str, body: &str) -> Message {
        Message {
            id: id.to_string(),
            sender: "owner".to_string(),
            receiver: "agent".to_string(),
            created_at: created_at.to_string(),
            body: body.to_string(),
            status: MessageStatus::Pending,
        }
    }

    #[test]
    fn open_creates_tables_on_disk() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::open(tmp.path().join("history.db")).unwrap();
        assert!(store.sessions(10, 0).unwrap().is_empty());
    }

    #[test]
    fn session_round_trip() {
        let store = SessionStore::open_in_memory().unwrap();
        let record = SessionRecord {
            id: "CS#1".to_string(),
            owner: "owner".to_string(),
            topic: "daily".to_string(),
            started_at: "2025-11-03T09:00:00Z".to_string(),
        };
        store.insert_session(&record).unwrap();

        assert_eq!(store.session_by_id("CS#1").unwrap(), Some(record.clone()));
        assert_eq!(
            store.session_by_owner_topic("owner", "daily").unwrap(),
            Some(record)
        );
        assert_eq!(store.session_by_id("CS#2").unwrap(), None);
    }

    #[test]
    fn messages_paginate_most_recent_first() {
        let store = SessionStore::open_in_memory().unwrap();
        store
            .insert_message("CS#1", &msg("m1", "2025-11-03T09:00:01Z", "first"))
            .unwrap();
        store
            .insert_message("CS#1", &msg("m2", "2025-11-03T09:00:02Z", "second"))
            .unwrap();
        store
            .insert_message("CS#1", &msg("m3", "2025-11-03T09:00:03Z", "third"))
            .unwrap();
        store
            .insert_message("CS#other", &msg("mx", "2025-11-03T09:00:04Z", "elsewhere"))
            .unwrap();

        let page = store.messages("CS#1", 2, 0).unwrap();
        assert_eq!(
            page.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            vec!["m3", "m2"]
        );

        // Restartable from an offset.
        let rest = store.messages("CS#1", 2, 2).unwrap();
        assert_eq!(
            rest.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            vec!["m1"]
        );
    }

    #[test]
    fn status_update_round_trips() {
        let store = SessionStore::open_in_memory().unwrap();
        store
            .insert_message("CS#1", &msg("m1", "2025-11-03T09:00:01Z", "first"))
            .unwrap();
        store
            .update_message_status("m1", MessageStatus::Read)
            .unwrap();
        let loaded = store.message_by_id("m1").unwrap().unwrap();
        assert_eq!(loaded.status, MessageStatus::Read);
    }

    #[test]
    fn sessions_paginate_most_recent_first() {
        let store = SessionStore::open_in_memory().unwrap();
        for (id, started) in [
            ("CS#1", "2025-11-01T00:00:00Z"),
            ("CS#2", "2025-11-02T00:00:00Z"),
            ("CS#3", "2025-11-03T00:00:00Z"),
        ] {
            store
                .insert_session(&SessionRecord {
                    id: id.to_string(),
                    owner: "owner".to_string(),
                    topic: id.to_string(),
                    started_at: started.to_string(),
                })
                .unwrap();
        }

        let page = store.sessions(2, 0).unwrap();
        assert_eq!(
            page.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
            vec!["CS#3", "CS#2"]
        );
        let rest = store.sessions(2, 2).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, "CS#1");
    }
}
