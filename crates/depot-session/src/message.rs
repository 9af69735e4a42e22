//! Chat messages.

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

/// Delivery state of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageStatus {
    /// Appended but not yet handled.
    #[default]
    Pending,
    /// Handed to the receiver.
    Delivered,
    /// Seen by the receiver.
    Read,
}

impl MessageStatus {
    /// Storage code for the status column.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::Pending => 0,
            Self::Delivered => 1,
            Self::Read => 2,
        }
    }

    /// Decode a status column value. Unknown codes decode as `Pending`.
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Delivered,
            2 => Self::Read,
            _ => Self::Pending,
        }
    }
}

/// One message in a chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Unique message id.
    pub id: String,

    /// Who sent the message.
    pub sender: String,

    /// Who the message is addressed to.
    pub receiver: String,

    /// RFC 3339 creation timestamp.
    pub created_at: String,

    /// Message body.
    pub body: String,

    /// Delivery state.
    pub status: MessageStatus,
}

impl Message {
    /// A new pending message stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: sender.into(),
            receiver: receiver.into(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            body: body.into(),
            status: MessageStatus::Pending,
        }
    }
}
