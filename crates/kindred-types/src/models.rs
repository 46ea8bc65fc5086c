use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque user identifier as issued by the API server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Server-side room shared by exactly two participants.
/// The id is derived from the unordered pair, so both sides compute the same room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId(String);

impl RoomId {
    pub fn between(a: &UserId, b: &UserId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{}:{}", lo, hi))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The signed-in user looking at a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
}

impl Viewer {
    /// Name announced to the room and used for the "mine" fallback.
    pub fn display_name(&self) -> &str {
        &self.first_name
    }
}

/// Where a transcript record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordOrigin {
    /// Loaded from the persisted transcript; timestamp is the server creation time.
    History,
    /// Received over the live channel; timestamp is the local receipt time.
    Live,
}

/// One transcript entry, in the single shape shared by history and live ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub sender_id: Option<UserId>,
    pub sender_first_name: String,
    pub sender_last_name: String,
    pub text: String,
    /// Display-formatted local time, fixed when the record is produced.
    pub timestamp: String,
    pub origin: RecordOrigin,
}

impl MessageRecord {
    /// A record is the viewer's own when the sender id matches. Records without a
    /// sender id fall back to comparing the display name.
    pub fn is_mine(&self, viewer: &Viewer) -> bool {
        match &self.sender_id {
            Some(id) => *id == viewer.id,
            None => {
                !self.sender_first_name.is_empty()
                    && self.sender_first_name == viewer.display_name()
            }
        }
    }

    pub fn sender_name(&self) -> String {
        format!("{} {}", self.sender_first_name, self.sender_last_name)
            .trim()
            .to_string()
    }
}

/// Side of the conversation a displayed record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Mine,
    Theirs,
}

/// Display name of the other participant, inferred from the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartProfile {
    pub first_name: String,
    pub last_name: String,
}

impl CounterpartProfile {
    pub fn from_record(record: &MessageRecord) -> Self {
        Self {
            first_name: record.sender_first_name.clone(),
            last_name: record.sender_last_name.clone(),
        }
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}
