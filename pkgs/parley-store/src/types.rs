//! Identifier and record types shared by the store and the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::StoreError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh random identifier
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Opaque, globally unique user identity
    UserId
);
string_id!(
    /// Group identity
    GroupId
);
string_id!(
    /// Message identity
    MessageId
);

/// Where a message is addressed: exactly one user or exactly one group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum MessageTarget {
    Direct(UserId),
    Group(GroupId),
}

impl MessageTarget {
    /// Rebuild a target from the two nullable storage columns.
    ///
    /// Returns `None` when both or neither column is set.
    pub fn from_columns(receiver_id: Option<String>, group_id: Option<String>) -> Option<Self> {
        match (receiver_id, group_id) {
            (Some(receiver), None) => Some(Self::Direct(UserId::new(receiver))),
            (None, Some(group)) => Some(Self::Group(GroupId::new(group))),
            _ => None,
        }
    }

    /// Split into `(receiver_id, group_id)` storage columns
    pub fn into_columns(self) -> (Option<String>, Option<String>) {
        match self {
            Self::Direct(user) => (Some(user.into_inner()), None),
            Self::Group(group) => (None, Some(group.into_inner())),
        }
    }
}

/// A message that has not been persisted yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub target: MessageTarget,
    pub content: String,
}

/// Stored message (persistent)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub target: MessageTarget,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

impl StoredMessage {
    pub fn receiver_id(&self) -> Option<&UserId> {
        match &self.target {
            MessageTarget::Direct(user) => Some(user),
            MessageTarget::Group(_) => None,
        }
    }

    pub fn group_id(&self) -> Option<&GroupId> {
        match &self.target {
            MessageTarget::Direct(_) => None,
            MessageTarget::Group(group) => Some(group),
        }
    }
}

/// Relationship between two users as seen by the contact book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactStatus {
    /// Both users hold an unblocked contact record for each other
    Mutual,
    /// At least one side has blocked the other
    Blocked,
    /// No mutual relationship
    None,
}

/// Per-counterpart aggregate over direct messages
#[derive(Debug, Clone, PartialEq)]
pub struct DirectSummary {
    pub counterpart_id: UserId,
    pub last_content: String,
    pub last_at: DateTime<Utc>,
    pub unread_count: u64,
}

pub(crate) fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::CorruptRecord(format!("timestamp out of range: {}", millis)))
}
