//! Wire-level events exchanged with connected clients
//!
//! Inbound frames carry a named event plus its data (`{"event": "...",
//! "data": {...}}`). Outbound pushes use the same shape, and every inbound
//! request is answered with exactly one [`Ack`].

use chrono::{DateTime, Utc};
use parley_store::{GroupId, MessageId, StoredMessage, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ChatError;

/// Everything a connected client may ask of the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum Request {
    // Transport intents
    #[serde(rename_all = "camelCase")]
    SendMessage {
        receiver_id: UserId,
        #[serde(default)]
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    SendGroupMessage {
        group_id: GroupId,
        #[serde(default)]
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    JoinRoom { user_id: UserId },
    #[serde(rename_all = "camelCase")]
    LeaveRoom { user_id: UserId },
    #[serde(rename_all = "camelCase")]
    JoinGroup { group_id: GroupId },
    #[serde(rename_all = "camelCase")]
    LeaveGroup { group_id: GroupId },

    // Queries
    GetConversations,
    GetUnreadCount,
    #[serde(rename_all = "camelCase")]
    GetConversation { user_id: UserId },
    #[serde(rename_all = "camelCase")]
    GetGroupMessages { group_id: GroupId },
    #[serde(rename_all = "camelCase")]
    MarkAsRead { message_id: MessageId },
    #[serde(rename_all = "camelCase")]
    MarkConversationRead { user_id: UserId },
}

impl Request {
    /// Name of the event as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Request::SendMessage { .. } => "sendMessage",
            Request::SendGroupMessage { .. } => "sendGroupMessage",
            Request::JoinRoom { .. } => "joinRoom",
            Request::LeaveRoom { .. } => "leaveRoom",
            Request::JoinGroup { .. } => "joinGroup",
            Request::LeaveGroup { .. } => "leaveGroup",
            Request::GetConversations => "getConversations",
            Request::GetUnreadCount => "getUnreadCount",
            Request::GetConversation { .. } => "getConversation",
            Request::GetGroupMessages { .. } => "getGroupMessages",
            Request::MarkAsRead { .. } => "markAsRead",
            Request::MarkConversationRead { .. } => "markConversationRead",
        }
    }
}

/// A message as pushed to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: MessageId,
    pub sender_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

impl From<&StoredMessage> for MessagePayload {
    fn from(message: &StoredMessage) -> Self {
        Self {
            id: message.id.clone(),
            sender_id: message.sender_id.clone(),
            receiver_id: message.receiver_id().cloned(),
            group_id: message.group_id().cloned(),
            content: message.content.clone(),
            created_at: message.created_at,
            is_read: message.is_read,
            read_at: message.read_at,
        }
    }
}

/// Events pushed from the engine to live connections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    NewMessage(MessagePayload),
    NewGroupMessage(MessagePayload),
    #[serde(rename_all = "camelCase")]
    UserOnline { user_id: UserId },
    #[serde(rename_all = "camelCase")]
    UserOffline { user_id: UserId },
    #[serde(rename_all = "camelCase")]
    UserJoinedGroup { user_id: UserId, group_id: GroupId },
    #[serde(rename_all = "camelCase")]
    UserLeftGroup { user_id: UserId, group_id: GroupId },
}

/// Reply to a single request: either success with data or an error, never both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ack {
    Success {
        success: bool,
        #[serde(default)]
        data: Value,
    },
    Failure {
        error: String,
        code: String,
    },
}

impl Ack {
    pub fn ok<T: Serialize>(data: T) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Ack::Success {
                success: true,
                data,
            },
            Err(e) => Ack::Failure {
                error: format!("Failed to encode reply: {}", e),
                code: "INTERNAL".to_string(),
            },
        }
    }

    pub fn error(err: &ChatError) -> Self {
        Ack::Failure {
            error: err.to_string(),
            code: err.code().to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Ack::Success { success: true, .. })
    }

    /// Data carried by a successful reply
    pub fn data(&self) -> Option<&Value> {
        match self {
            Ack::Success { data, .. } => Some(data),
            Ack::Failure { .. } => None,
        }
    }

    /// Error code carried by a failed reply
    pub fn code(&self) -> Option<&str> {
        match self {
            Ack::Success { .. } => None,
            Ack::Failure { code, .. } => Some(code),
        }
    }
}
