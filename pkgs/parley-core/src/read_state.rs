//! Read-state tracker
//!
//! Read flags only exist on direct messages and only the receiver may flip
//! them. Group messages carry no per-member read state.

use parley_store::{MessageId, MessageStore, Store, StoredMessage, UserId};
use tracing::debug;

use crate::conversations::{ConversationAggregator, ConversationItem};
use crate::error::{ChatError, Result};

/// Flips read flags and reports unread counts
#[derive(Clone)]
pub struct ReadStateTracker {
    messages: MessageStore,
    conversations: ConversationAggregator,
}

impl ReadStateTracker {
    pub fn new(store: &Store, conversations: ConversationAggregator) -> Self {
        Self {
            messages: store.messages(),
            conversations,
        }
    }

    /// Mark one direct message as read by its receiver.
    ///
    /// Marking an already-read message succeeds without changing it.
    pub async fn mark_message_read(
        &self,
        message_id: &MessageId,
        reader: &UserId,
    ) -> Result<StoredMessage> {
        let message = self
            .messages
            .get(message_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("message {}", message_id)))?;

        let Some(receiver) = message.receiver_id() else {
            return Err(ChatError::InvalidArgument(
                "group messages cannot be marked as read".into(),
            ));
        };
        if receiver != reader {
            return Err(ChatError::PermissionDenied(format!(
                "{} is not the receiver of message {}",
                reader, message_id
            )));
        }
        if message.is_read {
            return Ok(message);
        }

        let flipped = self.messages.mark_read(message_id).await?;
        debug!("Message {} read by {} (flipped: {})", message_id, reader, flipped);

        self.messages
            .get(message_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("message {}", message_id)))
    }

    /// Mark every unread message from `counterpart` to `reader` as read and
    /// return the refreshed conversation
    pub async fn mark_conversation_read(
        &self,
        reader: &UserId,
        counterpart: &UserId,
    ) -> Result<ConversationItem> {
        let flipped = self
            .messages
            .mark_conversation_read(reader, counterpart)
            .await?;
        debug!("{} messages from {} read by {}", flipped, counterpart, reader);

        self.conversations.conversation_with(reader, counterpart).await
    }

    /// Unread direct messages addressed to `user`
    pub async fn unread_count(&self, user: &UserId) -> Result<u64> {
        Ok(self.messages.unread_count(user).await?)
    }
}
