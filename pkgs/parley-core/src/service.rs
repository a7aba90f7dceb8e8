//! Chat service
//!
//! Ties the engine components together: ingest then fanout on the write
//! path, and the read-state tracker and conversation aggregator on the query
//! path.

use parley_store::{GroupId, MessageId, Store, StoredMessage, UserId};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::config::EngineConfig;
use crate::conversations::{ConversationAggregator, ConversationItem};
use crate::error::{ChatError, Result};
use crate::fanout::DeliveryFanout;
use crate::hub::Hub;
use crate::ingest::MessageIngest;
use crate::oracle::MembershipOracle;
use crate::read_state::ReadStateTracker;
use crate::registry::ConnectionId;
use crate::rooms::RoomName;

/// Chat engine facade
pub struct ChatService {
    store: Store,
    hub: Arc<Hub>,
    oracle: Arc<dyn MembershipOracle>,
    ingest: MessageIngest,
    fanout: DeliveryFanout,
    read_state: ReadStateTracker,
    conversations: ConversationAggregator,
}

impl ChatService {
    pub fn new(
        store: Store,
        hub: Arc<Hub>,
        oracle: Arc<dyn MembershipOracle>,
        config: EngineConfig,
    ) -> Self {
        let conversations = ConversationAggregator::new(&store);
        Self {
            ingest: MessageIngest::new(&store, oracle.clone(), config),
            fanout: DeliveryFanout::new(hub.clone(), &store),
            read_state: ReadStateTracker::new(&store, conversations.clone()),
            conversations,
            store,
            hub,
            oracle,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Persist a direct message, then push it to the receiver's live connections
    #[instrument(skip(self, content))]
    pub async fn send_direct(
        &self,
        sender: &UserId,
        receiver: &UserId,
        content: &str,
    ) -> Result<StoredMessage> {
        let message = self.ingest.create(sender, receiver, content).await?;
        self.fanout.deliver(&message).await;
        Ok(message)
    }

    /// Persist a group message, then push it to the group's room
    #[instrument(skip(self, content))]
    pub async fn send_group(
        &self,
        sender: &UserId,
        group: &GroupId,
        content: &str,
    ) -> Result<StoredMessage> {
        let message = self.ingest.create_group_message(sender, group, content).await?;
        self.fanout.deliver(&message).await;
        Ok(message)
    }

    /// Join `connection` to a group's room; only members may join
    pub async fn join_group(
        &self,
        connection: ConnectionId,
        user: &UserId,
        group: &GroupId,
    ) -> Result<bool> {
        if !self.oracle.is_group_member(user, group).await? {
            return Err(ChatError::PermissionDenied(format!(
                "{} is not a member of group {}",
                user, group
            )));
        }
        self.hub.join(connection, RoomName::Group(group.clone()))
    }

    pub fn leave_group(&self, connection: ConnectionId, group: &GroupId) -> Result<bool> {
        self.hub.leave(connection, &RoomName::Group(group.clone()))
    }

    pub async fn list_conversations(&self, user: &UserId) -> Result<Vec<ConversationItem>> {
        self.conversations.list_conversations(user).await
    }

    pub async fn conversation_with(
        &self,
        user: &UserId,
        counterpart: &UserId,
    ) -> Result<ConversationItem> {
        self.conversations.conversation_with(user, counterpart).await
    }

    /// Direct messages between `user` and `counterpart`, oldest first
    pub async fn history(&self, user: &UserId, counterpart: &UserId) -> Result<Vec<StoredMessage>> {
        if !self.store.users().exists(counterpart).await? {
            return Err(ChatError::NotFound(format!("user {}", counterpart)));
        }
        Ok(self.store.messages().direct_history(user, counterpart).await?)
    }

    /// Messages posted to `group`, oldest first; members only
    pub async fn group_messages(&self, user: &UserId, group: &GroupId) -> Result<Vec<StoredMessage>> {
        if !self.store.groups().exists(group).await? {
            return Err(ChatError::NotFound(format!("group {}", group)));
        }
        if !self.oracle.is_group_member(user, group).await? {
            return Err(ChatError::PermissionDenied(format!(
                "{} is not a member of group {}",
                user, group
            )));
        }

        let messages = self.store.messages().group_history(group).await?;
        debug!("Loaded {} messages of group {}", messages.len(), group);
        Ok(messages)
    }

    pub async fn unread_count(&self, user: &UserId) -> Result<u64> {
        self.read_state.unread_count(user).await
    }

    pub async fn mark_message_read(
        &self,
        message_id: &MessageId,
        reader: &UserId,
    ) -> Result<StoredMessage> {
        self.read_state.mark_message_read(message_id, reader).await
    }

    pub async fn mark_conversation_read(
        &self,
        reader: &UserId,
        counterpart: &UserId,
    ) -> Result<ConversationItem> {
        self.read_state.mark_conversation_read(reader, counterpart).await
    }
}
