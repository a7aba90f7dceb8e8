//! Message ingest
//!
//! The single write path into the message log. Both entry points validate
//! content before touching the store, then check the sender's right to post
//! through the membership oracle. Persistence failures are returned to the
//! caller and never retried here.

use parley_store::{
    ContactStatus, GroupId, GroupManager, MessageStore, MessageTarget, NewMessage, Store,
    StoredMessage, UserDirectory, UserId,
};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::config::EngineConfig;
use crate::error::{ChatError, Result};
use crate::oracle::MembershipOracle;

/// Validates and persists new messages
#[derive(Clone)]
pub struct MessageIngest {
    messages: MessageStore,
    users: UserDirectory,
    groups: GroupManager,
    oracle: Arc<dyn MembershipOracle>,
    config: EngineConfig,
}

impl MessageIngest {
    pub fn new(store: &Store, oracle: Arc<dyn MembershipOracle>, config: EngineConfig) -> Self {
        Self {
            messages: store.messages(),
            users: store.users(),
            groups: store.groups(),
            oracle,
            config,
        }
    }

    fn check_content(&self, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(ChatError::InvalidArgument(
                "message content must not be empty".into(),
            ));
        }
        let len = content.chars().count();
        if len > self.config.max_content_len {
            return Err(ChatError::InvalidArgument(format!(
                "message content is {} characters, limit is {}",
                len, self.config.max_content_len
            )));
        }
        Ok(())
    }

    /// Persist a direct message from `sender` to `receiver`
    #[instrument(skip(self, content))]
    pub async fn create(
        &self,
        sender: &UserId,
        receiver: &UserId,
        content: &str,
    ) -> Result<StoredMessage> {
        self.check_content(content)?;

        if !self.users.exists(receiver).await? {
            return Err(ChatError::NotFound(format!("receiver {}", receiver)));
        }

        match self.oracle.contact_status(sender, receiver).await? {
            ContactStatus::Mutual => {}
            ContactStatus::Blocked => {
                return Err(ChatError::PermissionDenied(format!(
                    "contact between {} and {} is blocked",
                    sender, receiver
                )))
            }
            ContactStatus::None => {
                return Err(ChatError::PermissionDenied(format!(
                    "{} and {} are not mutual contacts",
                    sender, receiver
                )))
            }
        }

        let stored = self
            .messages
            .insert(NewMessage {
                sender_id: sender.clone(),
                target: MessageTarget::Direct(receiver.clone()),
                content: content.to_string(),
            })
            .await?;

        debug!("Direct message {} persisted", stored.id);
        Ok(stored)
    }

    /// Persist a message from `sender` to every member of `group`
    #[instrument(skip(self, content))]
    pub async fn create_group_message(
        &self,
        sender: &UserId,
        group: &GroupId,
        content: &str,
    ) -> Result<StoredMessage> {
        self.check_content(content)?;

        if !self.groups.exists(group).await? {
            return Err(ChatError::NotFound(format!("group {}", group)));
        }
        if !self.oracle.is_group_member(sender, group).await? {
            return Err(ChatError::PermissionDenied(format!(
                "{} is not a member of group {}",
                sender, group
            )));
        }

        let stored = self
            .messages
            .insert(NewMessage {
                sender_id: sender.clone(),
                target: MessageTarget::Group(group.clone()),
                content: content.to_string(),
            })
            .await?;

        debug!("Group message {} persisted", stored.id);
        Ok(stored)
    }
}
