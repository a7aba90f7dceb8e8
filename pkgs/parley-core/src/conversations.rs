//! Conversation aggregator
//!
//! Builds the ranked conversation feed for a user by merging two
//! independently computed sequences:
//!
//! 1. one projection per direct-message counterpart (last message plus the
//!    number of unread messages addressed to the user)
//! 2. one projection per group the user belongs to (latest group message,
//!    or the group's creation time when it has none)
//!
//! The two reads are not mutually consistent; a message arriving between
//! them may or may not show up.

use chrono::{DateTime, Utc};
use parley_store::{
    DirectSummary, GroupInfo, GroupManager, MessageStore, Store, UserDirectory, UserId, UserInfo,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{ChatError, Result};

/// One row in a user's conversation list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationItem {
    /// Counterpart user id or group id
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub last_message: Option<String>,
    pub last_message_timestamp: DateTime<Utc>,
    pub unread_count: u64,
    pub is_group: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members_id: Option<Vec<UserId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admins_id: Option<Vec<UserId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<UserId>,
}

impl ConversationItem {
    fn direct(summary: DirectSummary, counterpart: Option<&UserInfo>) -> Self {
        Self {
            id: summary.counterpart_id.to_string(),
            name: counterpart
                .map(|u| u.username.clone())
                .unwrap_or_else(|| summary.counterpart_id.to_string()),
            avatar: counterpart.and_then(|u| u.avatar.clone()),
            description: None,
            last_message: Some(summary.last_content),
            last_message_timestamp: summary.last_at,
            unread_count: summary.unread_count,
            is_group: false,
            members_id: None,
            admins_id: None,
            creator_id: None,
        }
    }

    fn group(group: GroupInfo, last_message: Option<(String, DateTime<Utc>)>) -> Self {
        let (last_message, last_message_timestamp) = match last_message {
            Some((content, at)) => (Some(content), at),
            None => (None, group.created_at),
        };

        Self {
            id: group.id.to_string(),
            name: group.name,
            avatar: None,
            description: group.description,
            last_message,
            last_message_timestamp,
            // Group read state is not tracked
            unread_count: 0,
            is_group: true,
            members_id: Some(group.members),
            admins_id: Some(group.admins),
            creator_id: Some(group.creator_id),
        }
    }
}

/// Newest activity first, then by id so equal timestamps order deterministically
fn rank(a: &ConversationItem, b: &ConversationItem) -> Ordering {
    b.last_message_timestamp
        .cmp(&a.last_message_timestamp)
        .then_with(|| a.id.cmp(&b.id))
}

/// Builds conversation projections
#[derive(Clone)]
pub struct ConversationAggregator {
    messages: MessageStore,
    users: UserDirectory,
    groups: GroupManager,
}

impl ConversationAggregator {
    pub fn new(store: &Store) -> Self {
        Self {
            messages: store.messages(),
            users: store.users(),
            groups: store.groups(),
        }
    }

    /// Every direct and group conversation of `user`, most recent first
    pub async fn list_conversations(&self, user: &UserId) -> Result<Vec<ConversationItem>> {
        let mut items = self.direct_items(user).await?;
        items.extend(self.group_items(user).await?);
        items.sort_by(rank);

        debug!("Listed {} conversations for {}", items.len(), user);
        Ok(items)
    }

    async fn direct_items(&self, user: &UserId) -> Result<Vec<ConversationItem>> {
        let summaries = self.messages.direct_summaries(user).await?;
        if summaries.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<UserId> = summaries.iter().map(|s| s.counterpart_id.clone()).collect();
        let profiles: HashMap<UserId, UserInfo> = self
            .users
            .find_many(&ids)
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();

        Ok(summaries
            .into_iter()
            .map(|summary| {
                let profile = profiles.get(&summary.counterpart_id);
                ConversationItem::direct(summary, profile)
            })
            .collect())
    }

    async fn group_items(&self, user: &UserId) -> Result<Vec<ConversationItem>> {
        let groups = self.groups.groups_for_user(user).await?;
        let mut items = Vec::with_capacity(groups.len());
        for group in groups {
            let latest = self
                .messages
                .latest_group_message(&group.id)
                .await?
                .map(|m| (m.content, m.created_at));
            items.push(ConversationItem::group(group, latest));
        }
        Ok(items)
    }

    /// The direct conversation between `user` and `counterpart`
    pub async fn conversation_with(
        &self,
        user: &UserId,
        counterpart: &UserId,
    ) -> Result<ConversationItem> {
        let profile = self
            .users
            .get(counterpart)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("user {}", counterpart)))?;

        let latest = self.messages.latest_direct(user, counterpart).await?;
        let unread_count = self.messages.unread_from(user, counterpart).await?;

        let (last_message, last_message_timestamp) = match latest {
            Some(message) => (Some(message.content), message.created_at),
            None => (None, profile.created_at),
        };

        Ok(ConversationItem {
            id: counterpart.to_string(),
            name: profile.username,
            avatar: profile.avatar,
            description: None,
            last_message,
            last_message_timestamp,
            unread_count,
            is_group: false,
            members_id: None,
            admins_id: None,
            creator_id: None,
        })
    }
}
