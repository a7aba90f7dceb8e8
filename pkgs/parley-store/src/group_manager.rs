//! Group manager for storing and managing groups and their members

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::MonotonicClock;
use crate::entities::{group_members, groups, messages, users};
use crate::error::{Result, StoreError};
use crate::types::{millis_to_datetime, GroupId, UserId};

/// Group information with its member and admin sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub id: GroupId,
    pub name: String,
    pub description: Option<String>,
    pub creator_id: UserId,
    pub created_at: DateTime<Utc>,
    pub members: Vec<UserId>,
    pub admins: Vec<UserId>,
}

impl GroupInfo {
    fn assemble(model: groups::Model, memberships: Vec<group_members::Model>) -> Result<Self> {
        let mut members = Vec::with_capacity(memberships.len());
        let mut admins = Vec::new();
        for membership in memberships {
            let user = UserId::new(membership.user_id);
            if membership.is_admin {
                admins.push(user.clone());
            }
            members.push(user);
        }
        members.sort();
        admins.sort();

        Ok(Self {
            id: GroupId::new(model.id),
            name: model.name,
            description: model.description,
            creator_id: UserId::new(model.creator_id),
            created_at: millis_to_datetime(model.created_at)?,
            members,
            admins,
        })
    }

    pub fn has_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }
}

/// Group manager
#[derive(Clone)]
pub struct GroupManager {
    db: DatabaseConnection,
    clock: Arc<MonotonicClock>,
}

impl GroupManager {
    pub fn new(db: DatabaseConnection, clock: Arc<MonotonicClock>) -> Self {
        Self { db, clock }
    }

    /// Create a group. The creator becomes a member and an admin.
    pub async fn create(
        &self,
        creator: &UserId,
        name: &str,
        description: Option<&str>,
        members: &[UserId],
    ) -> Result<GroupInfo> {
        if name.trim().is_empty() {
            return Err(StoreError::InvalidInput("group name must not be empty".into()));
        }

        let mut member_set: BTreeSet<UserId> = members.iter().cloned().collect();
        member_set.insert(creator.clone());
        let member_ids: Vec<UserId> = member_set.into_iter().collect();

        let known = users::Entity::find()
            .filter(users::Column::Id.is_in(member_ids.iter().map(UserId::as_str)))
            .count(&self.db)
            .await?;
        if known != member_ids.len() as u64 {
            for id in &member_ids {
                if users::Entity::find_by_id(id.as_str())
                    .one(&self.db)
                    .await?
                    .is_none()
                {
                    return Err(StoreError::UserNotFound(id.clone()));
                }
            }
        }

        let id = GroupId::generate();
        let now = self.clock.now_millis();

        let txn = self.db.begin().await?;
        groups::Entity::insert(groups::ActiveModel {
            id: Set(id.as_str().to_string()),
            name: Set(name.to_string()),
            description: Set(description.map(str::to_string)),
            creator_id: Set(creator.as_str().to_string()),
            created_at: Set(now),
        })
        .exec_without_returning(&txn)
        .await?;

        let memberships = member_ids.iter().map(|user| group_members::ActiveModel {
            group_id: Set(id.as_str().to_string()),
            user_id: Set(user.as_str().to_string()),
            is_admin: Set(user == creator),
            joined_at: Set(now),
        });
        group_members::Entity::insert_many(memberships)
            .exec_without_returning(&txn)
            .await?;
        txn.commit().await?;

        info!("Group '{}' ({}) created by {}", name, id, creator);

        Ok(GroupInfo {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
            creator_id: creator.clone(),
            created_at: millis_to_datetime(now)?,
            members: member_ids,
            admins: vec![creator.clone()],
        })
    }

    /// Get a group by id
    pub async fn get(&self, group_id: &GroupId) -> Result<Option<GroupInfo>> {
        debug!("Getting group: {}", group_id);

        let Some(model) = groups::Entity::find_by_id(group_id.as_str())
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let memberships = group_members::Entity::find()
            .filter(group_members::Column::GroupId.eq(group_id.as_str()))
            .all(&self.db)
            .await?;

        GroupInfo::assemble(model, memberships).map(Some)
    }

    /// Check whether a group exists
    pub async fn exists(&self, group_id: &GroupId) -> Result<bool> {
        let count = groups::Entity::find()
            .filter(groups::Column::Id.eq(group_id.as_str()))
            .count(&self.db)
            .await?;

        Ok(count > 0)
    }

    /// Every group `user` belongs to, oldest first
    pub async fn groups_for_user(&self, user: &UserId) -> Result<Vec<GroupInfo>> {
        let group_ids: Vec<String> = group_members::Entity::find()
            .filter(group_members::Column::UserId.eq(user.as_str()))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|m| m.group_id)
            .collect();

        if group_ids.is_empty() {
            return Ok(Vec::new());
        }

        let models = groups::Entity::find()
            .filter(groups::Column::Id.is_in(group_ids.iter().map(String::as_str)))
            .order_by_asc(groups::Column::CreatedAt)
            .all(&self.db)
            .await?;

        let mut by_group: HashMap<String, Vec<group_members::Model>> = HashMap::new();
        for membership in group_members::Entity::find()
            .filter(group_members::Column::GroupId.is_in(group_ids.iter().map(String::as_str)))
            .all(&self.db)
            .await?
        {
            by_group
                .entry(membership.group_id.clone())
                .or_default()
                .push(membership);
        }

        models
            .into_iter()
            .map(|model| {
                let memberships = by_group.remove(&model.id).unwrap_or_default();
                GroupInfo::assemble(model, memberships)
            })
            .collect()
    }

    async fn membership(
        &self,
        group_id: &GroupId,
        user: &UserId,
    ) -> Result<Option<group_members::Model>> {
        let model = group_members::Entity::find_by_id((
            group_id.as_str().to_string(),
            user.as_str().to_string(),
        ))
        .one(&self.db)
        .await?;

        Ok(model)
    }

    /// Check whether `user` is a member of `group_id`
    pub async fn is_member(&self, group_id: &GroupId, user: &UserId) -> Result<bool> {
        Ok(self.membership(group_id, user).await?.is_some())
    }

    /// Check whether `user` is an admin of `group_id`
    pub async fn is_admin(&self, group_id: &GroupId, user: &UserId) -> Result<bool> {
        Ok(self
            .membership(group_id, user)
            .await?
            .is_some_and(|m| m.is_admin))
    }

    async fn require_group(&self, group_id: &GroupId) -> Result<()> {
        if self.exists(group_id).await? {
            Ok(())
        } else {
            Err(StoreError::GroupNotFound(group_id.clone()))
        }
    }

    /// Add `user` to the group. Only admins may add members.
    pub async fn add_member(&self, group_id: &GroupId, actor: &UserId, user: &UserId) -> Result<()> {
        self.require_group(group_id).await?;
        if !self.is_admin(group_id, actor).await? {
            return Err(StoreError::NotPermitted(format!(
                "{} is not an admin of group {}",
                actor, group_id
            )));
        }
        if users::Entity::find_by_id(user.as_str())
            .one(&self.db)
            .await?
            .is_none()
        {
            return Err(StoreError::UserNotFound(user.clone()));
        }
        if self.is_member(group_id, user).await? {
            return Err(StoreError::AlreadyMember {
                group: group_id.clone(),
                user: user.clone(),
            });
        }

        group_members::Entity::insert(group_members::ActiveModel {
            group_id: Set(group_id.as_str().to_string()),
            user_id: Set(user.as_str().to_string()),
            is_admin: Set(false),
            joined_at: Set(self.clock.now_millis()),
        })
        .exec_without_returning(&self.db)
        .await?;

        info!("{} added {} to group {}", actor, user, group_id);
        Ok(())
    }

    /// Remove `user` from the group. Admins may remove anyone, members only themselves.
    pub async fn remove_member(
        &self,
        group_id: &GroupId,
        actor: &UserId,
        user: &UserId,
    ) -> Result<()> {
        self.require_group(group_id).await?;
        if actor != user && !self.is_admin(group_id, actor).await? {
            return Err(StoreError::NotPermitted(format!(
                "{} may not remove {} from group {}",
                actor, user, group_id
            )));
        }

        let result = group_members::Entity::delete_many()
            .filter(group_members::Column::GroupId.eq(group_id.as_str()))
            .filter(group_members::Column::UserId.eq(user.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::InvalidInput(format!(
                "{} is not a member of group {}",
                user, group_id
            )));
        }

        info!("{} removed {} from group {}", actor, user, group_id);
        Ok(())
    }

    /// Delete a group together with its memberships and messages. Admins only.
    pub async fn delete(&self, group_id: &GroupId, actor: &UserId) -> Result<()> {
        self.require_group(group_id).await?;
        if !self.is_admin(group_id, actor).await? {
            return Err(StoreError::NotPermitted(format!(
                "{} is not an admin of group {}",
                actor, group_id
            )));
        }

        let txn = self.db.begin().await?;
        let removed = messages::Entity::delete_many()
            .filter(messages::Column::GroupId.eq(group_id.as_str()))
            .exec(&txn)
            .await?;
        group_members::Entity::delete_many()
            .filter(group_members::Column::GroupId.eq(group_id.as_str()))
            .exec(&txn)
            .await?;
        groups::Entity::delete_by_id(group_id.as_str())
            .exec(&txn)
            .await?;
        txn.commit().await?;

        info!(
            "Group {} deleted by {} ({} messages removed)",
            group_id, actor, removed.rows_affected
        );
        Ok(())
    }
}
