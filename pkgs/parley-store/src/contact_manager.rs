//! Contact manager for storing and managing contact relationships
//!
//! Contacts are directed: `owner -> contact`. Two users are mutual contacts
//! when both directions exist, and the pair is blocked when either side has
//! set its block flag.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::MonotonicClock;
use crate::entities::{contacts, users};
use crate::error::{Result, StoreError};
use crate::types::{millis_to_datetime, ContactStatus, UserId};

/// Contact information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    pub owner_id: UserId,
    pub contact_id: UserId,
    pub nickname: Option<String>,
    pub blocked: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<contacts::Model> for ContactInfo {
    type Error = StoreError;

    fn try_from(model: contacts::Model) -> Result<Self> {
        Ok(Self {
            owner_id: UserId::new(model.owner_id),
            contact_id: UserId::new(model.contact_id),
            nickname: model.nickname,
            blocked: model.blocked,
            created_at: millis_to_datetime(model.created_at)?,
        })
    }
}

/// Contact manager
#[derive(Clone)]
pub struct ContactManager {
    db: DatabaseConnection,
    clock: Arc<MonotonicClock>,
}

impl ContactManager {
    pub fn new(db: DatabaseConnection, clock: Arc<MonotonicClock>) -> Self {
        Self { db, clock }
    }

    /// Add `contact` to `owner`'s contact book
    pub async fn add(
        &self,
        owner: &UserId,
        contact: &UserId,
        nickname: Option<&str>,
    ) -> Result<ContactInfo> {
        if owner == contact {
            return Err(StoreError::InvalidInput(
                "cannot add yourself as a contact".into(),
            ));
        }
        if users::Entity::find_by_id(contact.as_str())
            .one(&self.db)
            .await?
            .is_none()
        {
            return Err(StoreError::UserNotFound(contact.clone()));
        }
        if self.find(owner, contact).await?.is_some() {
            return Err(StoreError::ContactExists {
                owner: owner.clone(),
                contact: contact.clone(),
            });
        }

        let now = self.clock.now_millis();
        let model = contacts::ActiveModel {
            owner_id: Set(owner.as_str().to_string()),
            contact_id: Set(contact.as_str().to_string()),
            nickname: Set(nickname.map(str::to_string)),
            blocked: Set(false),
            created_at: Set(now),
        };
        contacts::Entity::insert(model)
            .exec_without_returning(&self.db)
            .await?;

        debug!("Added contact: {} -> {}", owner, contact);

        Ok(ContactInfo {
            owner_id: owner.clone(),
            contact_id: contact.clone(),
            nickname: nickname.map(str::to_string),
            blocked: false,
            created_at: millis_to_datetime(now)?,
        })
    }

    async fn find(&self, owner: &UserId, contact: &UserId) -> Result<Option<contacts::Model>> {
        let model = contacts::Entity::find_by_id((
            owner.as_str().to_string(),
            contact.as_str().to_string(),
        ))
        .one(&self.db)
        .await?;

        Ok(model)
    }

    /// Get the contact record `owner -> contact`
    pub async fn get(&self, owner: &UserId, contact: &UserId) -> Result<Option<ContactInfo>> {
        self.find(owner, contact)
            .await?
            .map(ContactInfo::try_from)
            .transpose()
    }

    /// Unblocked contacts of `owner`, most recently added first
    pub async fn list(&self, owner: &UserId) -> Result<Vec<ContactInfo>> {
        let models = contacts::Entity::find()
            .filter(contacts::Column::OwnerId.eq(owner.as_str()))
            .filter(contacts::Column::Blocked.eq(false))
            .order_by_desc(contacts::Column::CreatedAt)
            .all(&self.db)
            .await?;

        models.into_iter().map(ContactInfo::try_from).collect()
    }

    /// Set or clear the block flag on `owner -> contact`
    pub async fn set_blocked(&self, owner: &UserId, contact: &UserId, blocked: bool) -> Result<()> {
        let result = contacts::Entity::update_many()
            .col_expr(contacts::Column::Blocked, Expr::value(blocked))
            .filter(contacts::Column::OwnerId.eq(owner.as_str()))
            .filter(contacts::Column::ContactId.eq(contact.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::ContactNotFound {
                owner: owner.clone(),
                contact: contact.clone(),
            });
        }

        info!("Contact {} -> {} blocked = {}", owner, contact, blocked);
        Ok(())
    }

    /// Change the nickname `owner` uses for `contact`
    pub async fn set_nickname(
        &self,
        owner: &UserId,
        contact: &UserId,
        nickname: Option<&str>,
    ) -> Result<()> {
        let result = contacts::Entity::update_many()
            .col_expr(
                contacts::Column::Nickname,
                Expr::value(nickname.map(str::to_string)),
            )
            .filter(contacts::Column::OwnerId.eq(owner.as_str()))
            .filter(contacts::Column::ContactId.eq(contact.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::ContactNotFound {
                owner: owner.clone(),
                contact: contact.clone(),
            });
        }

        Ok(())
    }

    /// Remove the contact record `owner -> contact`
    pub async fn remove(&self, owner: &UserId, contact: &UserId) -> Result<()> {
        let result = contacts::Entity::delete_many()
            .filter(contacts::Column::OwnerId.eq(owner.as_str()))
            .filter(contacts::Column::ContactId.eq(contact.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::ContactNotFound {
                owner: owner.clone(),
                contact: contact.clone(),
            });
        }

        debug!("Removed contact: {} -> {}", owner, contact);
        Ok(())
    }

    /// Relationship between two users, looking at both directions
    pub async fn status(&self, a: &UserId, b: &UserId) -> Result<ContactStatus> {
        let forward = self.find(a, b).await?;
        let backward = self.find(b, a).await?;

        let status = match (forward, backward) {
            (Some(f), _) if f.blocked => ContactStatus::Blocked,
            (_, Some(r)) if r.blocked => ContactStatus::Blocked,
            (Some(_), Some(_)) => ContactStatus::Mutual,
            _ => ContactStatus::None,
        };

        Ok(status)
    }
}
