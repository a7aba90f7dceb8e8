//! User directory - the set of known user identities

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::MonotonicClock;
use crate::entities::users;
use crate::error::{Result, StoreError};
use crate::types::{millis_to_datetime, UserId};

/// User information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: UserId,
    pub username: String,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl TryFrom<users::Model> for UserInfo {
    type Error = StoreError;

    fn try_from(model: users::Model) -> Result<Self> {
        Ok(Self {
            id: UserId::new(model.id),
            username: model.username,
            avatar: model.avatar,
            created_at: millis_to_datetime(model.created_at)?,
            last_seen: model.last_seen.map(millis_to_datetime).transpose()?,
        })
    }
}

/// User directory
#[derive(Clone)]
pub struct UserDirectory {
    db: DatabaseConnection,
    clock: Arc<MonotonicClock>,
}

impl UserDirectory {
    pub fn new(db: DatabaseConnection, clock: Arc<MonotonicClock>) -> Self {
        Self { db, clock }
    }

    /// Register a new user
    pub async fn create(
        &self,
        id: &UserId,
        username: &str,
        avatar: Option<&str>,
    ) -> Result<UserInfo> {
        if id.is_empty() {
            return Err(StoreError::InvalidInput("user id must not be empty".into()));
        }
        if username.trim().is_empty() {
            return Err(StoreError::InvalidInput("username must not be empty".into()));
        }

        let now = self.clock.now_millis();
        let model = users::ActiveModel {
            id: Set(id.as_str().to_string()),
            username: Set(username.to_string()),
            avatar: Set(avatar.map(str::to_string)),
            created_at: Set(now),
            last_seen: Set(None),
        };
        users::Entity::insert(model)
            .exec_without_returning(&self.db)
            .await?;

        info!("Created user {} ({})", username, id);
        Ok(UserInfo {
            id: id.clone(),
            username: username.to_string(),
            avatar: avatar.map(str::to_string),
            created_at: millis_to_datetime(now)?,
            last_seen: None,
        })
    }

    /// Get a user by id
    pub async fn get(&self, id: &UserId) -> Result<Option<UserInfo>> {
        users::Entity::find_by_id(id.as_str())
            .one(&self.db)
            .await?
            .map(UserInfo::try_from)
            .transpose()
    }

    /// Check whether a user exists
    pub async fn exists(&self, id: &UserId) -> Result<bool> {
        let count = users::Entity::find()
            .filter(users::Column::Id.eq(id.as_str()))
            .count(&self.db)
            .await?;

        Ok(count > 0)
    }

    /// Get every user in `ids` that exists; unknown ids are skipped
    pub async fn find_many(&self, ids: &[UserId]) -> Result<Vec<UserInfo>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let models = users::Entity::find()
            .filter(users::Column::Id.is_in(ids.iter().map(UserId::as_str)))
            .all(&self.db)
            .await?;

        models.into_iter().map(UserInfo::try_from).collect()
    }

    /// Stamp the user's last-seen time
    pub async fn touch_last_seen(&self, id: &UserId) -> Result<()> {
        let model = users::Entity::find_by_id(id.as_str())
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::UserNotFound(id.clone()))?;

        let mut active_model: users::ActiveModel = model.into();
        active_model.last_seen = Set(Some(self.clock.now_millis()));
        active_model.update(&self.db).await?;

        debug!("Updated last seen for {}", id);
        Ok(())
    }
}
