//! Message store - the durable message log

use sea_orm::sea_query::{Condition, Expr};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbBackend, EntityTrait, FromQueryResult,
    PaginatorTrait, QueryFilter, QueryOrder, Set, Statement, Value,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::MonotonicClock;
use crate::entities::messages;
use crate::error::{Result, StoreError};
use crate::types::{
    millis_to_datetime, DirectSummary, GroupId, MessageId, MessageTarget, NewMessage,
    StoredMessage, UserId,
};

impl TryFrom<messages::Model> for StoredMessage {
    type Error = StoreError;

    fn try_from(model: messages::Model) -> Result<Self> {
        let target = MessageTarget::from_columns(model.receiver_id, model.group_id).ok_or_else(
            || {
                StoreError::CorruptRecord(format!(
                    "message {} must have exactly one of receiver or group",
                    model.id
                ))
            },
        )?;

        Ok(Self {
            id: MessageId::new(model.id),
            sender_id: UserId::new(model.sender_id),
            target,
            content: model.content,
            created_at: millis_to_datetime(model.created_at)?,
            is_read: model.is_read,
            read_at: model.read_at.map(millis_to_datetime).transpose()?,
        })
    }
}

fn convert_all(models: Vec<messages::Model>) -> Result<Vec<StoredMessage>> {
    models.into_iter().map(StoredMessage::try_from).collect()
}

/// Every direct message between `a` and `b`, in either direction
fn between(a: &UserId, b: &UserId) -> Condition {
    Condition::any()
        .add(
            Condition::all()
                .add(messages::Column::SenderId.eq(a.as_str()))
                .add(messages::Column::ReceiverId.eq(b.as_str())),
        )
        .add(
            Condition::all()
                .add(messages::Column::SenderId.eq(b.as_str()))
                .add(messages::Column::ReceiverId.eq(a.as_str())),
        )
}

const DIRECT_SUMMARY_SQL: &str = r#"
WITH direct AS (
    SELECT content, created_at, receiver_id, is_read,
           CASE WHEN sender_id = ? THEN receiver_id ELSE sender_id END AS counterpart_id
    FROM messages
    WHERE receiver_id IS NOT NULL AND (sender_id = ? OR receiver_id = ?)
),
latest AS (
    SELECT counterpart_id,
           MAX(created_at) AS last_at,
           SUM(CASE WHEN receiver_id = ? AND is_read = 0 THEN 1 ELSE 0 END) AS unread_count
    FROM direct
    GROUP BY counterpart_id
)
SELECT latest.counterpart_id AS counterpart_id,
       direct.content AS last_content,
       latest.last_at AS last_at,
       latest.unread_count AS unread_count
FROM latest
JOIN direct
  ON direct.counterpart_id = latest.counterpart_id
 AND direct.created_at = latest.last_at
ORDER BY latest.last_at DESC
"#;

#[derive(Debug, FromQueryResult)]
struct SummaryRow {
    counterpart_id: String,
    last_content: String,
    last_at: i64,
    unread_count: i64,
}

/// Message store - manages persistent message storage
#[derive(Clone)]
pub struct MessageStore {
    db: DatabaseConnection,
    clock: Arc<MonotonicClock>,
}

impl MessageStore {
    pub fn new(db: DatabaseConnection, clock: Arc<MonotonicClock>) -> Self {
        Self { db, clock }
    }

    /// Persist a new message, assigning its id and creation timestamp
    pub async fn insert(&self, message: NewMessage) -> Result<StoredMessage> {
        let id = MessageId::generate();
        let created_at = self.clock.now_millis();
        let (receiver_id, group_id) = message.target.clone().into_columns();

        let model = messages::ActiveModel {
            id: Set(id.as_str().to_string()),
            sender_id: Set(message.sender_id.as_str().to_string()),
            receiver_id: Set(receiver_id),
            group_id: Set(group_id),
            content: Set(message.content.clone()),
            created_at: Set(created_at),
            is_read: Set(false),
            read_at: Set(None),
        };
        messages::Entity::insert(model)
            .exec_without_returning(&self.db)
            .await?;

        debug!("Stored message {} from {}", id, message.sender_id);

        Ok(StoredMessage {
            id,
            sender_id: message.sender_id,
            target: message.target,
            content: message.content,
            created_at: millis_to_datetime(created_at)?,
            is_read: false,
            read_at: None,
        })
    }

    /// Get a message by id
    pub async fn get(&self, id: &MessageId) -> Result<Option<StoredMessage>> {
        messages::Entity::find_by_id(id.as_str())
            .one(&self.db)
            .await?
            .map(StoredMessage::try_from)
            .transpose()
    }

    /// Direct messages exchanged between two users, oldest first
    pub async fn direct_history(&self, a: &UserId, b: &UserId) -> Result<Vec<StoredMessage>> {
        let models = messages::Entity::find()
            .filter(between(a, b))
            .order_by_asc(messages::Column::CreatedAt)
            .order_by_asc(messages::Column::Id)
            .all(&self.db)
            .await?;

        convert_all(models)
    }

    /// Messages posted to a group, oldest first
    pub async fn group_history(&self, group_id: &GroupId) -> Result<Vec<StoredMessage>> {
        let models = messages::Entity::find()
            .filter(messages::Column::GroupId.eq(group_id.as_str()))
            .order_by_asc(messages::Column::CreatedAt)
            .order_by_asc(messages::Column::Id)
            .all(&self.db)
            .await?;

        convert_all(models)
    }

    /// Most recent message posted to a group, if any
    pub async fn latest_group_message(&self, group_id: &GroupId) -> Result<Option<StoredMessage>> {
        messages::Entity::find()
            .filter(messages::Column::GroupId.eq(group_id.as_str()))
            .order_by_desc(messages::Column::CreatedAt)
            .one(&self.db)
            .await?
            .map(StoredMessage::try_from)
            .transpose()
    }

    /// Most recent direct message between two users, if any
    pub async fn latest_direct(&self, a: &UserId, b: &UserId) -> Result<Option<StoredMessage>> {
        messages::Entity::find()
            .filter(between(a, b))
            .order_by_desc(messages::Column::CreatedAt)
            .one(&self.db)
            .await?
            .map(StoredMessage::try_from)
            .transpose()
    }

    /// Flip the read flag of one message.
    ///
    /// Returns `true` only on the false -> true transition; the read timestamp
    /// is stamped exactly once.
    pub async fn mark_read(&self, id: &MessageId) -> Result<bool> {
        let now = self.clock.now_millis();
        let result = messages::Entity::update_many()
            .col_expr(messages::Column::IsRead, Expr::value(true))
            .col_expr(messages::Column::ReadAt, Expr::value(now))
            .filter(messages::Column::Id.eq(id.as_str()))
            .filter(messages::Column::IsRead.eq(false))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Mark every unread message from `counterpart` to `reader` as read
    pub async fn mark_conversation_read(
        &self,
        reader: &UserId,
        counterpart: &UserId,
    ) -> Result<u64> {
        let now = self.clock.now_millis();
        let result = messages::Entity::update_many()
            .col_expr(messages::Column::IsRead, Expr::value(true))
            .col_expr(messages::Column::ReadAt, Expr::value(now))
            .filter(messages::Column::SenderId.eq(counterpart.as_str()))
            .filter(messages::Column::ReceiverId.eq(reader.as_str()))
            .filter(messages::Column::IsRead.eq(false))
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            info!(
                "Marked {} messages from {} to {} as read",
                result.rows_affected, counterpart, reader
            );
        }
        Ok(result.rows_affected)
    }

    /// Unread direct messages addressed to `user`
    pub async fn unread_count(&self, user: &UserId) -> Result<u64> {
        let count = messages::Entity::find()
            .filter(messages::Column::ReceiverId.eq(user.as_str()))
            .filter(messages::Column::IsRead.eq(false))
            .count(&self.db)
            .await?;

        Ok(count)
    }

    /// Unread direct messages from `counterpart` to `reader`
    pub async fn unread_from(&self, reader: &UserId, counterpart: &UserId) -> Result<u64> {
        let count = messages::Entity::find()
            .filter(messages::Column::SenderId.eq(counterpart.as_str()))
            .filter(messages::Column::ReceiverId.eq(reader.as_str()))
            .filter(messages::Column::IsRead.eq(false))
            .count(&self.db)
            .await?;

        Ok(count)
    }

    /// One summary per direct-message counterpart of `user`, newest first
    pub async fn direct_summaries(&self, user: &UserId) -> Result<Vec<DirectSummary>> {
        let uid = user.as_str();
        let rows = SummaryRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Sqlite,
            DIRECT_SUMMARY_SQL,
            vec![Value::from(uid); 4],
        ))
        .all(&self.db)
        .await?;

        let mut seen = HashSet::new();
        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            if !seen.insert(row.counterpart_id.clone()) {
                continue;
            }
            summaries.push(DirectSummary {
                counterpart_id: UserId::new(row.counterpart_id),
                last_content: row.last_content,
                last_at: millis_to_datetime(row.last_at)?,
                unread_count: u64::try_from(row.unread_count).unwrap_or(0),
            });
        }

        debug!("Found {} direct conversations for {}", summaries.len(), user);
        Ok(summaries)
    }
}
