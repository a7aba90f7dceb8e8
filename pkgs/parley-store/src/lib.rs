//! Parley Store - persistent storage for the Parley chat engine
//!
//! SQLite-backed storage built on Sea-ORM. It holds the durable side of the
//! chat system: users, the contact book, groups with their members, and the
//! message log with its read flags.
//!
//! # Architecture
//!
//! - **MessageStore**: the message log, history queries, read flags and the
//!   per-counterpart direct-message summary
//! - **UserDirectory**: known users and their last-seen stamps
//! - **ContactManager**: directed contact records with block flags
//! - **GroupManager**: groups, members and admins
//!
//! All managers share one connection and one [`MonotonicClock`], so every
//! timestamp the store writes is strictly increasing.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use parley_store::{MessageTarget, NewMessage, Store, StoreConfig, UserId};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::open(StoreConfig {
//!     db_path: "parley.db".into(),
//! })
//! .await?;
//!
//! let stored = store
//!     .messages()
//!     .insert(NewMessage {
//!         sender_id: UserId::from("alice"),
//!         target: MessageTarget::Direct(UserId::from("bob")),
//!         content: "Hello!".to_string(),
//!     })
//!     .await?;
//! println!("stored {} at {}", stored.id, stored.created_at);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod contact_manager;
pub mod entities;
pub mod error;
pub mod group_manager;
pub mod message_store;
pub mod migration;
pub mod types;
pub mod user_directory;

pub use clock::MonotonicClock;
pub use contact_manager::{ContactInfo, ContactManager};
pub use error::{Result, StoreError};
pub use group_manager::{GroupInfo, GroupManager};
pub use message_store::MessageStore;
pub use types::{
    ContactStatus, DirectSummary, GroupId, MessageId, MessageTarget, NewMessage, StoredMessage,
    UserId,
};
pub use user_directory::{UserDirectory, UserInfo};

use sea_orm::{Database, DatabaseConnection, EntityTrait, QueryOrder, QuerySelect};
use sea_orm_migration::MigratorTrait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::entities::{groups, messages, users};

/// Configuration for the persistence layer
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("parley.db"),
        }
    }
}

/// Handle to the database shared by every manager
#[derive(Clone)]
pub struct Store {
    db: DatabaseConnection,
    clock: Arc<MonotonicClock>,
}

impl Store {
    /// Open (creating if needed) the database described by `config`
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let db_path_str = config
            .db_path
            .to_str()
            .ok_or_else(|| StoreError::InvalidPath(config.db_path.clone()))?
            .replace('\\', "/");

        let db_url = format!("sqlite:{}?mode=rwc", db_path_str);
        let db = Database::connect(db_url.as_str()).await?;

        let store = Self::with_connection(db).await?;
        info!("Parley store initialized at {}", config.db_path.display());
        Ok(store)
    }

    /// Wrap an existing connection, running migrations first
    async fn with_connection(db: DatabaseConnection) -> Result<Self> {
        migration::Migrator::up(&db, None).await?;

        let floor = Self::newest_timestamp(&db).await?;
        Ok(Self {
            db,
            clock: Arc::new(MonotonicClock::starting_after(floor)),
        })
    }

    /// Newest timestamp already on disk so the clock never goes back after a restart
    async fn newest_timestamp(db: &DatabaseConnection) -> Result<i64> {
        let message: Option<i64> = messages::Entity::find()
            .select_only()
            .column(messages::Column::CreatedAt)
            .order_by_desc(messages::Column::CreatedAt)
            .into_tuple()
            .one(db)
            .await?;
        let group: Option<i64> = groups::Entity::find()
            .select_only()
            .column(groups::Column::CreatedAt)
            .order_by_desc(groups::Column::CreatedAt)
            .into_tuple()
            .one(db)
            .await?;
        let user: Option<i64> = users::Entity::find()
            .select_only()
            .column(users::Column::CreatedAt)
            .order_by_desc(users::Column::CreatedAt)
            .into_tuple()
            .one(db)
            .await?;

        Ok([message, group, user]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(0))
    }

    pub fn messages(&self) -> MessageStore {
        MessageStore::new(self.db.clone(), self.clock.clone())
    }

    pub fn users(&self) -> UserDirectory {
        UserDirectory::new(self.db.clone(), self.clock.clone())
    }

    pub fn contacts(&self) -> ContactManager {
        ContactManager::new(self.db.clone(), self.clock.clone())
    }

    pub fn groups(&self) -> GroupManager {
        GroupManager::new(self.db.clone(), self.clock.clone())
    }
}
