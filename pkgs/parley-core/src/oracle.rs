//! Membership oracle
//!
//! The engine never re-implements contact or group rules. It asks an oracle,
//! which in production is backed by the store's contact and group managers.

use async_trait::async_trait;
use parley_store::{ContactManager, ContactStatus, GroupId, GroupManager, Store, UserId};

use crate::error::Result;

/// Answers relationship questions about users and groups
#[async_trait]
pub trait MembershipOracle: Send + Sync {
    /// Relationship between `a` and `b`; blocked is reported apart from absent
    async fn contact_status(&self, a: &UserId, b: &UserId) -> Result<ContactStatus>;

    async fn is_group_member(&self, user: &UserId, group: &GroupId) -> Result<bool>;

    async fn is_group_admin(&self, user: &UserId, group: &GroupId) -> Result<bool>;
}

/// Oracle backed by the persistent contact book and group tables
#[derive(Clone)]
pub struct StoreOracle {
    contacts: ContactManager,
    groups: GroupManager,
}

impl StoreOracle {
    pub fn new(store: &Store) -> Self {
        Self {
            contacts: store.contacts(),
            groups: store.groups(),
        }
    }
}

#[async_trait]
impl MembershipOracle for StoreOracle {
    async fn contact_status(&self, a: &UserId, b: &UserId) -> Result<ContactStatus> {
        Ok(self.contacts.status(a, b).await?)
    }

    async fn is_group_member(&self, user: &UserId, group: &GroupId) -> Result<bool> {
        Ok(self.groups.is_member(group, user).await?)
    }

    async fn is_group_admin(&self, user: &UserId, group: &GroupId) -> Result<bool> {
        Ok(self.groups.is_admin(group, user).await?)
    }
}
