//! Connection registry
//!
//! In-memory mapping between live connections and the users they belong to.
//! It is the only source of truth for presence: nothing here is persisted and
//! the whole table is rebuilt as clients reconnect after a restart.
//!
//! # Data Structures
//!
//! - **connections**: HashMap<ConnectionId, Connection> - lookup by connection
//! - **by_user**: HashMap<UserId, BTreeSet<ConnectionId>> - lookup by user
//!
//! A user may hold several connections at once (one per device).

use futures::channel::mpsc;
use parley_store::UserId;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::error::{ChatError, Result};
use crate::events::ServerEvent;

/// Channel used to push events to one connection
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

/// Handle for a live transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

struct Connection {
    user: Option<UserId>,
    outbox: Outbox,
}

/// Result of removing a connection that had been registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub user: UserId,
    /// The user has no live connection left
    pub went_offline: bool,
}

/// Connection registry
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    by_user: HashMap<UserId, BTreeSet<ConnectionId>>,
    next_id: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly opened, not yet authenticated connection
    pub fn attach(&mut self, outbox: Outbox) -> ConnectionId {
        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        self.connections.insert(id, Connection { user: None, outbox });
        id
    }

    /// Bind an attached connection to the user it authenticated as
    pub fn register(&mut self, connection: ConnectionId, user: UserId) -> Result<()> {
        let entry = self
            .connections
            .get_mut(&connection)
            .ok_or_else(|| ChatError::InvalidState(format!("unknown connection {}", connection)))?;

        if let Some(existing) = &entry.user {
            return Err(ChatError::InvalidState(format!(
                "connection {} is already registered to {}",
                connection, existing
            )));
        }

        entry.user = Some(user.clone());
        self.by_user.entry(user).or_default().insert(connection);
        Ok(())
    }

    /// Remove a connection. Unknown connections are ignored.
    ///
    /// Returns the departing user when the connection had been registered.
    pub fn unregister(&mut self, connection: ConnectionId) -> Option<Departure> {
        let user = self.connections.remove(&connection)?.user?;

        let went_offline = match self.by_user.get_mut(&user) {
            Some(set) => {
                set.remove(&connection);
                set.is_empty()
            }
            None => true,
        };
        if went_offline {
            self.by_user.remove(&user);
        }

        Some(Departure { user, went_offline })
    }

    /// Every live connection of `user`, in connection order
    pub fn resolve(&self, user: &UserId) -> Vec<ConnectionId> {
        self.by_user
            .get(user)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_online(&self, user: &UserId) -> bool {
        !self.resolve(user).is_empty()
    }

    pub fn user_of(&self, connection: ConnectionId) -> Option<&UserId> {
        self.connections.get(&connection)?.user.as_ref()
    }

    pub fn contains(&self, connection: ConnectionId) -> bool {
        self.connections.contains_key(&connection)
    }

    pub fn outbox(&self, connection: ConnectionId) -> Option<&Outbox> {
        self.connections.get(&connection).map(|c| &c.outbox)
    }

    /// Registered connections other than `except`
    pub fn authenticated_except(&self, except: ConnectionId) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|(id, c)| **id != except && c.user.is_some())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
