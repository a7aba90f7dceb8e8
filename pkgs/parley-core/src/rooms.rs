//! Room router
//!
//! Topic subscriptions layered on top of the connection registry. Two kinds
//! of rooms exist: a private room per user (`user:<id>`) and a broadcast room
//! per group (`group:<id>`). Empty rooms are dropped.

use parley_store::{GroupId, UserId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::registry::ConnectionId;

/// Name of a room
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoomName {
    User(UserId),
    Group(GroupId),
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomName::User(id) => write!(f, "user:{}", id),
            RoomName::Group(id) => write!(f, "group:{}", id),
        }
    }
}

/// Room membership tables
#[derive(Default)]
pub struct RoomRouter {
    rooms: HashMap<RoomName, BTreeSet<ConnectionId>>,
    memberships: HashMap<ConnectionId, BTreeSet<RoomName>>,
}

impl RoomRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `connection` to `room`. Returns `false` if it was already there.
    pub fn join(&mut self, connection: ConnectionId, room: RoomName) -> bool {
        let added = self
            .rooms
            .entry(room.clone())
            .or_default()
            .insert(connection);
        if added {
            self.memberships.entry(connection).or_default().insert(room);
        }
        added
    }

    /// Remove `connection` from `room`. Returns `false` if it was not there.
    pub fn leave(&mut self, connection: ConnectionId, room: &RoomName) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(&connection);
        if members.is_empty() {
            self.rooms.remove(room);
        }

        if removed {
            if let Some(rooms) = self.memberships.get_mut(&connection) {
                rooms.remove(room);
                if rooms.is_empty() {
                    self.memberships.remove(&connection);
                }
            }
        }
        removed
    }

    /// Remove `connection` from every room it joined, returning those rooms
    pub fn leave_all(&mut self, connection: ConnectionId) -> Vec<RoomName> {
        let rooms = self.memberships.remove(&connection).unwrap_or_default();
        for room in &rooms {
            if let Some(members) = self.rooms.get_mut(room) {
                members.remove(&connection);
                if members.is_empty() {
                    self.rooms.remove(room);
                }
            }
        }
        rooms.into_iter().collect()
    }

    pub fn members_of(&self, room: &RoomName) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn rooms_of(&self, connection: ConnectionId) -> Vec<RoomName> {
        self.memberships
            .get(&connection)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, connection: ConnectionId, room: &RoomName) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|members| members.contains(&connection))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
