//! Presence hub
//!
//! Owns the [`ConnectionRegistry`] and the [`RoomRouter`] behind a single lock
//! so that registering, joining, leaving and disconnecting are atomic with
//! respect to each other. Outboxes are snapshotted under the lock and pushes
//! happen after it is released; a connection that vanishes in between is
//! simply skipped because its channel is closed.

use parking_lot::Mutex;
use parley_store::{GroupId, UserId};
use tracing::{debug, info, warn};

use crate::error::{ChatError, Result};
use crate::events::ServerEvent;
use crate::registry::{ConnectionId, ConnectionRegistry, Departure, Outbox};
use crate::rooms::{RoomName, RoomRouter};

#[derive(Default)]
struct HubState {
    registry: ConnectionRegistry,
    rooms: RoomRouter,
}

/// Outcome of pushing one event to a set of connections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub pushed: usize,
    pub skipped: usize,
}

/// Push `event` to every target, isolating per-connection failures
pub(crate) fn push_all(targets: Vec<(ConnectionId, Outbox)>, event: &ServerEvent) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    for (connection, outbox) in targets {
        match outbox.unbounded_send(event.clone()) {
            Ok(()) => report.pushed += 1,
            Err(_) => {
                debug!("Skipping closed connection {}", connection);
                report.skipped += 1;
            }
        }
    }
    report
}

/// Shared connection and room state
#[derive(Default)]
pub struct Hub {
    state: Mutex<HubState>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly opened connection
    pub fn attach(&self, outbox: Outbox) -> ConnectionId {
        let connection = self.state.lock().registry.attach(outbox);
        debug!("Attached {}", connection);
        connection
    }

    /// Bind `connection` to `user`, join the user's private room and
    /// announce the user to every other authenticated connection
    pub fn register(&self, connection: ConnectionId, user: &UserId) -> Result<()> {
        let targets = {
            let mut state = self.state.lock();
            state.registry.register(connection, user.clone())?;
            state.rooms.join(connection, RoomName::User(user.clone()));
            let others = state.registry.authenticated_except(connection);
            Self::outboxes(&state, others)
        };

        info!("{} registered as {}", connection, user);
        push_all(
            targets,
            &ServerEvent::UserOnline {
                user_id: user.clone(),
            },
        );
        Ok(())
    }

    /// Destroy a connection: drop its registry entry and every room
    /// membership in one step. Idempotent.
    pub fn disconnect(&self, connection: ConnectionId) -> Option<Departure> {
        let (departure, targets) = {
            let mut state = self.state.lock();
            let rooms = state.rooms.leave_all(connection);
            let departure = state.registry.unregister(connection);
            if rooms.is_empty() && departure.is_none() {
                debug!("Disconnect for unknown {}", connection);
            }

            let targets = match &departure {
                Some(d) if d.went_offline => {
                    let others = state.registry.authenticated_except(connection);
                    Self::outboxes(&state, others)
                }
                _ => Vec::new(),
            };
            (departure, targets)
        };

        if let Some(d) = &departure {
            info!("{} disconnected ({})", connection, d.user);
            if d.went_offline {
                push_all(
                    targets,
                    &ServerEvent::UserOffline {
                        user_id: d.user.clone(),
                    },
                );
            }
        }
        departure
    }

    fn outboxes(state: &HubState, connections: Vec<ConnectionId>) -> Vec<(ConnectionId, Outbox)> {
        connections
            .into_iter()
            .filter_map(|c| state.registry.outbox(c).map(|o| (c, o.clone())))
            .collect()
    }

    fn require_user(state: &HubState, connection: ConnectionId) -> Result<UserId> {
        state
            .registry
            .user_of(connection)
            .cloned()
            .ok_or_else(|| ChatError::Unauthenticated(format!("{} is not registered", connection)))
    }

    /// Join a room. Returns whether membership changed.
    ///
    /// Joining a group room announces the joiner to every occupant,
    /// the joiner included.
    pub fn join(&self, connection: ConnectionId, room: RoomName) -> Result<bool> {
        let (user, changed, targets) = {
            let mut state = self.state.lock();
            let user = Self::require_user(&state, connection)?;
            let changed = state.rooms.join(connection, room.clone());
            let targets = match (&room, changed) {
                (RoomName::Group(_), true) => {
                    let occupants = state.rooms.members_of(&room);
                    Self::outboxes(&state, occupants)
                }
                _ => Vec::new(),
            };
            (user, changed, targets)
        };

        debug!("{} joined {} (changed: {})", connection, room, changed);
        if let RoomName::Group(group_id) = room {
            if changed {
                push_all(
                    targets,
                    &ServerEvent::UserJoinedGroup {
                        user_id: user,
                        group_id,
                    },
                );
            }
        }
        Ok(changed)
    }

    /// Leave a room. Returns whether membership changed.
    ///
    /// Leaving a group room announces the departure to the remaining occupants.
    pub fn leave(&self, connection: ConnectionId, room: &RoomName) -> Result<bool> {
        let (user, changed, targets) = {
            let mut state = self.state.lock();
            let user = Self::require_user(&state, connection)?;
            let changed = state.rooms.leave(connection, room);
            let targets = match (room, changed) {
                (RoomName::Group(_), true) => {
                    let occupants = state.rooms.members_of(room);
                    Self::outboxes(&state, occupants)
                }
                _ => Vec::new(),
            };
            (user, changed, targets)
        };

        debug!("{} left {} (changed: {})", connection, room, changed);
        if let RoomName::Group(group_id) = room {
            if changed {
                push_all(
                    targets,
                    &ServerEvent::UserLeftGroup {
                        user_id: user,
                        group_id: group_id.clone(),
                    },
                );
            }
        }
        Ok(changed)
    }

    /// Snapshot of the outboxes of every live connection of `user`
    pub fn user_outboxes(&self, user: &UserId) -> Vec<(ConnectionId, Outbox)> {
        let state = self.state.lock();
        let connections = state.registry.resolve(user);
        Self::outboxes(&state, connections)
    }

    /// Snapshot of the outboxes of every connection joined to `group_id`'s
    /// room whose user passes `allowed`
    pub fn group_outboxes<F>(&self, group_id: &GroupId, allowed: F) -> Vec<(ConnectionId, Outbox)>
    where
        F: Fn(&UserId) -> bool,
    {
        let state = self.state.lock();
        let connections: Vec<ConnectionId> = state
            .rooms
            .members_of(&RoomName::Group(group_id.clone()))
            .into_iter()
            .filter(|c| match state.registry.user_of(*c) {
                Some(user) if allowed(user) => true,
                Some(user) => {
                    warn!("{} is in group room {} but no longer a member", user, group_id);
                    false
                }
                None => false,
            })
            .collect();
        Self::outboxes(&state, connections)
    }

    pub fn resolve(&self, user: &UserId) -> Vec<ConnectionId> {
        self.state.lock().registry.resolve(user)
    }

    pub fn is_online(&self, user: &UserId) -> bool {
        self.state.lock().registry.is_online(user)
    }

    pub fn user_of(&self, connection: ConnectionId) -> Option<UserId> {
        self.state.lock().registry.user_of(connection).cloned()
    }

    pub fn members_of(&self, room: &RoomName) -> Vec<ConnectionId> {
        self.state.lock().rooms.members_of(room)
    }

    pub fn rooms_of(&self, connection: ConnectionId) -> Vec<RoomName> {
        self.state.lock().rooms.rooms_of(connection)
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().registry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;

    type Inbox = mpsc::UnboundedReceiver<ServerEvent>;

    fn connect(hub: &Hub, user: &str) -> (ConnectionId, Inbox) {
        let (tx, rx) = mpsc::unbounded();
        let conn = hub.attach(tx);
        hub.register(conn, &UserId::from(user)).unwrap();
        (conn, rx)
    }

    fn drain(inbox: &mut Inbox) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = inbox.try_next() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_register_announces_to_others_only() {
        let hub = Hub::new();
        let (_a, mut alice_inbox) = connect(&hub, "alice");
        let (_b, mut bob_inbox) = connect(&hub, "bob");

        assert_eq!(
            drain(&mut alice_inbox),
            vec![ServerEvent::UserOnline {
                user_id: UserId::from("bob")
            }]
        );
        assert!(drain(&mut bob_inbox).is_empty());
    }

    #[test]
    fn test_offline_only_when_last_connection_closes() {
        let hub = Hub::new();
        let (_a, mut alice_inbox) = connect(&hub, "alice");
        let (phone, _phone_inbox) = connect(&hub, "bob");
        let (laptop, _laptop_inbox) = connect(&hub, "bob");
        drain(&mut alice_inbox);

        let departure = hub.disconnect(phone).unwrap();
        assert!(!departure.went_offline);
        assert!(drain(&mut alice_inbox).is_empty());

        let departure = hub.disconnect(laptop).unwrap();
        assert!(departure.went_offline);
        assert_eq!(
            drain(&mut alice_inbox),
            vec![ServerEvent::UserOffline {
                user_id: UserId::from("bob")
            }]
        );

        assert!(hub.disconnect(laptop).is_none());
    }

    #[test]
    fn test_disconnect_removes_room_memberships() {
        let hub = Hub::new();
        let (alice, _inbox) = connect(&hub, "alice");
        let room = RoomName::Group(GroupId::from("g1"));

        hub.join(alice, room.clone()).unwrap();
        assert_eq!(hub.members_of(&room), vec![alice]);
        assert_eq!(
            hub.members_of(&RoomName::User(UserId::from("alice"))),
            vec![alice]
        );

        hub.disconnect(alice);
        assert!(hub.members_of(&room).is_empty());
        assert!(hub
            .members_of(&RoomName::User(UserId::from("alice")))
            .is_empty());
        assert!(hub.rooms_of(alice).is_empty());
    }

    #[test]
    fn test_group_join_and_leave_notifications() {
        let hub = Hub::new();
        let (alice, mut alice_inbox) = connect(&hub, "alice");
        let (bob, mut bob_inbox) = connect(&hub, "bob");
        drain(&mut alice_inbox);
        let room = RoomName::Group(GroupId::from("g1"));

        assert!(hub.join(alice, room.clone()).unwrap());
        let joined = ServerEvent::UserJoinedGroup {
            user_id: UserId::from("alice"),
            group_id: GroupId::from("g1"),
        };
        assert_eq!(drain(&mut alice_inbox), vec![joined]);

        hub.join(bob, room.clone()).unwrap();
        assert_eq!(drain(&mut alice_inbox).len(), 1);
        assert_eq!(drain(&mut bob_inbox).len(), 1);

        // Re-joining is a silent no-op
        assert!(!hub.join(bob, room.clone()).unwrap());
        assert!(drain(&mut alice_inbox).is_empty());

        assert!(hub.leave(bob, &room).unwrap());
        assert_eq!(
            drain(&mut alice_inbox),
            vec![ServerEvent::UserLeftGroup {
                user_id: UserId::from("bob"),
                group_id: GroupId::from("g1"),
            }]
        );
        assert!(drain(&mut bob_inbox).is_empty());
        assert!(!hub.leave(bob, &room).unwrap());
    }

    #[test]
    fn test_join_requires_registration() {
        let hub = Hub::new();
        let (tx, _rx) = mpsc::unbounded();
        let conn = hub.attach(tx);

        let err = hub
            .join(conn, RoomName::Group(GroupId::from("g1")))
            .unwrap_err();
        assert!(matches!(err, ChatError::Unauthenticated(_)));
    }

    #[test]
    fn test_push_skips_closed_connections() {
        let hub = Hub::new();
        let (_laptop, laptop_inbox) = connect(&hub, "alice");
        let (_phone, mut phone_inbox) = connect(&hub, "alice");
        drop(laptop_inbox);

        let report = push_all(
            hub.user_outboxes(&UserId::from("alice")),
            &ServerEvent::UserOnline {
                user_id: UserId::from("bob"),
            },
        );
        assert_eq!(report, DeliveryReport { pushed: 1, skipped: 1 });
        assert_eq!(drain(&mut phone_inbox).len(), 1);
    }
}
