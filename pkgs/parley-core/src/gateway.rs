//! Transport-facing gateway
//!
//! Authenticates a connection once at handshake, then turns each inbound
//! [`Request`] into exactly one [`Ack`]. Engine errors are reported in the
//! ack and never escape to the transport.

use parley_store::{UserDirectory, UserId};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::auth::Authenticator;
use crate::error::{ChatError, Result};
use crate::events::{Ack, MessagePayload, Request};
use crate::registry::{ConnectionId, Outbox};
use crate::rooms::RoomName;
use crate::service::ChatService;

/// An authenticated, registered connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub connection: ConnectionId,
    pub user: UserId,
}

/// Entry point for transports
#[derive(Clone)]
pub struct Gateway {
    service: Arc<ChatService>,
    auth: Arc<dyn Authenticator>,
    users: UserDirectory,
}

impl Gateway {
    pub fn new(service: Arc<ChatService>, auth: Arc<dyn Authenticator>) -> Self {
        let users = service.store().users();
        Self {
            service,
            auth,
            users,
        }
    }

    pub fn service(&self) -> &Arc<ChatService> {
        &self.service
    }

    /// Authenticate a new connection and register it.
    ///
    /// Any failure here means the transport must close the connection.
    #[instrument(skip(self, credential, outbox))]
    pub async fn connect(&self, credential: Option<&str>, outbox: Outbox) -> Result<Session> {
        let credential = credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ChatError::Unauthenticated("missing credential".into()))?;

        let user = match self.auth.authenticate(credential) {
            Ok(user) => user,
            Err(e) => {
                warn!("Rejected handshake: {}", e);
                return Err(e);
            }
        };
        if !self.users.exists(&user).await? {
            warn!("Rejected handshake for unknown user {}", user);
            return Err(ChatError::Unauthenticated(format!("unknown user {}", user)));
        }

        let hub = self.service.hub();
        let connection = hub.attach(outbox);
        if let Err(e) = hub.register(connection, &user) {
            hub.disconnect(connection);
            return Err(e);
        }

        if let Err(e) = self.users.touch_last_seen(&user).await {
            warn!("Failed to update last seen for {}: {}", user, e);
        }

        info!("Connection {} opened for {}", connection, user);
        Ok(Session { connection, user })
    }

    /// Tear down a session. Safe to call more than once.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, session: &Session) {
        if self.service.hub().disconnect(session.connection).is_some() {
            if let Err(e) = self.users.touch_last_seen(&session.user).await {
                warn!("Failed to update last seen for {}: {}", session.user, e);
            }
        }
    }

    /// Handle one inbound request
    #[instrument(skip(self, session, request), fields(user = %session.user, event = request.name()))]
    pub async fn handle(&self, session: &Session, request: Request) -> Ack {
        match self.dispatch(session, request).await {
            Ok(ack) => ack,
            Err(ChatError::Storage(e)) => {
                error!("Storage failure: {}", e);
                Ack::error(&ChatError::Storage(e))
            }
            Err(e) => {
                debug!("Request failed: {}", e);
                Ack::error(&e)
            }
        }
    }

    async fn dispatch(&self, session: &Session, request: Request) -> Result<Ack> {
        let user = &session.user;
        let connection = session.connection;

        let ack = match request {
            Request::SendMessage {
                receiver_id,
                content,
            } => {
                let message = self
                    .service
                    .send_direct(user, &receiver_id, &content)
                    .await?;
                Ack::ok(MessagePayload::from(&message))
            }
            Request::SendGroupMessage { group_id, content } => {
                let message = self.service.send_group(user, &group_id, &content).await?;
                Ack::ok(MessagePayload::from(&message))
            }
            Request::JoinRoom { user_id } => {
                self.require_self(user, &user_id)?;
                self.service
                    .hub()
                    .join(connection, RoomName::User(user_id))?;
                Ack::ok(())
            }
            Request::LeaveRoom { user_id } => {
                self.require_self(user, &user_id)?;
                self.service
                    .hub()
                    .leave(connection, &RoomName::User(user_id))?;
                Ack::ok(())
            }
            Request::JoinGroup { group_id } => {
                self.service.join_group(connection, user, &group_id).await?;
                Ack::ok(())
            }
            Request::LeaveGroup { group_id } => {
                self.service.leave_group(connection, &group_id)?;
                Ack::ok(())
            }
            Request::GetConversations => Ack::ok(self.service.list_conversations(user).await?),
            Request::GetUnreadCount => Ack::ok(self.service.unread_count(user).await?),
            Request::GetConversation { user_id } => {
                let messages = self.service.history(user, &user_id).await?;
                Ack::ok(messages.iter().map(MessagePayload::from).collect::<Vec<_>>())
            }
            Request::GetGroupMessages { group_id } => {
                let messages = self.service.group_messages(user, &group_id).await?;
                Ack::ok(messages.iter().map(MessagePayload::from).collect::<Vec<_>>())
            }
            Request::MarkAsRead { message_id } => {
                let message = self.service.mark_message_read(&message_id, user).await?;
                Ack::ok(MessagePayload::from(&message))
            }
            Request::MarkConversationRead { user_id } => {
                Ack::ok(self.service.mark_conversation_read(user, &user_id).await?)
            }
        };
        Ok(ack)
    }

    fn require_self(&self, user: &UserId, requested: &UserId) -> Result<()> {
        if user == requested {
            Ok(())
        } else {
            Err(ChatError::PermissionDenied(format!(
                "{} may not use the private room of {}",
                user, requested
            )))
        }
    }
}
