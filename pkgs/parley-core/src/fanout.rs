//! Delivery fanout
//!
//! Best-effort push of a persisted message to whoever is connected right
//! now. There is no queue: recipients that are offline pick the message up
//! later through history queries.

use parley_store::{GroupManager, MessageTarget, Store, StoredMessage};
use std::sync::Arc;
use tracing::{debug, error};

use crate::events::{MessagePayload, ServerEvent};
use crate::hub::{push_all, DeliveryReport, Hub};

/// Pushes stored messages to live connections
#[derive(Clone)]
pub struct DeliveryFanout {
    hub: Arc<Hub>,
    groups: GroupManager,
}

impl DeliveryFanout {
    pub fn new(hub: Arc<Hub>, store: &Store) -> Self {
        Self {
            hub,
            groups: store.groups(),
        }
    }

    /// Push `message` to its live recipients.
    ///
    /// Direct messages go to every connection of the receiver. Group
    /// messages go to every connection joined to the group's room whose user
    /// is still a member when the message is pushed. A failed push is
    /// counted and skipped.
    pub async fn deliver(&self, message: &StoredMessage) -> DeliveryReport {
        let payload = MessagePayload::from(message);
        let (targets, event) = match &message.target {
            MessageTarget::Direct(receiver) => (
                self.hub.user_outboxes(receiver),
                ServerEvent::NewMessage(payload),
            ),
            MessageTarget::Group(group) => {
                let info = match self.groups.get(group).await {
                    Ok(Some(info)) => info,
                    Ok(None) => {
                        debug!("Group {} is gone, not pushing {}", group, message.id);
                        return DeliveryReport::default();
                    }
                    Err(e) => {
                        // Stored already; members still see it in history
                        error!("Failed to load members of {}: {}", group, e);
                        return DeliveryReport::default();
                    }
                };
                (
                    self.hub.group_outboxes(group, |user| info.has_member(user)),
                    ServerEvent::NewGroupMessage(payload),
                )
            }
        };

        if targets.is_empty() {
            debug!("No live recipients for message {}", message.id);
            return DeliveryReport::default();
        }

        let report = push_all(targets, &event);
        debug!(
            "Message {} pushed to {} connections ({} skipped)",
            message.id, report.pushed, report.skipped
        );
        report
    }
}
