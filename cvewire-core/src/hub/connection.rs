//! Connection identity and the hub's handle onto a connection's queue.

use crate::events::{Outbound, OutboundSender};
use cvewire_sdk::objects::{Identity, Role};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Unique id of a live connection (UUIDv7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The hub's owning reference to a connection.
///
/// Holds the only sender of the connection's outbound queue, so dropping
/// the handle closes the queue and tells the write loop to exit.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    user_id: Uuid,
    role: Role,
    expires_at: OffsetDateTime,
    sender: OutboundSender,
}

/// Result of a non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Sent,
    /// Queue full; the message was dropped for this connection only.
    Dropped,
    /// The write loop is gone.
    Closed,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, identity: &Identity, sender: OutboundSender) -> Self {
        Self {
            id,
            user_id: identity.user_id,
            role: identity.role,
            expires_at: identity.expires_at,
            sender,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn expires_at(&self) -> OffsetDateTime {
        self.expires_at
    }

    pub(crate) fn try_deliver(&self, message: &Outbound) -> Delivery {
        match self.sender.try_send(Arc::clone(message)) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}
