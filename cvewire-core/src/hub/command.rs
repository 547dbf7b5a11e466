use super::connection::{ConnectionHandle, ConnectionId};
use super::HubError;
use crate::events::Outbound;
use cvewire_sdk::objects::Channel;
use tokio::sync::oneshot;
use uuid::Uuid;

/// A request processed by the hub loop, in arrival order.
#[derive(Debug)]
pub enum HubCommand {
    Register {
        handle: ConnectionHandle,
        reply: oneshot::Sender<Result<(), HubError>>,
    },
    Unregister {
        id: ConnectionId,
    },
    /// `channel` is validated by the hub, not by the sender.
    Subscribe {
        id: ConnectionId,
        channel: String,
        reply: oneshot::Sender<Result<Channel, HubError>>,
    },
    Unsubscribe {
        id: ConnectionId,
        channel: String,
        reply: oneshot::Sender<Result<Channel, HubError>>,
    },
    /// Fan out to the union of the channels' subscribers, once per
    /// connection.
    Broadcast {
        channels: Vec<Channel>,
        message: Outbound,
    },
    SendToUser {
        user_id: Uuid,
        message: Outbound,
    },
    SendToConnection {
        id: ConnectionId,
        message: Outbound,
    },
}
