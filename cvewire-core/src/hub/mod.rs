//! The hub: connection registry and message router.
//!
//! All registry mutations are serialized through one task. Producers talk
//! to it through a cloneable [`HubHandle`], which enqueues [`HubCommand`]s
//! on a bounded queue:
//!
//! ```text
//! Session ──register/subscribe──► ┌─────┐ ──try_send──► outbound queue ──► write loop
//! Notifier ──broadcast──────────► │ Hub │
//! Matcher ──send_to_user────────► └─────┘
//! ```
//!
//! Delivery into a connection's outbound queue never blocks. A full queue
//! drops the message for that connection only.

mod command;
mod connection;
mod registry;
mod stats;

pub use command::HubCommand;
pub use connection::{ConnectionHandle, ConnectionId};

use crate::config::{ConfigStore, HubConfig};
use crate::events::{HubCommandReceiver, HubCommandSender, Outbound, hub_command_channel};
use cvewire_sdk::objects::{
    Channel, ChannelError, ChannelPayload, ConnectedPayload, Envelope, ErrorCode, HubStats,
    MessageType,
};
use registry::{FanOut, Registry};
use stats::HubCounters;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Errors returned by hub operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("user already holds the maximum of {limit} connections")]
    ConnectionLimitExceeded { limit: usize },

    #[error("connection already holds the maximum of {limit} subscriptions")]
    SubscriptionLimitExceeded { limit: usize },

    #[error(transparent)]
    InvalidChannel(#[from] ChannelError),

    /// `alerts:user` is delivered per user, never broadcast.
    #[error("channel {0} cannot be broadcast to")]
    UserScopedChannel(Channel),

    #[error("connection is not registered")]
    UnknownConnection,

    #[error("connection is already registered")]
    AlreadyRegistered,

    #[error("failed to encode envelope: {0}")]
    Encode(String),

    /// The hub loop has stopped.
    #[error("hub is not running")]
    HubClosed,
}

impl HubError {
    /// Error code reported to the client in an `error` envelope.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            HubError::ConnectionLimitExceeded { .. } => ErrorCode::MaxConnections,
            HubError::SubscriptionLimitExceeded { .. } => ErrorCode::SubscriptionLimit,
            HubError::InvalidChannel(_) | HubError::UserScopedChannel(_) => {
                ErrorCode::InvalidChannel
            }
            HubError::UnknownConnection
            | HubError::AlreadyRegistered
            | HubError::Encode(_)
            | HubError::HubClosed => ErrorCode::Internal,
        }
    }
}

fn encode(envelope: &Envelope) -> Result<Outbound, HubError> {
    envelope
        .to_json()
        .map(Outbound::from)
        .map_err(|e| HubError::Encode(e.to_string()))
}

/// The hub loop. Create with [`Hub::new`], then spawn [`Hub::run`].
pub struct Hub {
    registry: Registry,
    command_rx: HubCommandReceiver,
    config: ConfigStore<HubConfig>,
    counters: Arc<HubCounters>,
}

impl Hub {
    pub fn new(config: ConfigStore<HubConfig>) -> (Self, HubHandle) {
        let (command_tx, command_rx) = hub_command_channel();
        let counters = Arc::new(HubCounters::default());
        let hub = Self {
            registry: Registry::new(),
            command_rx,
            config,
            counters: Arc::clone(&counters),
        };
        (
            hub,
            HubHandle {
                command_tx,
                counters,
            },
        )
    }

    /// Process commands until shutdown is signalled or every handle is
    /// dropped. On exit every outbound queue is closed, which ends every
    /// write loop.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Hub started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Hub received shutdown signal");
                        break;
                    }
                }

                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => {
                        info!("Hub command channel closed");
                        break;
                    }
                },
            }
        }

        let closed = self.registry.clear();
        self.counters.publish(&self.registry);
        info!(connections = closed, "Hub shutdown complete");
    }

    fn handle(&mut self, command: HubCommand) {
        let limits = self.config.current();
        // One bad command must not take every connection down with it.
        let outcome =
            std::panic::catch_unwind(AssertUnwindSafe(|| self.apply(command, &limits)));
        if outcome.is_err() {
            error!("Hub command handler panicked, continuing");
        }
        self.counters.publish(&self.registry);
    }

    fn apply(&mut self, command: HubCommand, limits: &HubConfig) {
        match command {
            HubCommand::Register { handle, reply } => {
                let (id, user_id, role, expires_at) = (
                    handle.id(),
                    handle.user_id(),
                    handle.role(),
                    handle.expires_at(),
                );
                let result = self
                    .registry
                    .register(handle, limits.max_connections_per_user);
                match &result {
                    Ok(()) => {
                        info!(connection_id = %id, user_id = %user_id, role = %role, "Connection registered");
                        let payload = ConnectedPayload {
                            connection_id: id.as_uuid(),
                            user_id,
                            expires_at,
                        };
                        self.reply_with(id, MessageType::Connected, &payload, limits);
                    }
                    Err(e) => {
                        warn!(connection_id = %id, user_id = %user_id, error = %e, "Connection rejected");
                    }
                }
                let _ = reply.send(result);
            }

            HubCommand::Unregister { id } => {
                if let Some(handle) = self.registry.unregister(id) {
                    info!(connection_id = %id, user_id = %handle.user_id(), "Connection unregistered");
                }
            }

            HubCommand::Subscribe { id, channel, reply } => {
                let result = Channel::parse(&channel)
                    .map_err(HubError::from)
                    .and_then(|channel| {
                        self.registry
                            .subscribe(id, channel.clone(), limits.max_subscriptions_per_connection)
                            .map(|_| channel)
                    });
                self.acknowledge(id, MessageType::Subscribed, &result, limits);
                let _ = reply.send(result);
            }

            HubCommand::Unsubscribe { id, channel, reply } => {
                let result = Channel::parse(&channel)
                    .map_err(HubError::from)
                    .and_then(|channel| self.registry.unsubscribe(id, &channel).map(|_| channel));
                self.acknowledge(id, MessageType::Unsubscribed, &result, limits);
                let _ = reply.send(result);
            }

            HubCommand::Broadcast { channels, message } => {
                let fan_out = self
                    .registry
                    .broadcast(&channels, &message, limits.max_consecutive_drops);
                debug!(
                    channels = ?channels,
                    delivered = fan_out.delivered,
                    dropped = fan_out.dropped,
                    "Broadcast delivered"
                );
                self.evict(fan_out);
            }

            HubCommand::SendToUser { user_id, message } => {
                let fan_out =
                    self.registry
                        .send_to_user(user_id, &message, limits.max_consecutive_drops);
                debug!(user_id = %user_id, delivered = fan_out.delivered, "User message delivered");
                self.evict(fan_out);
            }

            HubCommand::SendToConnection { id, message } => {
                let fan_out =
                    self.registry
                        .send_to_connection(id, &message, limits.max_consecutive_drops);
                self.evict(fan_out);
            }
        }
    }

    /// Answer a subscribe/unsubscribe on the connection's own queue.
    fn acknowledge(
        &mut self,
        id: ConnectionId,
        kind: MessageType,
        result: &Result<Channel, HubError>,
        limits: &HubConfig,
    ) {
        match result {
            Ok(channel) => {
                debug!(connection_id = %id, channel = %channel, kind = %kind, "Subscription changed");
                let payload = ChannelPayload {
                    channel: channel.to_string(),
                };
                self.reply_with(id, kind, &payload, limits);
            }
            // Nobody left to tell.
            Err(HubError::UnknownConnection) => {}
            Err(e) => {
                debug!(connection_id = %id, error = %e, "Subscription request refused");
                let envelope = Envelope::error(e.error_code(), e.to_string());
                self.reply(id, &envelope, limits);
            }
        }
    }

    fn reply_with<T: serde::Serialize>(
        &mut self,
        id: ConnectionId,
        kind: MessageType,
        payload: &T,
        limits: &HubConfig,
    ) {
        match Envelope::with_payload(kind, payload) {
            Ok(envelope) => self.reply(id, &envelope, limits),
            Err(e) => error!(kind = %kind, error = %e, "Failed to build envelope"),
        }
    }

    fn reply(&mut self, id: ConnectionId, envelope: &Envelope, limits: &HubConfig) {
        match encode(envelope) {
            Ok(message) => {
                let fan_out =
                    self.registry
                        .send_to_connection(id, &message, limits.max_consecutive_drops);
                self.evict(fan_out);
            }
            Err(e) => error!(kind = %envelope.kind, error = %e, "Failed to encode envelope"),
        }
    }

    fn evict(&mut self, fan_out: FanOut) {
        for id in fan_out.evict {
            if let Some(handle) = self.registry.unregister(id) {
                warn!(
                    connection_id = %id,
                    user_id = %handle.user_id(),
                    "Evicting unreachable connection"
                );
            }
        }
    }
}

/// Cloneable front door to the hub loop.
#[derive(Clone)]
pub struct HubHandle {
    command_tx: HubCommandSender,
    counters: Arc<HubCounters>,
}

impl HubHandle {
    /// Admit a connection. On success the hub has already queued the
    /// `connected` envelope.
    pub async fn register(&self, handle: ConnectionHandle) -> Result<(), HubError> {
        self.request(|reply| HubCommand::Register { handle, reply })
            .await
    }

    /// Remove a connection. Idempotent; closes its outbound queue.
    pub async fn unregister(&self, id: ConnectionId) -> Result<(), HubError> {
        self.send(HubCommand::Unregister { id }).await
    }

    /// Subscribe a connection to a channel by name. The acknowledgement or
    /// the `error` envelope is queued to the connection either way.
    pub async fn subscribe(
        &self,
        id: ConnectionId,
        channel: impl Into<String>,
    ) -> Result<Channel, HubError> {
        let channel = channel.into();
        self.request(|reply| HubCommand::Subscribe { id, channel, reply })
            .await
    }

    pub async fn unsubscribe(
        &self,
        id: ConnectionId,
        channel: impl Into<String>,
    ) -> Result<Channel, HubError> {
        let channel = channel.into();
        self.request(|reply| HubCommand::Unsubscribe { id, channel, reply })
            .await
    }

    pub async fn broadcast(&self, channel: Channel, envelope: &Envelope) -> Result<(), HubError> {
        self.broadcast_many(vec![channel], envelope).await
    }

    /// Broadcast to the union of several channels. A connection subscribed
    /// to more than one of them receives the envelope once.
    pub async fn broadcast_many(
        &self,
        channels: Vec<Channel>,
        envelope: &Envelope,
    ) -> Result<(), HubError> {
        if let Some(channel) = channels.iter().find(|c| c.is_user_scoped()) {
            warn!(channel = %channel, kind = %envelope.kind, "Refusing to broadcast to a user-scoped channel");
            return Err(HubError::UserScopedChannel(channel.clone()));
        }
        if channels.is_empty() {
            return Ok(());
        }
        let message = encode(envelope)?;
        self.send(HubCommand::Broadcast { channels, message }).await
    }

    /// Deliver to every live connection of one user.
    pub async fn send_to_user(&self, user_id: Uuid, envelope: &Envelope) -> Result<(), HubError> {
        let message = encode(envelope)?;
        self.send(HubCommand::SendToUser { user_id, message }).await
    }

    pub async fn send_to_connection(
        &self,
        id: ConnectionId,
        envelope: &Envelope,
    ) -> Result<(), HubError> {
        let message = encode(envelope)?;
        self.send(HubCommand::SendToConnection { id, message })
            .await
    }

    /// Counters as of the last processed command.
    pub fn stats(&self) -> HubStats {
        self.counters.snapshot()
    }

    async fn send(&self, command: HubCommand) -> Result<(), HubError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| HubError::HubClosed)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T, HubError>>) -> HubCommand,
    ) -> Result<T, HubError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(command(reply_tx)).await?;
        reply_rx.await.map_err(|_| HubError::HubClosed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{OutboundReceiver, outbound_channel};
    use cvewire_sdk::objects::{Identity, Role};
    use time::OffsetDateTime;
    use tokio::task::JoinHandle;

    struct Running {
        handle: HubHandle,
        shutdown_tx: watch::Sender<bool>,
        task: JoinHandle<()>,
    }

    fn start(config: HubConfig) -> Running {
        let (hub, handle) = Hub::new(ConfigStore::new(config));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(hub.run(shutdown_rx));
        Running {
            handle,
            shutdown_tx,
            task,
        }
    }

    fn connection(user_id: Uuid) -> (ConnectionHandle, OutboundReceiver) {
        let (tx, rx) = outbound_channel(16);
        let identity = Identity {
            user_id,
            role: Role::User,
            expires_at: OffsetDateTime::now_utc() + time::Duration::hours(1),
        };
        (ConnectionHandle::new(ConnectionId::new(), &identity, tx), rx)
    }

    async fn next(rx: &mut OutboundReceiver) -> Envelope {
        let text = rx.recv().await.unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_register_queues_connected() {
        let hub = start(HubConfig::default());
        let user = Uuid::new_v4();
        let (conn, mut rx) = connection(user);
        let id = conn.id();

        hub.handle.register(conn).await.unwrap();
        let envelope = next(&mut rx).await;
        assert_eq!(envelope.kind, MessageType::Connected);
        let payload: ConnectedPayload = envelope.payload_as().unwrap();
        assert_eq!(payload.connection_id, id.as_uuid());
        assert_eq!(payload.user_id, user);
        assert_eq!(hub.handle.stats().connections, 1);
    }

    #[tokio::test]
    async fn test_sixth_connection_rejected() {
        let hub = start(HubConfig::default());
        let user = Uuid::new_v4();
        let mut receivers = Vec::new();
        for _ in 0..5 {
            let (conn, rx) = connection(user);
            hub.handle.register(conn).await.unwrap();
            receivers.push(rx);
        }
        let (conn, _rx) = connection(user);
        assert_eq!(
            hub.handle.register(conn).await,
            Err(HubError::ConnectionLimitExceeded { limit: 5 })
        );
        assert_eq!(hub.handle.stats().connections, 5);
        assert_eq!(hub.handle.stats().users, 1);
    }

    #[tokio::test]
    async fn test_subscribe_ack_and_broadcast() {
        let hub = start(HubConfig::default());
        let (conn, mut rx) = connection(Uuid::new_v4());
        let id = conn.id();
        hub.handle.register(conn).await.unwrap();
        next(&mut rx).await;

        let channel = hub.handle.subscribe(id, "articles:critical").await.unwrap();
        assert_eq!(channel, Channel::ArticlesCritical);
        let ack = next(&mut rx).await;
        assert_eq!(ack.kind, MessageType::Subscribed);
        assert_eq!(
            ack.payload_as::<ChannelPayload>().unwrap().channel,
            "articles:critical"
        );

        let announcement = Envelope::new(MessageType::ArticleNew, serde_json::json!({"n": 1}));
        hub.handle
            .broadcast_many(
                vec![Channel::ArticlesAll, Channel::ArticlesCritical],
                &announcement,
            )
            .await
            .unwrap();
        let received = next(&mut rx).await;
        assert_eq!(received.id, announcement.id);
        assert_eq!(received.payload, announcement.payload);

        hub.handle.unsubscribe(id, "articles:critical").await.unwrap();
        assert_eq!(next(&mut rx).await.kind, MessageType::Unsubscribed);
        assert_eq!(hub.handle.stats().channels, 0);
    }

    #[tokio::test]
    async fn test_invalid_channel_reported_to_client() {
        let hub = start(HubConfig::default());
        let (conn, mut rx) = connection(Uuid::new_v4());
        let id = conn.id();
        hub.handle.register(conn).await.unwrap();
        next(&mut rx).await;

        let result = hub.handle.subscribe(id, "articles:bogus").await;
        assert!(matches!(result, Err(HubError::InvalidChannel(_))));
        let envelope = next(&mut rx).await;
        assert_eq!(envelope.kind, MessageType::Error);
        assert_eq!(
            envelope
                .payload_as::<cvewire_sdk::objects::ErrorPayload>()
                .unwrap()
                .code,
            ErrorCode::InvalidChannel
        );
    }

    #[tokio::test]
    async fn test_subscription_limit_reported_to_client() {
        let config = HubConfig {
            max_subscriptions_per_connection: 1,
            ..HubConfig::default()
        };
        let hub = start(config);
        let (conn, mut rx) = connection(Uuid::new_v4());
        let id = conn.id();
        hub.handle.register(conn).await.unwrap();
        next(&mut rx).await;

        hub.handle.subscribe(id, "system").await.unwrap();
        next(&mut rx).await;
        assert_eq!(
            hub.handle.subscribe(id, "articles:all").await,
            Err(HubError::SubscriptionLimitExceeded { limit: 1 })
        );
        let envelope = next(&mut rx).await;
        assert_eq!(
            envelope
                .payload_as::<cvewire_sdk::objects::ErrorPayload>()
                .unwrap()
                .code,
            ErrorCode::SubscriptionLimit
        );
    }

    #[tokio::test]
    async fn test_user_scoped_broadcast_refused() {
        let hub = start(HubConfig::default());
        let envelope = Envelope::new(MessageType::AlertMatch, serde_json::json!({}));
        assert_eq!(
            hub.handle.broadcast(Channel::AlertsUser, &envelope).await,
            Err(HubError::UserScopedChannel(Channel::AlertsUser))
        );
    }

    #[tokio::test]
    async fn test_send_to_user_skips_other_users() {
        let hub = start(HubConfig::default());
        let user = Uuid::new_v4();
        let (mine, mut my_rx) = connection(user);
        let (theirs, mut their_rx) = connection(Uuid::new_v4());
        hub.handle.register(mine).await.unwrap();
        hub.handle.register(theirs).await.unwrap();
        next(&mut my_rx).await;
        next(&mut their_rx).await;

        let envelope = Envelope::new(MessageType::AlertMatch, serde_json::json!({"alert_id": 1}));
        hub.handle.send_to_user(user, &envelope).await.unwrap();
        assert_eq!(next(&mut my_rx).await.kind, MessageType::AlertMatch);

        // Round-trip through the loop so the send above has been processed.
        assert_eq!(
            hub.handle.subscribe(ConnectionId::new(), "system").await,
            Err(HubError::UnknownConnection)
        );
        assert!(their_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregister_closes_queue() {
        let hub = start(HubConfig::default());
        let (conn, mut rx) = connection(Uuid::new_v4());
        let id = conn.id();
        hub.handle.register(conn).await.unwrap();
        next(&mut rx).await;

        hub.handle.unregister(id).await.unwrap();
        assert!(rx.recv().await.is_none());
        // Unregistering twice is harmless.
        hub.handle.unregister(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_every_queue() {
        let hub = start(HubConfig::default());
        let (conn, mut rx) = connection(Uuid::new_v4());
        hub.handle.register(conn).await.unwrap();
        next(&mut rx).await;

        hub.shutdown_tx.send(true).unwrap();
        hub.task.await.unwrap();
        assert!(rx.recv().await.is_none());
        assert_eq!(hub.handle.stats(), HubStats::default());
        assert_eq!(
            hub.handle.subscribe(ConnectionId::new(), "system").await,
            Err(HubError::HubClosed)
        );
    }
}
