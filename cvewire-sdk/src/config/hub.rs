//! Hub and session limits.

use std::time::Duration;

/// Runtime limits shared by the hub loop and every client session.
///
/// Swappable at runtime; new values apply to operations started after the
/// swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Live connections a single user may hold.
    pub max_connections_per_user: usize,
    /// Channels a single connection may subscribe to.
    pub max_subscriptions_per_connection: usize,
    /// Capacity of each connection's outbound queue.
    pub send_queue_capacity: usize,
    /// Evict a connection after this many consecutive dropped messages.
    /// `0` disables eviction.
    pub max_consecutive_drops: u32,
    pub heartbeat_interval: Duration,
    /// Inbound silence tolerated before the session closes.
    pub read_deadline: Duration,
    /// How long before token expiry the `token_expiring` warning is sent.
    pub token_expiry_warning: Duration,
    /// Largest inbound text frame accepted, in bytes.
    pub max_message_size: usize,
    /// Malformed client messages tolerated before the session closes.
    pub max_malformed_messages: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections_per_user: 5,
            max_subscriptions_per_connection: 50,
            send_queue_capacity: 256,
            max_consecutive_drops: 0,
            heartbeat_interval: Duration::from_secs(30),
            read_deadline: Duration::from_secs(60),
            token_expiry_warning: Duration::from_secs(60),
            max_message_size: 4096,
            max_malformed_messages: 5,
        }
    }
}
