use serde::{Deserialize, Serialize};

/// Point-in-time hub counters returned by `GET /stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubStats {
    /// Live connections.
    pub connections: usize,
    /// Distinct users with at least one live connection.
    pub users: usize,
    /// Channels with at least one subscriber.
    pub channels: usize,
}
