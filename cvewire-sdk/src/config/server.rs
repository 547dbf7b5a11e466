//! Server configuration.

use std::net::SocketAddr;

/// Server configuration with runtime values.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The address and port to listen on.
    pub listen: SocketAddr,
}

/// Alert matcher settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatcherConfig {
    /// Articles matched concurrently.
    pub concurrency: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self { concurrency: 8 }
    }
}
