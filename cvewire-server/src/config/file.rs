//! TOML file configuration structures.
//!
//! These structs directly map to the `cvewire-config.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub hub: HubConfig,
    pub auth: AuthConfig,
    pub ingest: IngestConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Hub and session limits. Durations are whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub max_connections_per_user: usize,
    pub max_subscriptions_per_connection: usize,
    pub send_queue_capacity: usize,
    /// `0` keeps slow consumers connected and only drops their messages.
    pub max_consecutive_drops: u32,
    pub heartbeat_interval_secs: u64,
    pub read_deadline_secs: u64,
    pub token_expiry_warning_secs: u64,
    pub max_message_size: usize,
    pub max_malformed_messages: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        let defaults = cvewire_sdk::config::HubConfig::default();
        Self {
            max_connections_per_user: defaults.max_connections_per_user,
            max_subscriptions_per_connection: defaults.max_subscriptions_per_connection,
            send_queue_capacity: defaults.send_queue_capacity,
            max_consecutive_drops: defaults.max_consecutive_drops,
            heartbeat_interval_secs: defaults.heartbeat_interval.as_secs(),
            read_deadline_secs: defaults.read_deadline.as_secs(),
            token_expiry_warning_secs: defaults.token_expiry_warning.as_secs(),
            max_message_size: defaults.max_message_size,
            max_malformed_messages: defaults.max_malformed_messages,
        }
    }
}

/// Identity token verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared HMAC secret used to verify identity tokens.
    pub token_secret: String,
}

/// Ingest endpoint authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// The ingest secret. If this is plaintext (doesn't start with `$argon2`),
    /// it will be hashed and the config file will be rewritten.
    pub secret: String,
}

/// Alert matcher section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    cvewire_sdk::config::MatcherConfig::default().concurrency
}

impl FileConfig {
    /// Check if the ingest secret is already hashed (argon2 format).
    pub fn is_ingest_secret_hashed(&self) -> bool {
        self.ingest.secret.starts_with("$argon2")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[auth]
token_secret = "token-secret"

[ingest]
secret = "pipeline-key"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.hub, HubConfig::default());
        assert_eq!(config.hub.max_connections_per_user, 5);
        assert_eq!(config.hub.heartbeat_interval_secs, 30);
        assert_eq!(config.matcher.concurrency, 8);
        assert!(!config.is_ingest_secret_hashed());
    }

    #[test]
    fn test_partial_hub_section() {
        let toml_str = r#"
[server]

[hub]
max_subscriptions_per_connection = 10
read_deadline_secs = 90

[auth]
token_secret = "token-secret"

[ingest]
secret = "$argon2id$v=19$m=19456,t=2,p=1$abc123"

[matcher]
concurrency = 2
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, default_listen_addr());
        assert_eq!(config.hub.max_subscriptions_per_connection, 10);
        assert_eq!(config.hub.read_deadline_secs, 90);
        assert_eq!(config.hub.max_connections_per_user, 5);
        assert_eq!(config.matcher.concurrency, 2);
        assert!(config.is_ingest_secret_hashed());
    }
}
