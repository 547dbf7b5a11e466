//! Configuration types for cvewire.
//!
//! The validated runtime types live in `cvewire-sdk::config`; this module
//! re-exports them and groups them into [`SharedConfig`], which the server
//! swaps section by section on reload.

mod config_store;

pub use config_store::ConfigStore;
pub use cvewire_sdk::config::{AuthConfig, HubConfig, IngestConfig, MatcherConfig, ServerConfig};

use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared configuration state with separate locks for each section.
///
/// Hub limits sit in a [`ConfigStore`] because the hub loop and every
/// session read them on hot paths without awaiting a lock.
#[derive(Clone)]
pub struct SharedConfig {
    /// Server configuration (listen address).
    pub server: Arc<RwLock<ServerConfig>>,
    /// Hub and session limits.
    pub hub: ConfigStore<HubConfig>,
    /// Identity token verification secret.
    pub auth: Arc<RwLock<AuthConfig>>,
    /// Ingest endpoint secret.
    pub ingest: Arc<RwLock<IngestConfig>>,
    /// Alert matcher settings (read at startup only).
    pub matcher: MatcherConfig,
}

impl SharedConfig {
    pub fn new(
        server: ServerConfig,
        hub: HubConfig,
        auth: AuthConfig,
        ingest: IngestConfig,
        matcher: MatcherConfig,
    ) -> Self {
        Self {
            server: Arc::new(RwLock::new(server)),
            hub: ConfigStore::new(hub),
            auth: Arc::new(RwLock::new(auth)),
            ingest: Arc::new(RwLock::new(ingest)),
            matcher,
        }
    }
}
