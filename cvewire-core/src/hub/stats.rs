use super::registry::Registry;
use cvewire_sdk::objects::HubStats;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters published by the hub loop after every command.
///
/// Readers never touch the registry, so `stats()` stays synchronous and
/// does not queue behind broadcasts.
#[derive(Debug, Default)]
pub(crate) struct HubCounters {
    connections: AtomicUsize,
    users: AtomicUsize,
    channels: AtomicUsize,
}

impl HubCounters {
    pub(crate) fn publish(&self, registry: &Registry) {
        let stats = registry.stats();
        self.connections.store(stats.connections, Ordering::Relaxed);
        self.users.store(stats.users, Ordering::Relaxed);
        self.channels.store(stats.channels, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> HubStats {
        HubStats {
            connections: self.connections.load(Ordering::Relaxed),
            users: self.users.load(Ordering::Relaxed),
            channels: self.channels.load(Ordering::Relaxed),
        }
    }
}
