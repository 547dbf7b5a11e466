//! Swappable config snapshot.
//!
//! `ConfigStore<T>` publishes each value as an `Arc<T>` through a
//! `tokio::sync::watch` channel. Readers take a cheap snapshot with
//! [`current`](ConfigStore::current) and never hold a lock across an
//! `.await`; the hub loop snapshots once per command.

use std::sync::Arc;
use tokio::sync::watch;

/// A shared configuration value that can be swapped at runtime.
pub struct ConfigStore<T> {
    tx: Arc<watch::Sender<Arc<T>>>,
}

impl<T> ConfigStore<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    /// Replace the stored value. Snapshots taken earlier are unaffected.
    pub fn update(&self, value: T) {
        self.tx.send_replace(Arc::new(value));
    }

    /// Snapshot of the current value.
    pub fn current(&self) -> Arc<T> {
        Arc::clone(&self.tx.borrow())
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_is_visible_to_clones() {
        let store = ConfigStore::new(1u32);
        let snapshot = store.current();

        store.clone().update(2);

        assert_eq!(*store.current(), 2);
        assert_eq!(*snapshot, 1);
    }
}
