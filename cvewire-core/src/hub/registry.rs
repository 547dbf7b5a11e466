//! The hub's connection index.
//!
//! Only the hub loop owns a [`Registry`], so none of this is synchronized.
//! Three views are kept consistent on every mutation:
//!
//! - `connections`: id -> handle plus the channels it subscribed to
//! - `users`: user -> that user's live connection ids
//! - `channels`: channel -> subscriber ids
//!
//! Empty user and channel entries are removed as soon as they empty out.

use super::HubError;
use super::connection::{ConnectionHandle, ConnectionId, Delivery};
use crate::events::Outbound;
use cvewire_sdk::objects::{Channel, HubStats};
use itertools::Itertools;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use tracing::warn;
use uuid::Uuid;

struct Entry {
    handle: ConnectionHandle,
    channels: HashSet<Channel>,
    consecutive_drops: u32,
}

/// Outcome of delivering one message to a set of connections.
#[derive(Debug, Default)]
pub(crate) struct FanOut {
    pub delivered: usize,
    pub dropped: usize,
    /// Connections whose queue closed, or that crossed the consecutive
    /// drop limit. The caller unregisters them.
    pub evict: Vec<ConnectionId>,
}

#[derive(Default)]
pub(crate) struct Registry {
    connections: HashMap<ConnectionId, Entry>,
    users: HashMap<Uuid, SmallVec<[ConnectionId; 4]>>,
    channels: HashMap<Channel, HashSet<ConnectionId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a connection unless its user is already at `max_per_user`.
    pub fn register(
        &mut self,
        handle: ConnectionHandle,
        max_per_user: usize,
    ) -> Result<(), HubError> {
        let id = handle.id();
        if self.connections.contains_key(&id) {
            return Err(HubError::AlreadyRegistered);
        }
        let held = self.users.get(&handle.user_id()).map_or(0, |ids| ids.len());
        if held >= max_per_user {
            return Err(HubError::ConnectionLimitExceeded {
                limit: max_per_user,
            });
        }

        self.users.entry(handle.user_id()).or_default().push(id);
        self.connections.insert(
            id,
            Entry {
                handle,
                channels: HashSet::new(),
                consecutive_drops: 0,
            },
        );
        Ok(())
    }

    /// Remove a connection from every index. Returns its handle so the
    /// caller decides when the outbound queue closes.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<ConnectionHandle> {
        let entry = self.connections.remove(&id)?;
        for channel in &entry.channels {
            self.detach(channel, id);
        }

        let user_id = entry.handle.user_id();
        if let Some(ids) = self.users.get_mut(&user_id) {
            ids.retain(|c| *c != id);
            if ids.is_empty() {
                self.users.remove(&user_id);
            }
        }
        Some(entry.handle)
    }

    fn detach(&mut self, channel: &Channel, id: ConnectionId) {
        if let Some(subscribers) = self.channels.get_mut(channel) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                self.channels.remove(channel);
            }
        }
    }

    /// Returns `Ok(false)` when the connection already held the channel.
    pub fn subscribe(
        &mut self,
        id: ConnectionId,
        channel: Channel,
        max_per_connection: usize,
    ) -> Result<bool, HubError> {
        let entry = self
            .connections
            .get_mut(&id)
            .ok_or(HubError::UnknownConnection)?;
        if entry.channels.contains(&channel) {
            return Ok(false);
        }
        if entry.channels.len() >= max_per_connection {
            return Err(HubError::SubscriptionLimitExceeded {
                limit: max_per_connection,
            });
        }

        entry.channels.insert(channel.clone());
        self.channels.entry(channel).or_default().insert(id);
        Ok(true)
    }

    /// Returns `Ok(false)` when the connection was not subscribed.
    pub fn unsubscribe(&mut self, id: ConnectionId, channel: &Channel) -> Result<bool, HubError> {
        let entry = self
            .connections
            .get_mut(&id)
            .ok_or(HubError::UnknownConnection)?;
        if !entry.channels.remove(channel) {
            return Ok(false);
        }
        self.detach(channel, id);
        Ok(true)
    }

    /// Deliver to every subscriber of any of `channels`, at most once per
    /// connection.
    pub fn broadcast(&mut self, channels: &[Channel], message: &Outbound, max_drops: u32) -> FanOut {
        let targets: Vec<ConnectionId> = channels
            .iter()
            .filter_map(|channel| self.channels.get(channel))
            .flatten()
            .copied()
            .unique()
            .collect();
        self.deliver(targets, message, max_drops)
    }

    pub fn send_to_user(&mut self, user_id: Uuid, message: &Outbound, max_drops: u32) -> FanOut {
        let targets = self
            .users
            .get(&user_id)
            .map(|ids| ids.to_vec())
            .unwrap_or_default();
        self.deliver(targets, message, max_drops)
    }

    pub fn send_to_connection(
        &mut self,
        id: ConnectionId,
        message: &Outbound,
        max_drops: u32,
    ) -> FanOut {
        self.deliver([id], message, max_drops)
    }

    fn deliver(
        &mut self,
        targets: impl IntoIterator<Item = ConnectionId>,
        message: &Outbound,
        max_drops: u32,
    ) -> FanOut {
        let mut fan_out = FanOut::default();
        for id in targets {
            let Some(entry) = self.connections.get_mut(&id) else {
                continue;
            };
            match entry.handle.try_deliver(message) {
                Delivery::Sent => {
                    entry.consecutive_drops = 0;
                    fan_out.delivered += 1;
                }
                Delivery::Dropped => {
                    entry.consecutive_drops += 1;
                    fan_out.dropped += 1;
                    warn!(
                        connection_id = %id,
                        user_id = %entry.handle.user_id(),
                        consecutive_drops = entry.consecutive_drops,
                        "Outbound queue full, message dropped"
                    );
                    if max_drops > 0 && entry.consecutive_drops >= max_drops {
                        fan_out.evict.push(id);
                    }
                }
                Delivery::Closed => fan_out.evict.push(id),
            }
        }
        fan_out
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn subscriptions(&self, id: ConnectionId) -> Option<&HashSet<Channel>> {
        self.connections.get(&id).map(|entry| &entry.channels)
    }

    pub fn subscriber_count(&self, channel: &Channel) -> usize {
        self.channels.get(channel).map_or(0, HashSet::len)
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connections.len(),
            users: self.users.len(),
            channels: self.channels.len(),
        }
    }

    /// Drop every connection. Their outbound queues close with the handles.
    pub fn clear(&mut self) -> usize {
        let count = self.connections.len();
        self.connections.clear();
        self.users.clear();
        self.channels.clear();
        count
    }
}
