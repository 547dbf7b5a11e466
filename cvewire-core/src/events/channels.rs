//! Event channel factories and handles.
//!
//! Every queue in the system is bounded so memory stays bounded under
//! bursts.

use super::types::ArticleIngested;
use crate::hub::HubCommand;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Default buffer size for event channels.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for ArticleIngested events.
pub type ArticleIngestedSender = mpsc::Sender<ArticleIngested>;
/// Receiver handle for ArticleIngested events.
pub type ArticleIngestedReceiver = mpsc::Receiver<ArticleIngested>;

/// Sender handle for the hub's command queue.
pub type HubCommandSender = mpsc::Sender<HubCommand>;
/// Receiver handle for the hub's command queue.
pub type HubCommandReceiver = mpsc::Receiver<HubCommand>;

/// A pre-encoded JSON envelope waiting in a connection's outbound queue.
pub type Outbound = Arc<str>;
/// Sender side of a connection's outbound queue. Owned by the hub.
pub type OutboundSender = mpsc::Sender<Outbound>;
/// Receiver side of a connection's outbound queue. Owned by the write loop.
pub type OutboundReceiver = mpsc::Receiver<Outbound>;

/// Create a new ArticleIngested channel.
pub fn article_ingested_channel() -> (ArticleIngestedSender, ArticleIngestedReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create the hub's command channel. Senders are cloned into every
/// `HubHandle`; the single receiver is owned by the hub loop.
pub fn hub_command_channel() -> (HubCommandSender, HubCommandReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create a connection's outbound queue with the given capacity.
pub fn outbound_channel(capacity: usize) -> (OutboundSender, OutboundReceiver) {
    mpsc::channel(capacity.max(1))
}
