//! Event system and bounded queues.
//!
//! # Event Flow
//!
//! 1. Ingest endpoint emits `ArticleIngested` -> `AlertMatcher`
//! 2. `AlertMatcher` and `NotificationService` send `HubCommand`s -> `Hub`
//! 3. `Hub` pushes encoded envelopes into each connection's outbound queue
//! 4. The session write loop drains its queue onto the socket

pub mod channels;
pub mod types;

pub use channels::{
    ArticleIngestedReceiver, ArticleIngestedSender, DEFAULT_CHANNEL_BUFFER, HubCommandReceiver,
    HubCommandSender, Outbound, OutboundReceiver, OutboundSender, article_ingested_channel,
    hub_command_channel, outbound_channel,
};

pub use types::ArticleIngested;
