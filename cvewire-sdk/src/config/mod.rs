//! Runtime configuration types for cvewire.
//!
//! These types hold validated values shared across crates. Loading and
//! parsing the config file is handled by the server crate.

mod auth;
mod hub;
mod ingest;
mod server;

pub use auth::AuthConfig;
pub use hub::HubConfig;
pub use ingest::IngestConfig;
pub use server::{MatcherConfig, ServerConfig};
