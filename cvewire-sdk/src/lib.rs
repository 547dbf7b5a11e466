//! Wire types, identity tokens and clients for the cvewire notification hub.
//!
//! The `client` feature adds a WebSocket [`client::HubClient`] and an HTTP
//! [`client::IngestClient`].

#![forbid(unsafe_code)]

#[cfg(feature = "client")]
pub mod client;
pub mod config;
pub mod objects;
pub mod signature;
