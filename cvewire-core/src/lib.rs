#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod alerts;
pub mod auth;
pub mod config;
pub mod entities;
pub mod events;
pub mod framework;
pub mod hub;
pub mod notify;
pub mod session;
