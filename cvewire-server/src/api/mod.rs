//! HTTP and WebSocket handlers.
//!
//! # Endpoints
//!
//! - `GET  /ws`                     – hub WebSocket (identity token required)
//! - `POST /internal/articles`      – publish a created or updated article
//! - `POST /internal/announcements` – push a `system.announcement`

pub mod extractors;
pub mod ingest;
pub mod ws;
