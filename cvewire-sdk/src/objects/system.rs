//! Operator announcements pushed on the `system` channel.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnouncementLevel {
    #[default]
    Info,
    Warning,
    Maintenance,
}

/// Body of `POST /internal/announcements` and payload of
/// `system.announcement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub level: AnnouncementLevel,
}
