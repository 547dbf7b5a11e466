//! Alert subscription types and the `alert.match` payload.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::article::{ArticleSummary, Severity};

/// Criterion kind of a user-defined alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Keyword,
    Cve,
    Vendor,
    Category,
    Severity,
    Source,
}

/// Delivery priority of an alert match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity literals map one-to-one, except `informational` which is
/// clamped to [`Priority::Low`].
impl From<Severity> for Priority {
    fn from(value: Severity) -> Self {
        match value {
            Severity::Critical => Priority::Critical,
            Severity::High => Priority::High,
            Severity::Medium => Priority::Medium,
            Severity::Low | Severity::Informational => Priority::Low,
        }
    }
}

/// Payload of `alert.match`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertMatchPayload {
    pub alert_id: i64,
    pub alert_type: AlertType,
    pub alert_value: String,
    pub priority: Priority,
    #[serde(with = "time::serde::rfc3339")]
    pub matched_at: OffsetDateTime,
    pub article: ArticleSummary,
}
