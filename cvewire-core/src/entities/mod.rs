pub mod alert;
pub mod alert_match;

use cvewire_sdk::objects::{AlertType as SdkAlertType, Priority as SdkPriority};

/// Alert criterion kind for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `cvewire_sdk::objects::AlertType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "alert_type")]
pub enum AlertType {
    Keyword,
    Cve,
    Vendor,
    Category,
    Severity,
    Source,
}

impl From<AlertType> for SdkAlertType {
    fn from(value: AlertType) -> Self {
        match value {
            AlertType::Keyword => SdkAlertType::Keyword,
            AlertType::Cve => SdkAlertType::Cve,
            AlertType::Vendor => SdkAlertType::Vendor,
            AlertType::Category => SdkAlertType::Category,
            AlertType::Severity => SdkAlertType::Severity,
            AlertType::Source => SdkAlertType::Source,
        }
    }
}

impl From<SdkAlertType> for AlertType {
    fn from(value: SdkAlertType) -> Self {
        match value {
            SdkAlertType::Keyword => AlertType::Keyword,
            SdkAlertType::Cve => AlertType::Cve,
            SdkAlertType::Vendor => AlertType::Vendor,
            SdkAlertType::Category => AlertType::Category,
            SdkAlertType::Severity => AlertType::Severity,
            SdkAlertType::Source => AlertType::Source,
        }
    }
}

/// Match priority for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `cvewire_sdk::objects::Priority`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "alert_priority")]
pub enum AlertPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl From<AlertPriority> for SdkPriority {
    fn from(value: AlertPriority) -> Self {
        match value {
            AlertPriority::Critical => SdkPriority::Critical,
            AlertPriority::High => SdkPriority::High,
            AlertPriority::Medium => SdkPriority::Medium,
            AlertPriority::Low => SdkPriority::Low,
        }
    }
}

impl From<SdkPriority> for AlertPriority {
    fn from(value: SdkPriority) -> Self {
        match value {
            SdkPriority::Critical => AlertPriority::Critical,
            SdkPriority::High => AlertPriority::High,
            SdkPriority::Medium => AlertPriority::Medium,
            SdkPriority::Low => AlertPriority::Low,
        }
    }
}
