//! Per-type alert predicates and priority derivation.
//!
//! Textual comparisons ignore case. An alert whose value is empty or only
//! whitespace never matches anything.

use cvewire_sdk::objects::{AlertType, Article, Priority, Severity};

/// Evaluate one alert criterion against an article. Returns the match
/// priority when the article satisfies it.
pub fn evaluate(alert_type: AlertType, value: &str, article: &Article) -> Option<Priority> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let matched = match alert_type {
        AlertType::Keyword => {
            let needle = value.to_lowercase();
            [&article.title, &article.summary, &article.content]
                .into_iter()
                .any(|text| text.to_lowercase().contains(&needle))
        }
        // Whole identifiers only: CVE-2024-1234 must not match CVE-2024-12345.
        AlertType::Cve => article
            .cves
            .iter()
            .any(|cve| cve.trim().eq_ignore_ascii_case(value)),
        AlertType::Vendor => {
            let needle = value.to_lowercase();
            article
                .vendors
                .iter()
                .any(|vendor| vendor.to_lowercase().contains(&needle))
        }
        AlertType::Category => equals_ignore_case(article.category.as_deref(), value),
        AlertType::Severity => Severity::parse(value) == Some(article.severity),
        AlertType::Source => equals_ignore_case(article.source.as_deref(), value),
    };

    matched.then(|| priority(alert_type, article.severity))
}

/// Priority of a match of the given type on an article of the given
/// severity.
pub fn priority(alert_type: AlertType, severity: Severity) -> Priority {
    match alert_type {
        AlertType::Keyword => match severity {
            Severity::Critical => Priority::Critical,
            Severity::High => Priority::High,
            _ => Priority::Medium,
        },
        AlertType::Cve => Priority::Critical,
        AlertType::Vendor => Priority::High,
        AlertType::Category | AlertType::Source => Priority::Medium,
        AlertType::Severity => Priority::from(severity),
    }
}

fn equals_ignore_case(field: Option<&str>, value: &str) -> bool {
    field.is_some_and(|field| field.trim().to_lowercase() == value.to_lowercase())
}
