//! Persistence boundary of the alert matcher.

use super::{Alert, NewAlertMatch, StoredMatch};
use crate::entities::alert::ListActiveAlerts;
use crate::entities::alert_match::{
    GetAlertMatchesForArticle, InsertAlertMatch, MarkAlertMatchNotified,
};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use sqlx::PgPool;
use std::collections::BTreeMap;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Where alerts are read from and matches are recorded.
///
/// `create_match` must be idempotent per (alert, article): a duplicate is
/// reported as `Ok(false)`, never as an error.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn active_alerts(&self) -> Result<Vec<Alert>, StoreError>;

    /// Returns `true` if the match was newly recorded.
    async fn create_match(&self, new: &NewAlertMatch) -> Result<bool, StoreError>;

    async fn mark_notified(
        &self,
        alert_id: i64,
        article_id: Uuid,
        notified_at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    async fn matches_for_article(&self, article_id: Uuid) -> Result<Vec<StoredMatch>, StoreError>;
}

/// Postgres-backed store.
pub struct PgAlertStore {
    db: DatabaseProcessor,
}

impl PgAlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            db: DatabaseProcessor { pool },
        }
    }
}

#[async_trait]
impl AlertStore for PgAlertStore {
    async fn active_alerts(&self) -> Result<Vec<Alert>, StoreError> {
        let records = self.db.process(ListActiveAlerts).await?;
        Ok(records.into_iter().map(Alert::from).collect())
    }

    async fn create_match(&self, new: &NewAlertMatch) -> Result<bool, StoreError> {
        let inserted = self
            .db
            .process(InsertAlertMatch {
                alert_id: new.alert_id,
                article_id: new.article_id,
                priority: new.priority.into(),
                matched_at: new.matched_at,
            })
            .await?;
        Ok(inserted)
    }

    async fn mark_notified(
        &self,
        alert_id: i64,
        article_id: Uuid,
        notified_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.db
            .process(MarkAlertMatchNotified {
                alert_id,
                article_id,
                notified_at,
            })
            .await?;
        Ok(())
    }

    async fn matches_for_article(&self, article_id: Uuid) -> Result<Vec<StoredMatch>, StoreError> {
        let records = self
            .db
            .process(GetAlertMatchesForArticle { article_id })
            .await?;
        Ok(records.into_iter().map(StoredMatch::from).collect())
    }
}

/// In-process store for tests and database-less deployments.
#[derive(Default)]
pub struct MemoryAlertStore {
    alerts: RwLock<Vec<Alert>>,
    matches: Mutex<BTreeMap<(i64, Uuid), StoredMatch>>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alerts(alerts: Vec<Alert>) -> Self {
        Self {
            alerts: RwLock::new(alerts),
            matches: Mutex::default(),
        }
    }

    pub async fn insert_alert(&self, alert: Alert) {
        self.alerts.write().await.push(alert);
    }

    /// Flip an alert's active flag. Returns `false` if no such alert.
    pub async fn set_active(&self, alert_id: i64, active: bool) -> bool {
        let mut alerts = self.alerts.write().await;
        match alerts.iter_mut().find(|a| a.id == alert_id) {
            Some(alert) => {
                alert.active = active;
                true
            }
            None => false,
        }
    }

    pub async fn match_count(&self) -> usize {
        self.matches.lock().await.len()
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn active_alerts(&self) -> Result<Vec<Alert>, StoreError> {
        let alerts = self.alerts.read().await;
        Ok(alerts.iter().filter(|a| a.active).cloned().collect())
    }

    async fn create_match(&self, new: &NewAlertMatch) -> Result<bool, StoreError> {
        let mut matches = self.matches.lock().await;
        let key = (new.alert_id, new.article_id);
        if matches.contains_key(&key) {
            return Ok(false);
        }
        matches.insert(
            key,
            StoredMatch {
                alert_id: new.alert_id,
                article_id: new.article_id,
                priority: new.priority,
                matched_at: new.matched_at,
                notified_at: None,
            },
        );
        Ok(true)
    }

    async fn mark_notified(
        &self,
        alert_id: i64,
        article_id: Uuid,
        notified_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        if let Some(stored) = self.matches.lock().await.get_mut(&(alert_id, article_id)) {
            stored.notified_at.get_or_insert(notified_at);
        }
        Ok(())
    }

    async fn matches_for_article(&self, article_id: Uuid) -> Result<Vec<StoredMatch>, StoreError> {
        let matches = self.matches.lock().await;
        Ok(matches
            .values()
            .filter(|m| m.article_id == article_id)
            .cloned()
            .collect())
    }
}
