//! Alert matching engine.
//!
//! Every ingested article is evaluated against every active alert. Matches
//! are recorded through an [`AlertStore`], whose (alert, article)
//! uniqueness makes re-running a match harmless: only the run that actually
//! creates the record notifies the owner.

pub mod predicate;
mod store;

pub use store::{AlertStore, MemoryAlertStore, PgAlertStore, StoreError};

use crate::entities::alert::AlertRecord;
use crate::entities::alert_match::AlertMatchRecord;
use crate::events::{ArticleIngested, ArticleIngestedReceiver};
use crate::notify::NotificationService;
use cvewire_sdk::objects::{AlertMatchPayload, AlertType, Article, ArticleSummary, Priority};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A user-defined alert criterion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub id: i64,
    pub user_id: Uuid,
    pub alert_type: AlertType,
    pub value: String,
    pub active: bool,
}

impl From<AlertRecord> for Alert {
    fn from(record: AlertRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            alert_type: record.alert_type.into(),
            value: record.value,
            active: record.active,
        }
    }
}

/// A match about to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlertMatch {
    pub alert_id: i64,
    pub article_id: Uuid,
    pub priority: Priority,
    pub matched_at: OffsetDateTime,
}

/// A match as recorded by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMatch {
    pub alert_id: i64,
    pub article_id: Uuid,
    pub priority: Priority,
    pub matched_at: OffsetDateTime,
    pub notified_at: Option<OffsetDateTime>,
}

impl From<AlertMatchRecord> for StoredMatch {
    fn from(record: AlertMatchRecord) -> Self {
        Self {
            alert_id: record.alert_id,
            article_id: record.article_id,
            priority: record.priority.into(),
            matched_at: record.matched_at,
            notified_at: record.notified_at,
        }
    }
}

/// A match derived in one run of [`AlertMatcher::match_article`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMatch {
    pub alert_id: i64,
    pub article_id: Uuid,
    pub user_id: Uuid,
    pub priority: Priority,
    /// When the match was first recorded. For a match an earlier run
    /// created this is the stored time, or this run's time if the stored
    /// record could not be read.
    pub matched_at: OffsetDateTime,
    /// `false` if an earlier run already recorded this (alert, article).
    pub created: bool,
}

/// An alert that matched but whose match could not be recorded.
#[derive(Debug)]
pub struct AlertFailure {
    pub alert_id: i64,
    pub error: StoreError,
}

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Every alert was evaluated, but some matches were not recorded.
    #[error("{} alert matches could not be recorded", .failures.len())]
    Incomplete {
        matches: Vec<AlertMatch>,
        failures: Vec<AlertFailure>,
    },
}

pub struct AlertMatcher {
    store: Arc<dyn AlertStore>,
    notifier: NotificationService,
}

impl AlertMatcher {
    pub fn new(store: Arc<dyn AlertStore>, notifier: NotificationService) -> Self {
        Self { store, notifier }
    }

    /// Match one article against every active alert.
    ///
    /// Returns every match derived in this run, including ones an earlier
    /// run already recorded. A store error on one alert does not stop the
    /// others from being evaluated; the failures are reported together in
    /// [`MatchError::Incomplete`] once every alert has been tried.
    pub async fn match_article(&self, article: &Article) -> Result<Vec<AlertMatch>, MatchError> {
        let alerts = self.store.active_alerts().await?;
        let run_at = OffsetDateTime::now_utc();
        let mut matches = Vec::new();
        let mut failures = Vec::new();
        let mut recorded: Option<Vec<StoredMatch>> = None;

        for alert in alerts.iter().filter(|a| a.active) {
            let Some(priority) = predicate::evaluate(alert.alert_type, &alert.value, article)
            else {
                continue;
            };

            let new_match = NewAlertMatch {
                alert_id: alert.id,
                article_id: article.id,
                priority,
                matched_at: run_at,
            };
            let created = match self.store.create_match(&new_match).await {
                Ok(created) => created,
                Err(e) => {
                    error!(
                        alert_id = alert.id,
                        user_id = %alert.user_id,
                        article_id = %article.id,
                        error = %e,
                        "Failed to record alert match"
                    );
                    failures.push(AlertFailure {
                        alert_id: alert.id,
                        error: e,
                    });
                    continue;
                }
            };

            let matched_at = if created {
                self.notify(alert, priority, run_at, article).await;
                run_at
            } else {
                debug!(alert_id = alert.id, article_id = %article.id, "Alert match already recorded");
                self.recorded_at(&mut recorded, alert.id, article.id)
                    .await
                    .unwrap_or(run_at)
            };

            matches.push(AlertMatch {
                alert_id: alert.id,
                article_id: article.id,
                user_id: alert.user_id,
                priority,
                matched_at,
                created,
            });
        }

        if failures.is_empty() {
            Ok(matches)
        } else {
            Err(MatchError::Incomplete { matches, failures })
        }
    }

    /// Stored `matched_at` of an existing match. The article's matches are
    /// read once per run and reused for later duplicates.
    async fn recorded_at(
        &self,
        recorded: &mut Option<Vec<StoredMatch>>,
        alert_id: i64,
        article_id: Uuid,
    ) -> Option<OffsetDateTime> {
        if recorded.is_none() {
            match self.store.matches_for_article(article_id).await {
                Ok(stored) => *recorded = Some(stored),
                Err(e) => {
                    warn!(article_id = %article_id, error = %e, "Failed to read recorded alert matches");
                    return None;
                }
            }
        }
        recorded
            .as_deref()?
            .iter()
            .find(|m| m.alert_id == alert_id)
            .map(|m| m.matched_at)
    }

    /// Deliver a new match to its owner and stamp `notified_at`.
    ///
    /// Neither step can fail the run: the match is already recorded, and a
    /// failure here only leaves `notified_at` unset.
    async fn notify(
        &self,
        alert: &Alert,
        priority: Priority,
        matched_at: OffsetDateTime,
        article: &Article,
    ) {
        let payload = AlertMatchPayload {
            alert_id: alert.id,
            alert_type: alert.alert_type,
            alert_value: alert.value.clone(),
            priority,
            matched_at,
            article: ArticleSummary::from(article),
        };

        if let Err(e) = self.notifier.alert_matched(alert.user_id, &payload).await {
            warn!(
                alert_id = alert.id,
                user_id = %alert.user_id,
                error = %e,
                "Failed to deliver alert match"
            );
            return;
        }

        if let Err(e) = self
            .store
            .mark_notified(alert.id, article.id, OffsetDateTime::now_utc())
            .await
        {
            warn!(
                alert_id = alert.id,
                article_id = %article.id,
                error = %e,
                "Failed to mark alert match notified"
            );
        }
    }

    /// Match articles as they are ingested, up to `concurrency` at a time.
    pub async fn run(
        self: Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
        mut article_rx: ArticleIngestedReceiver,
        concurrency: usize,
    ) {
        let concurrency = concurrency.max(1);
        info!(concurrency, "AlertMatcher started");

        let permits = Arc::new(Semaphore::new(concurrency));
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("AlertMatcher received shutdown signal");
                        break;
                    }
                }

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Alert matching task failed");
                    }
                }

                event = article_rx.recv() => match event {
                    Some(event) => {
                        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                            break;
                        };
                        let matcher = Arc::clone(&self);
                        in_flight.spawn(async move {
                            matcher.process_event(event).await;
                            drop(permit);
                        });
                    }
                    None => {
                        info!("ArticleIngested channel closed");
                        break;
                    }
                },
            }
        }

        while in_flight.join_next().await.is_some() {}
        info!("AlertMatcher shutdown complete");
    }

    async fn process_event(&self, event: ArticleIngested) {
        let article = &event.article;
        match self.match_article(article).await {
            Ok(matches) => {
                let created = matches.iter().filter(|m| m.created).count();
                info!(
                    article_id = %article.id,
                    matched = matches.len(),
                    created,
                    "Article matched against alerts"
                );
            }
            Err(MatchError::Incomplete { matches, failures }) => {
                error!(
                    article_id = %article.id,
                    matched = matches.len(),
                    failed = failures.len(),
                    alert_ids = ?failures.iter().map(|f| f.alert_id).collect::<Vec<_>>(),
                    "Some alert matches could not be recorded"
                );
            }
            Err(e) => error!(article_id = %article.id, error = %e, "Alert matching failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigStore, HubConfig};
    use crate::events::{article_ingested_channel, outbound_channel};
    use crate::hub::{ConnectionHandle, ConnectionId, Hub, HubHandle};
    use cvewire_sdk::objects::{Envelope, Identity, MessageType, Role, Severity};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Wraps a [`MemoryAlertStore`], failing `create_match` for one alert and
    /// the first `mark_notified` call.
    struct FlakyStore {
        inner: MemoryAlertStore,
        fail_create_for: Option<i64>,
        fail_next_mark: AtomicBool,
    }

    fn store_error() -> StoreError {
        StoreError::Database(sqlx::Error::PoolTimedOut)
    }

    #[async_trait::async_trait]
    impl AlertStore for FlakyStore {
        async fn active_alerts(&self) -> Result<Vec<Alert>, StoreError> {
            self.inner.active_alerts().await
        }

        async fn create_match(&self, new: &NewAlertMatch) -> Result<bool, StoreError> {
            if self.fail_create_for == Some(new.alert_id) {
                return Err(store_error());
            }
            self.inner.create_match(new).await
        }

        async fn mark_notified(
            &self,
            alert_id: i64,
            article_id: Uuid,
            notified_at: OffsetDateTime,
        ) -> Result<(), StoreError> {
            if self.fail_next_mark.swap(false, Ordering::SeqCst) {
                return Err(store_error());
            }
            self.inner
                .mark_notified(alert_id, article_id, notified_at)
                .await
        }

        async fn matches_for_article(
            &self,
            article_id: Uuid,
        ) -> Result<Vec<StoredMatch>, StoreError> {
            self.inner.matches_for_article(article_id).await
        }
    }

    fn three_matching_alerts() -> Vec<Alert> {
        vec![
            alert(1, Uuid::new_v4(), AlertType::Keyword, "ransomware"),
            alert(2, Uuid::new_v4(), AlertType::Cve, "CVE-2024-12345"),
            alert(3, Uuid::new_v4(), AlertType::Severity, "critical"),
        ]
    }

    fn alert(id: i64, user_id: Uuid, alert_type: AlertType, value: &str) -> Alert {
        Alert {
            id,
            user_id,
            alert_type,
            value: value.to_owned(),
            active: true,
        }
    }

    fn article() -> Article {
        Article {
            id: Uuid::new_v4(),
            title: "New Ransomware Strain Detected".to_owned(),
            summary: String::new(),
            content: String::new(),
            severity: Severity::Critical,
            tags: vec![],
            cves: vec!["CVE-2024-12345".to_owned()],
            vendors: vec!["Fortinet".to_owned()],
            category: Some("ransomware".to_owned()),
            source: None,
            url: None,
            published_at: None,
        }
    }

    fn start_hub() -> (HubHandle, watch::Sender<bool>) {
        let (hub, handle) = Hub::new(ConfigStore::new(HubConfig::default()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(hub.run(shutdown_rx));
        (handle, shutdown_tx)
    }

    async fn connect(hub: &HubHandle, user_id: Uuid) -> crate::events::OutboundReceiver {
        let (tx, mut rx) = outbound_channel(16);
        let identity = Identity {
            user_id,
            role: Role::User,
            expires_at: OffsetDateTime::now_utc() + time::Duration::hours(1),
        };
        hub.register(ConnectionHandle::new(ConnectionId::new(), &identity, tx))
            .await
            .unwrap();
        rx.recv().await.unwrap();
        rx
    }

    #[tokio::test]
    async fn test_match_is_idempotent() {
        let (hub, _shutdown) = start_hub();
        let user = Uuid::new_v4();
        let store = Arc::new(MemoryAlertStore::with_alerts(vec![
            alert(1, user, AlertType::Keyword, "ransomware"),
            alert(2, user, AlertType::Cve, "CVE-2024-12345"),
            alert(3, user, AlertType::Vendor, "juniper"),
        ]));
        let matcher = AlertMatcher::new(store.clone(), NotificationService::new(hub));
        let a = article();

        let first = matcher.match_article(&a).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|m| m.created));
        let recorded = store.matches_for_article(a.id).await.unwrap();

        let second = matcher.match_article(&a).await.unwrap();
        assert_eq!(second.len(), 2);
        assert!(second.iter().all(|m| !m.created));
        // Duplicates report when the match was first recorded.
        assert_eq!(
            second.iter().map(|m| m.matched_at).collect::<Vec<_>>(),
            first.iter().map(|m| m.matched_at).collect::<Vec<_>>()
        );

        let after = store.matches_for_article(a.id).await.unwrap();
        assert_eq!(after.len(), 2);
        assert_eq!(
            after.iter().map(|m| (m.alert_id, m.priority)).collect::<Vec<_>>(),
            recorded.iter().map(|m| (m.alert_id, m.priority)).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_concurrent_runs_record_once() {
        let (hub, _shutdown) = start_hub();
        let user = Uuid::new_v4();
        let store = Arc::new(MemoryAlertStore::with_alerts(vec![alert(
            1,
            user,
            AlertType::Severity,
            "critical",
        )]));
        let matcher = Arc::new(AlertMatcher::new(
            store.clone(),
            NotificationService::new(hub),
        ));
        let a = article();

        let runs: Vec<_> = (0..8)
            .map(|_| {
                let matcher = Arc::clone(&matcher);
                let a = a.clone();
                tokio::spawn(async move { matcher.match_article(&a).await.unwrap() })
            })
            .collect();
        let mut created = 0;
        for run in runs {
            let matches = run.await.unwrap();
            assert_eq!(matches[0].priority, Priority::Critical);
            created += matches.iter().filter(|m| m.created).count();
        }
        assert_eq!(created, 1);
        assert_eq!(store.match_count().await, 1);
    }

    #[tokio::test]
    async fn test_new_match_notifies_owner_and_marks_notified() {
        let (hub, _shutdown) = start_hub();
        let owner = Uuid::new_v4();
        let mut rx = connect(&hub, owner).await;
        let store = Arc::new(MemoryAlertStore::with_alerts(vec![alert(
            5,
            owner,
            AlertType::Category,
            "ransomware",
        )]));
        let matcher = AlertMatcher::new(store.clone(), NotificationService::new(hub));
        let a = article();

        matcher.match_article(&a).await.unwrap();
        let envelope: Envelope = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(envelope.kind, MessageType::AlertMatch);
        let payload: AlertMatchPayload = envelope.payload_as().unwrap();
        assert_eq!(payload.alert_id, 5);
        assert_eq!(payload.priority, Priority::Medium);
        assert_eq!(payload.article.id, a.id);

        let stored = store.matches_for_article(a.id).await.unwrap();
        assert!(stored[0].notified_at.is_some());

        // Re-running does not notify again.
        matcher.match_article(&a).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_mark_notified_failure_does_not_stop_other_alerts() {
        let (hub, _shutdown) = start_hub();
        let store = Arc::new(FlakyStore {
            inner: MemoryAlertStore::with_alerts(three_matching_alerts()),
            fail_create_for: None,
            fail_next_mark: AtomicBool::new(true),
        });
        let matcher = AlertMatcher::new(store.clone(), NotificationService::new(hub));
        let a = article();

        let matches = matcher.match_article(&a).await.unwrap();
        assert_eq!(matches.len(), 3);
        assert!(matches.iter().all(|m| m.created));

        let stored = store.inner.matches_for_article(a.id).await.unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored.iter().filter(|m| m.notified_at.is_none()).count(), 1);
    }

    #[tokio::test]
    async fn test_create_failure_is_reported_after_all_alerts() {
        let (hub, _shutdown) = start_hub();
        let store = Arc::new(FlakyStore {
            inner: MemoryAlertStore::with_alerts(three_matching_alerts()),
            fail_create_for: Some(2),
            fail_next_mark: AtomicBool::new(false),
        });
        let matcher = AlertMatcher::new(store.clone(), NotificationService::new(hub));
        let a = article();

        match matcher.match_article(&a).await {
            Err(MatchError::Incomplete { matches, failures }) => {
                assert_eq!(
                    matches.iter().map(|m| m.alert_id).collect::<Vec<_>>(),
                    vec![1, 3]
                );
                assert_eq!(
                    failures.iter().map(|f| f.alert_id).collect::<Vec<_>>(),
                    vec![2]
                );
            }
            other => panic!("expected an incomplete run, got {other:?}"),
        }
        assert_eq!(store.inner.match_count().await, 2);
    }

    #[tokio::test]
    async fn test_inactive_alerts_are_ignored() {
        let (hub, _shutdown) = start_hub();
        let store = Arc::new(MemoryAlertStore::with_alerts(vec![alert(
            1,
            Uuid::new_v4(),
            AlertType::Keyword,
            "ransomware",
        )]));
        store.set_active(1, false).await;
        let matcher = AlertMatcher::new(store.clone(), NotificationService::new(hub));

        assert!(matcher.match_article(&article()).await.unwrap().is_empty());
        assert_eq!(store.match_count().await, 0);
    }

    #[tokio::test]
    async fn test_run_processes_ingested_articles() {
        let (hub, _hub_shutdown) = start_hub();
        let store = Arc::new(MemoryAlertStore::new());
        store
            .insert_alert(alert(1, Uuid::new_v4(), AlertType::Vendor, "forti"))
            .await;
        let matcher = Arc::new(AlertMatcher::new(
            store.clone(),
            NotificationService::new(hub),
        ));

        let (article_tx, article_rx) = article_ingested_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(matcher.run(shutdown_rx, article_rx, 2));

        for _ in 0..3 {
            article_tx
                .send(ArticleIngested {
                    article: Arc::new(article()),
                })
                .await
                .unwrap();
        }
        drop(article_tx);
        task.await.unwrap();
        assert_eq!(store.match_count().await, 3);
    }
}
