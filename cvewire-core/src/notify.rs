//! Translates domain events into envelopes and hub targets.
//!
//! The hub only knows channels, users and opaque JSON. Everything that
//! knows what an article or an alert is lives here.

use crate::hub::{HubError, HubHandle};
use cvewire_sdk::objects::{
    AlertMatchPayload, Announcement, Article, ArticleSummary, Channel, Envelope, MessageType,
    Severity, slugify,
};
use itertools::Itertools;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error(transparent)]
    Hub(#[from] HubError),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct NotificationService {
    hub: HubHandle,
}

impl NotificationService {
    pub fn new(hub: HubHandle) -> Self {
        Self { hub }
    }

    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Channels an article notification is published to:
    ///
    /// - `articles:all`
    /// - `articles:critical` or `articles:high` by severity
    /// - `articles:category:{slug}` if the article has a category
    /// - `articles:vendor:{name}` for each vendor
    ///
    /// Category and vendor names are slugified first ("Palo Alto Networks"
    /// becomes `palo-alto-networks`). Names with nothing left after that
    /// are skipped.
    pub fn article_channels(article: &Article) -> Vec<Channel> {
        let mut channels = vec![Channel::ArticlesAll];
        match article.severity {
            Severity::Critical => channels.push(Channel::ArticlesCritical),
            Severity::High => channels.push(Channel::ArticlesHigh),
            _ => {}
        }

        if let Some(category) = article.category.as_deref() {
            match Channel::category(&slugify(category)) {
                Ok(channel) => channels.push(channel),
                Err(e) => warn!(
                    article_id = %article.id,
                    category = %category,
                    error = %e,
                    "Skipping category channel"
                ),
            }
        }

        for vendor in &article.vendors {
            match Channel::vendor(&slugify(vendor)) {
                Ok(channel) => channels.push(channel),
                Err(e) => warn!(
                    article_id = %article.id,
                    vendor = %vendor,
                    error = %e,
                    "Skipping vendor channel"
                ),
            }
        }

        // Vendors that slugify alike collapse to one channel.
        channels.into_iter().unique().collect()
    }

    /// Publish `article.new`. Returns the channels it was sent to.
    pub async fn article_published(&self, article: &Article) -> Result<Vec<Channel>, NotifyError> {
        self.publish_article(MessageType::ArticleNew, article).await
    }

    /// Publish `article.updated`. Returns the channels it was sent to.
    pub async fn article_updated(&self, article: &Article) -> Result<Vec<Channel>, NotifyError> {
        self.publish_article(MessageType::ArticleUpdated, article)
            .await
    }

    async fn publish_article(
        &self,
        kind: MessageType,
        article: &Article,
    ) -> Result<Vec<Channel>, NotifyError> {
        let envelope = Envelope::with_payload(kind, &ArticleSummary::from(article))?;
        let channels = Self::article_channels(article);
        self.hub
            .broadcast_many(channels.clone(), &envelope)
            .await?;
        debug!(article_id = %article.id, kind = %kind, channels = channels.len(), "Article published");
        Ok(channels)
    }

    /// Deliver `alert.match` to every connection of the alert's owner.
    ///
    /// This is the `alerts:user` channel: it is addressed by user, never
    /// broadcast.
    pub async fn alert_matched(
        &self,
        user_id: Uuid,
        payload: &AlertMatchPayload,
    ) -> Result<(), NotifyError> {
        let envelope = Envelope::with_payload(MessageType::AlertMatch, payload)?;
        self.hub.send_to_user(user_id, &envelope).await?;
        Ok(())
    }

    /// Publish `system.announcement` on the `system` channel.
    pub async fn announce(&self, announcement: &Announcement) -> Result<(), NotifyError> {
        let envelope = Envelope::with_payload(MessageType::SystemAnnouncement, announcement)?;
        if let Err(e) = self.hub.broadcast(Channel::System, &envelope).await {
            warn!(error = %e, "Failed to publish announcement");
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigStore, HubConfig};
    use crate::events::{OutboundReceiver, outbound_channel};
    use crate::hub::{ConnectionHandle, ConnectionId, Hub};
    use cvewire_sdk::objects::{AlertType, AnnouncementLevel, Identity, Priority, Role};
    use time::OffsetDateTime;
    use tokio::sync::watch;

    fn article(severity: Severity) -> Article {
        Article {
            id: Uuid::new_v4(),
            title: "Critical flaw in edge routers".to_owned(),
            summary: "summary".to_owned(),
            content: String::new(),
            severity,
            tags: vec![],
            cves: vec!["CVE-2024-12345".to_owned()],
            vendors: vec!["Cisco".to_owned(), "cisco".to_owned(), "!!!".to_owned()],
            category: Some("vulnerabilities".to_owned()),
            source: Some("feed".to_owned()),
            url: None,
            published_at: None,
        }
    }

    #[test]
    fn test_article_channels() {
        let channels = NotificationService::article_channels(&article(Severity::Critical));
        assert_eq!(
            channels,
            vec![
                Channel::ArticlesAll,
                Channel::ArticlesCritical,
                Channel::category("vulnerabilities").unwrap(),
                Channel::vendor("cisco").unwrap(),
            ]
        );

        let mut low = article(Severity::Low);
        low.category = None;
        low.vendors.clear();
        assert_eq!(
            NotificationService::article_channels(&low),
            vec![Channel::ArticlesAll]
        );
        assert!(
            NotificationService::article_channels(&article(Severity::High))
                .contains(&Channel::ArticlesHigh)
        );
    }

    #[test]
    fn test_multi_word_names_get_channels() {
        let mut a = article(Severity::Medium);
        a.vendors = vec![
            "Palo Alto Networks".to_owned(),
            "Cisco Systems".to_owned(),
            "cisco  systems".to_owned(),
        ];
        a.category = Some("Zero Day".to_owned());

        let channels: Vec<String> = NotificationService::article_channels(&a)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            channels,
            vec![
                "articles:all",
                "articles:category:zero-day",
                "articles:vendor:palo-alto-networks",
                "articles:vendor:cisco-systems",
            ]
        );
        // Every routed name is one a client can subscribe to.
        for name in &channels {
            assert!(Channel::parse(name).is_ok());
        }
    }

    async fn subscriber(
        hub: &HubHandle,
        user_id: Uuid,
        channels: &[&str],
    ) -> (ConnectionId, OutboundReceiver) {
        let (tx, mut rx) = outbound_channel(16);
        let identity = Identity {
            user_id,
            role: Role::User,
            expires_at: OffsetDateTime::now_utc() + time::Duration::hours(1),
        };
        let id = ConnectionId::new();
        hub.register(ConnectionHandle::new(id, &identity, tx))
            .await
            .unwrap();
        rx.recv().await.unwrap();
        for channel in channels {
            hub.subscribe(id, *channel).await.unwrap();
            rx.recv().await.unwrap();
        }
        (id, rx)
    }

    fn start_hub() -> (HubHandle, watch::Sender<bool>) {
        let (hub, handle) = Hub::new(ConfigStore::new(HubConfig::default()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(hub.run(shutdown_rx));
        (handle, shutdown_tx)
    }

    async fn envelope(rx: &mut OutboundReceiver) -> Envelope {
        serde_json::from_str(&rx.recv().await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_article_published_once_per_subscriber() {
        let (hub, _shutdown) = start_hub();
        let notifier = NotificationService::new(hub.clone());
        let (_id, mut rx) = subscriber(
            &hub,
            Uuid::new_v4(),
            &["articles:all", "articles:critical", "articles:vendor:cisco"],
        )
        .await;

        let a = article(Severity::Critical);
        notifier.article_published(&a).await.unwrap();
        let received = envelope(&mut rx).await;
        assert_eq!(received.kind, MessageType::ArticleNew);
        assert_eq!(received.payload_as::<ArticleSummary>().unwrap().id, a.id);

        notifier.article_updated(&a).await.unwrap();
        assert_eq!(envelope(&mut rx).await.kind, MessageType::ArticleUpdated);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_alert_match_goes_to_owner_only() {
        let (hub, _shutdown) = start_hub();
        let notifier = NotificationService::new(hub.clone());
        let owner = Uuid::new_v4();
        let (_a, mut owner_rx) = subscriber(&hub, owner, &[]).await;
        let (_b, mut other_rx) = subscriber(&hub, Uuid::new_v4(), &["alerts:user"]).await;

        let payload = AlertMatchPayload {
            alert_id: 7,
            alert_type: AlertType::Cve,
            alert_value: "CVE-2024-12345".to_owned(),
            priority: Priority::Critical,
            matched_at: OffsetDateTime::now_utc(),
            article: ArticleSummary::from(&article(Severity::High)),
        };
        notifier.alert_matched(owner, &payload).await.unwrap();
        let received = envelope(&mut owner_rx).await;
        assert_eq!(received.kind, MessageType::AlertMatch);
        assert_eq!(received.payload_as::<AlertMatchPayload>().unwrap(), payload);

        notifier
            .announce(&Announcement {
                title: "t".to_owned(),
                message: "m".to_owned(),
                level: AnnouncementLevel::Info,
            })
            .await
            .unwrap();
        // Nobody is on `system`; the other user saw neither message.
        assert!(hub.subscribe(ConnectionId::new(), "system").await.is_err());
        assert!(other_rx.try_recv().is_err());
    }
}
