//! HTTP client for the ingest and ops endpoints.
//!
//! Used by the ingestion pipeline to publish articles and announcements,
//! and by operators to read hub statistics.

use reqwest::Client;
use url::Url;

use super::ClientError;
use crate::objects::{Announcement, Article, ArticleEventKind, HubStats, IngestArticle, IngestResponse};
use crate::signature::INGEST_KEY_HEADER;

/// Typed HTTP client for `/internal/*` and `/stats`.
#[derive(Debug, Clone)]
pub struct IngestClient {
    http: Client,
    base_url: Url,
    ingest_key: String,
}

impl IngestClient {
    /// * `base_url` – root URL of the hub server.
    /// * `ingest_key` – plaintext ingest secret sent in `Cvewire-Ingest-Key`.
    pub fn new(base_url: Url, ingest_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            ingest_key: ingest_key.into(),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `POST /internal/articles` – publish a created or updated article.
    pub async fn publish_article(
        &self,
        kind: ArticleEventKind,
        article: Article,
    ) -> Result<IngestResponse, ClientError> {
        let url = self.base_url.join("/internal/articles")?;

        let resp = self
            .http
            .post(url)
            .header(INGEST_KEY_HEADER, &self.ingest_key)
            .json(&IngestArticle { kind, article })
            .send()
            .await?;

        parse_response(resp).await
    }

    /// `POST /internal/announcements` – push a `system.announcement`.
    pub async fn announce(&self, announcement: &Announcement) -> Result<(), ClientError> {
        let url = self.base_url.join("/internal/announcements")?;

        let resp = self
            .http
            .post(url)
            .header(INGEST_KEY_HEADER, &self.ingest_key)
            .json(announcement)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }
        Ok(())
    }

    /// `GET /stats` – live connection, user and channel counts.
    pub async fn stats(&self) -> Result<HubStats, ClientError> {
        let url = self.base_url.join("/stats")?;
        let resp = self.http.get(url).send().await?;
        parse_response(resp).await
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}
