//! Ingest API handlers.
//!
//! Called by the ingestion pipeline; every endpoint requires the
//! `Cvewire-Ingest-Key` header.
//!
//! # Endpoints
//!
//! - `POST /articles`      – fan out a created or updated article
//! - `POST /announcements` – publish a `system.announcement`

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use cvewire_core::events::ArticleIngested;
use cvewire_core::hub::HubError;
use cvewire_core::notify::NotifyError;
use cvewire_sdk::objects::{Announcement, ArticleEventKind, IngestArticle, IngestResponse};
use std::sync::Arc;

use crate::api::extractors::IngestKey;
use crate::state::AppState;

/// Build the ingest router, nested under `/internal`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/articles", post(ingest_article))
        .route("/announcements", post(announce))
}

/// `POST /articles`: publish `article.new` or `article.updated`.
///
/// Created articles are also queued for alert matching. The response
/// lists the channels the notification went to.
async fn ingest_article(
    State(state): State<AppState>,
    _key: IngestKey,
    Json(IngestArticle { kind, article }): Json<IngestArticle>,
) -> Result<impl IntoResponse, IngestApiError> {
    if article.title.trim().is_empty() {
        return Err(IngestApiError::InvalidBody("title must not be empty"));
    }

    let article = Arc::new(article);
    let channels = match kind {
        ArticleEventKind::Created => state.notifier.article_published(&article).await?,
        ArticleEventKind::Updated => state.notifier.article_updated(&article).await?,
    };

    if kind == ArticleEventKind::Created {
        state
            .article_tx
            .send(ArticleIngested {
                article: Arc::clone(&article),
            })
            .await
            .map_err(|_| IngestApiError::MatcherUnavailable)?;
    }

    tracing::info!(
        article_id = %article.id,
        kind = ?kind,
        severity = %article.severity,
        channels = channels.len(),
        "Article ingested"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            article_id: article.id,
            channels: channels.iter().map(ToString::to_string).collect(),
        }),
    ))
}

/// `POST /announcements`: broadcast on the `system` channel.
async fn announce(
    State(state): State<AppState>,
    _key: IngestKey,
    Json(announcement): Json<Announcement>,
) -> Result<impl IntoResponse, IngestApiError> {
    if announcement.title.trim().is_empty() {
        return Err(IngestApiError::InvalidBody("title must not be empty"));
    }
    state.notifier.announce(&announcement).await?;
    tracing::info!(level = ?announcement.level, "Announcement published");
    Ok(StatusCode::ACCEPTED)
}

/// Errors that can occur in ingest handlers.
#[derive(Debug)]
enum IngestApiError {
    InvalidBody(&'static str),
    Notify(NotifyError),
    /// The alert matcher is no longer consuming articles.
    MatcherUnavailable,
}

impl From<NotifyError> for IngestApiError {
    fn from(e: NotifyError) -> Self {
        IngestApiError::Notify(e)
    }
}

impl IntoResponse for IngestApiError {
    fn into_response(self) -> Response {
        match self {
            IngestApiError::InvalidBody(reason) => {
                (StatusCode::UNPROCESSABLE_ENTITY, reason).into_response()
            }
            IngestApiError::Notify(NotifyError::Hub(HubError::HubClosed)) => {
                tracing::error!("Ingest API: hub is not running");
                (StatusCode::SERVICE_UNAVAILABLE, "hub unavailable").into_response()
            }
            IngestApiError::Notify(e) => {
                tracing::error!(error = %e, "Ingest API notification error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            IngestApiError::MatcherUnavailable => {
                tracing::error!("Ingest API: alert matcher channel closed");
                (StatusCode::SERVICE_UNAVAILABLE, "alert matcher unavailable").into_response()
            }
        }
    }
}
