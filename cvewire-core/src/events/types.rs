//! Event type definitions.
//!
//! Events are ephemeral and at-most-once; a dropped event is never
//! replayed.

use cvewire_sdk::objects::Article;
use std::sync::Arc;

/// Emitted by the ingest endpoint for every newly created article.
///
/// Consumed by the `AlertMatcher`. The article is shared rather than
/// copied because the notification path holds it at the same time.
#[derive(Debug, Clone)]
pub struct ArticleIngested {
    pub article: Arc<Article>,
}
