//! Application state shared across all request handlers.

use cvewire_core::auth::{Authenticator, SignedTokenAuthenticator};
use cvewire_core::config::SharedConfig;
use cvewire_core::events::ArticleIngestedSender;
use cvewire_core::hub::HubHandle;
use cvewire_core::notify::NotificationService;
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc
/// or a channel handle).
#[derive(Clone)]
pub struct AppState {
    /// Configuration sections (reloaded via SIGHUP).
    pub config: SharedConfig,
    /// The one hub of this process.
    pub hub: HubHandle,
    pub notifier: NotificationService,
    /// Verifies identity tokens at WebSocket upgrade.
    pub authenticator: Arc<dyn Authenticator>,
    /// Feeds newly created articles to the alert matcher.
    pub article_tx: ArticleIngestedSender,
}

impl AppState {
    /// Create the state with the signed-token authenticator reading
    /// `config.auth`.
    pub fn new(config: SharedConfig, hub: HubHandle, article_tx: ArticleIngestedSender) -> Self {
        let authenticator = Arc::new(SignedTokenAuthenticator::new(config.auth.clone()));
        Self {
            notifier: NotificationService::new(hub.clone()),
            config,
            hub,
            authenticator,
            article_tx,
        }
    }
}
