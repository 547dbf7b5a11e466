//! Identity verification at upgrade time.

use crate::config::AuthConfig;
use async_trait::async_trait;
use cvewire_sdk::objects::Identity;
use cvewire_sdk::signature::{SignatureError, verify_identity_token};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing identity token")]
    MissingToken,
    #[error("invalid identity token: {0}")]
    InvalidToken(#[from] SignatureError),
}

/// Turns a bearer token into an [`Identity`].
///
/// The hub never issues credentials; implementations only check them.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Verifies HMAC-signed identity tokens against the configured secret.
///
/// Reads the secret on every call, so a reloaded secret applies to the
/// next upgrade.
pub struct SignedTokenAuthenticator {
    config: Arc<RwLock<AuthConfig>>,
}

impl SignedTokenAuthenticator {
    pub fn new(config: Arc<RwLock<AuthConfig>>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Authenticator for SignedTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let config = self.config.read().await;
        Ok(verify_identity_token(token, config.secret_bytes())?)
    }
}
