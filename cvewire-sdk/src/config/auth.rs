//! Identity token verification settings.

/// Secret used to verify identity tokens presented at upgrade time.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    secret: Box<[u8]>,
}

impl AuthConfig {
    pub fn new(secret: impl Into<Box<[u8]>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn secret_bytes(&self) -> &[u8] {
        &self.secret
    }
}
