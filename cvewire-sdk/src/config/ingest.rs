//! Ingest endpoint authentication.

use argon2::{Argon2, PasswordHash, PasswordVerifier};

/// Ingest configuration with hashed secret.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// The argon2 hashed ingest secret.
    pub secret_hash: String,
}

impl IngestConfig {
    pub fn new(secret_hash: String) -> Self {
        Self { secret_hash }
    }

    /// Verify a plaintext key presented by the ingestion pipeline.
    pub fn verify_secret(&self, plaintext: &str) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(&self.secret_hash) else {
            return false;
        };

        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::{
        Argon2, PasswordHasher,
        password_hash::{SaltString, rand_core::OsRng},
    };

    #[test]
    fn test_verify_secret() {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(b"pipeline-key", &salt)
            .unwrap()
            .to_string();

        let config = IngestConfig::new(hash);

        assert!(config.verify_secret("pipeline-key"));
        assert!(!config.verify_secret("wrong-key"));
    }

    #[test]
    fn test_unparseable_hash_never_verifies() {
        let config = IngestConfig::new("plaintext".into());
        assert!(!config.verify_secret("plaintext"));
    }
}
