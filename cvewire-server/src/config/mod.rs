//! Configuration module for cvewire-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables. Also handles ingest secret hashing.

pub mod file;

use crate::config::file::FileConfig;
use cvewire_core::config::{
    AuthConfig, HubConfig, IngestConfig, MatcherConfig, ServerConfig, SharedConfig,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("password hashing error: {0}")]
    HashError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub hub: HubConfig,
    pub auth: AuthConfig,
    pub ingest: IngestConfig,
    pub matcher: MatcherConfig,
}

impl LoadedConfig {
    /// Convert into a SharedConfig with one lock or store per section.
    pub fn into_shared(self) -> SharedConfig {
        SharedConfig::new(self.server, self.hub, self.auth, self.ingest, self.matcher)
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Hash the ingest secret if it's plaintext (and rewrite the file)
    /// 5. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        self.validate(&file_config)?;

        if !file_config.is_ingest_secret_hashed() {
            file_config.ingest.secret = self.hash_secret(&file_config.ingest.secret)?;
            // The override is a runtime choice, not something to persist.
            let mut persisted = file_config.clone();
            if self.listen_override.is_some() {
                let on_disk: FileConfig = toml::from_str(&config_content)?;
                persisted.server.listen = on_disk.server.listen;
            }
            self.rewrite_config(&persisted)?;
            tracing::info!("Ingest secret hashed and config file updated");
        }

        Ok(build_loaded_config(file_config))
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let hub = &config.hub;
        let positive = [
            ("hub.max_connections_per_user", hub.max_connections_per_user),
            (
                "hub.max_subscriptions_per_connection",
                hub.max_subscriptions_per_connection,
            ),
            ("hub.send_queue_capacity", hub.send_queue_capacity),
            ("hub.max_message_size", hub.max_message_size),
            ("matcher.concurrency", config.matcher.concurrency),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ValidationError(format!(
                "{name} must be greater than zero"
            )));
        }

        if hub.heartbeat_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "hub.heartbeat_interval_secs must be greater than zero".into(),
            ));
        }
        // Clients answer heartbeats; a deadline shorter than the interval
        // would time out healthy connections.
        if hub.read_deadline_secs <= hub.heartbeat_interval_secs {
            return Err(ConfigError::ValidationError(format!(
                "hub.read_deadline_secs ({}) must exceed hub.heartbeat_interval_secs ({})",
                hub.read_deadline_secs, hub.heartbeat_interval_secs
            )));
        }

        if config.auth.token_secret.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.token_secret must not be empty".into(),
            ));
        }
        if config.ingest.secret.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "ingest.secret must not be empty".into(),
            ));
        }
        Ok(())
    }

    fn hash_secret(&self, plaintext: &str) -> Result<String, ConfigError> {
        use argon2::{
            Argon2, PasswordHasher,
            password_hash::{SaltString, rand_core::OsRng},
        };

        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ConfigError::HashError(e.to_string()))
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        // Write atomically: write to temp file, then rename
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    let hub = file_config.hub;
    LoadedConfig {
        server: ServerConfig {
            listen: file_config.server.listen,
        },
        hub: HubConfig {
            max_connections_per_user: hub.max_connections_per_user,
            max_subscriptions_per_connection: hub.max_subscriptions_per_connection,
            send_queue_capacity: hub.send_queue_capacity,
            max_consecutive_drops: hub.max_consecutive_drops,
            heartbeat_interval: Duration::from_secs(hub.heartbeat_interval_secs),
            read_deadline: Duration::from_secs(hub.read_deadline_secs),
            token_expiry_warning: Duration::from_secs(hub.token_expiry_warning_secs),
            max_message_size: hub.max_message_size,
            max_malformed_messages: hub.max_malformed_messages,
        },
        auth: AuthConfig::new(file_config.auth.token_secret.into_bytes()),
        ingest: IngestConfig::new(file_config.ingest.secret),
        matcher: MatcherConfig {
            concurrency: file_config.matcher.concurrency,
        },
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TempConfig(PathBuf);

    impl TempConfig {
        fn new(contents: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "cvewire-config-{}-{}.toml",
                std::process::id(),
                uuid::Uuid::new_v4()
            ));
            std::fs::write(&path, contents).unwrap();
            Self(path)
        }
    }

    impl Drop for TempConfig {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    const CONFIG: &str = r#"
[server]
listen = "127.0.0.1:3000"

[hub]
max_connections_per_user = 3
heartbeat_interval_secs = 10
read_deadline_secs = 25

[auth]
token_secret = "token-secret"

[ingest]
secret = "pipeline-key"
"#;

    #[test]
    fn test_load_hashes_ingest_secret_and_rewrites_file() {
        let file = TempConfig::new(CONFIG);
        let override_addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let loader = ConfigLoader::new(&file.0, Some(override_addr));

        let loaded = loader.load().unwrap();
        assert_eq!(loaded.server.listen, override_addr);
        assert_eq!(loaded.hub.max_connections_per_user, 3);
        assert_eq!(loaded.hub.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(loaded.hub.read_deadline, Duration::from_secs(25));
        assert_eq!(loaded.auth.secret_bytes(), b"token-secret");
        assert!(loaded.ingest.verify_secret("pipeline-key"));
        assert!(!loaded.ingest.verify_secret("wrong"));

        let rewritten: FileConfig =
            toml::from_str(&std::fs::read_to_string(&file.0).unwrap()).unwrap();
        assert!(rewritten.is_ingest_secret_hashed());
        assert_eq!(rewritten.server.listen.port(), 3000);

        // A second load keeps the existing hash.
        let reloaded = loader.reload().unwrap();
        assert_eq!(reloaded.ingest.secret_hash, loaded.ingest.secret_hash);
    }

    #[test]
    fn test_read_deadline_must_exceed_heartbeat() {
        let file = TempConfig::new(&CONFIG.replace("read_deadline_secs = 25", "read_deadline_secs = 10"));
        let err = ConfigLoader::new(&file.0, None).load().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        let file = TempConfig::new(
            &CONFIG.replace("max_connections_per_user = 3", "max_connections_per_user = 0"),
        );
        let err = ConfigLoader::new(&file.0, None).load().unwrap_err();
        assert!(err.to_string().contains("max_connections_per_user"));
    }

    #[test]
    fn test_missing_file() {
        let loader = ConfigLoader::new("/nonexistent/cvewire-config.toml", None);
        assert!(matches!(loader.load(), Err(ConfigError::IoError(_))));
    }
}
