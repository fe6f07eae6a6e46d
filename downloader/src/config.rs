use crate::retry::RetryPolicy;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("retry.max_attempts must be at least 1")]
    InvalidMaxAttempts,

    #[error("retry.min_delay_ms cannot exceed retry.max_delay_ms")]
    InvalidRetryDelays,

    #[error("http_timeout_secs cannot be 0")]
    InvalidHttpTimeout,
}

/// Downloader service configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for transfer requests
    pub listener: Listener,
    /// Admin listener for health and readiness checks
    pub admin_listener: Listener,
    /// Root directory for per-request scratch directories. Defaults to the
    /// system temporary directory.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    /// Connect and idle read timeout for outbound HTTP requests
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub secret_store: SecretStoreConfig,
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
}

fn default_http_timeout_secs() -> u64 {
    300
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.http_timeout_secs == 0 {
            return Err(ValidationError::InvalidHttpTimeout);
        }

        self.retry.validate()
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Backoff settings shared by token acquisition, data fetch and upload
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub multiplier_ms: u64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            multiplier_ms: 1000,
            min_delay_ms: 1000,
            max_delay_ms: 2000,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::InvalidMaxAttempts);
        }
        if self.min_delay_ms > self.max_delay_ms {
            return Err(ValidationError::InvalidRetryDelays);
        }
        Ok(())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts,
            multiplier: Duration::from_millis(config.multiplier_ms),
            min_delay: Duration::from_millis(config.min_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum SecretStoreConfig {
    #[default]
    Gcp,
    Filesystem { base_dir: PathBuf },
}

#[derive(Clone, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum ObjectStoreConfig {
    #[default]
    Gcs,
    Filesystem { base_dir: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
listener:
    host: "0.0.0.0"
    port: 8080
admin_listener:
    host: "127.0.0.1"
    port: 8081
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.http_timeout_secs, 300);
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.secret_store, SecretStoreConfig::Gcp);
        assert_eq!(config.object_store, ObjectStoreConfig::Gcs);
        assert_eq!(config.scratch_root(), std::env::temp_dir());
        assert_eq!(RetryPolicy::from(&config.retry), RetryPolicy::default());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
listener: {host: "0.0.0.0", port: 8080}
admin_listener: {host: "127.0.0.1", port: 8081}
scratch_dir: /var/tmp/downloads
http_timeout_secs: 60
retry:
    max_attempts: 5
    max_delay_ms: 8000
secret_store:
    type: filesystem
    base_dir: /etc/downloader/secrets
object_store:
    type: filesystem
    base_dir: /srv/objects
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.scratch_root(), PathBuf::from("/var/tmp/downloads"));
        assert_eq!(config.http_timeout_secs, 60);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.min_delay_ms, 1000);
        assert_eq!(config.retry.max_delay_ms, 8000);
        assert_eq!(
            config.secret_store,
            SecretStoreConfig::Filesystem {
                base_dir: "/etc/downloader/secrets".into()
            }
        );
        assert_eq!(
            config.object_store,
            ObjectStoreConfig::Filesystem {
                base_dir: "/srv/objects".into()
            }
        );
    }

    #[test]
    fn test_validation_errors() {
        let base_config: Config = serde_yaml::from_str(
            r#"
listener: {host: "0.0.0.0", port: 8080}
admin_listener: {host: "127.0.0.1", port: 8081}
"#,
        )
        .unwrap();

        let mut config = base_config.clone();
        config.admin_listener.port = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidPort));

        let mut config = base_config.clone();
        config.retry.max_attempts = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidMaxAttempts));

        let mut config = base_config.clone();
        config.retry.min_delay_ms = 5000;
        assert_eq!(config.validate(), Err(ValidationError::InvalidRetryDelays));

        let mut config = base_config;
        config.http_timeout_secs = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidHttpTimeout));
    }

    #[test]
    fn test_deserialization_errors() {
        // Unknown store type
        assert!(
            serde_yaml::from_str::<ObjectStoreConfig>("type: s3").is_err()
        );

        // Filesystem store without base_dir
        assert!(
            serde_yaml::from_str::<SecretStoreConfig>("type: filesystem").is_err()
        );

        // Missing listener
        assert!(
            serde_yaml::from_str::<Config>(
                r#"
admin_listener: {host: "127.0.0.1", port: 8081}
"#
            )
            .is_err()
        );
    }
}
