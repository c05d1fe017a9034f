//! Storage configuration.
//!
//! A [`StorageConfig`] selects one backend and carries the settings shared
//! by every store. It deserializes from any serde format:
//!
//! ```
//! use apimaster_storage::config::{BackendConfig, StorageConfig};
//!
//! let config: StorageConfig = serde_json::from_str(r#"{
//!     "backend": { "type": "dynamodb", "region": "us-west-2" },
//!     "request_timeout": "5s"
//! }"#).unwrap();
//!
//! assert!(matches!(config.backend, BackendConfig::DynamoDB(_)));
//! assert_eq!(config.storage_version, "v1");
//! assert_eq!(config.request_timeout.as_secs(), 5);
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[cfg(feature = "sqlite")]
use crate::backends::sqlite::SqliteBackendConfig;
use crate::backends::{dynamodb::DynamoBackendConfig, mongodb::MongoBackendConfig};
use crate::codec::DEFAULT_STORAGE_VERSION;
use crate::core::BackendKind;

/// Backend selection and its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Embedded SQLite database.
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteBackendConfig),
    /// MongoDB deployment.
    MongoDB(MongoBackendConfig),
    /// DynamoDB table.
    DynamoDB(DynamoBackendConfig),
}

impl BackendConfig {
    /// Returns the backend kind this configuration selects.
    pub fn kind(&self) -> BackendKind {
        match self {
            #[cfg(feature = "sqlite")]
            BackendConfig::Sqlite(_) => BackendKind::Sqlite,
            BackendConfig::MongoDB(_) => BackendKind::MongoDB,
            BackendConfig::DynamoDB(_) => BackendKind::DynamoDB,
        }
    }

    fn validate(&self) -> Result<(), Vec<String>> {
        match self {
            #[cfg(feature = "sqlite")]
            BackendConfig::Sqlite(config) => config.validate(),
            BackendConfig::MongoDB(config) => config.validate(),
            BackendConfig::DynamoDB(config) => config.validate(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Sqlite(SqliteBackendConfig::default())
    }
}

/// Top-level storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// The backend to connect to.
    pub backend: BackendConfig,

    /// API version stamped into encoded objects.
    #[serde(default = "default_storage_version")]
    pub storage_version: String,

    /// Deadline applied to contexts from
    /// [`StoreFactory::default_context`](crate::factory::StoreFactory::default_context).
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,
}

fn default_storage_version() -> String {
    DEFAULT_STORAGE_VERSION.to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl StorageConfig {
    /// Creates a configuration for `backend` with default shared settings.
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            backend,
            storage_version: default_storage_version(),
            request_timeout: default_request_timeout(),
        }
    }

    /// Returns every configuration problem, backend ones included.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = self.backend.validate().err().unwrap_or_default();
        if self.storage_version.is_empty() {
            errors.push("storage_version must not be empty".to_string());
        }
        if self.request_timeout.is_zero() {
            errors.push("request_timeout must be greater than zero".to_string());
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[cfg(feature = "sqlite")]
impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(BackendConfig::default())
    }
}

/// Serde module for Duration with humantime format.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mongodb_config_defaults() {
        let config: StorageConfig = serde_json::from_str(
            r#"{"backend": {"type": "mongodb", "servers": ["db-0:27017", "db-1:27017"]}}"#,
        )
        .unwrap();
        assert_eq!(config.backend.kind(), BackendKind::MongoDB);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        let BackendConfig::MongoDB(mongo) = &config.backend else {
            panic!("expected mongodb config");
        };
        assert_eq!(mongo.database, "apimaster");
        assert_eq!(mongo.servers.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let config = StorageConfig {
            storage_version: String::new(),
            request_timeout: Duration::ZERO,
            ..StorageConfig::new(BackendConfig::DynamoDB(DynamoBackendConfig::default()))
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("region"));
    }

    #[test]
    fn test_request_timeout_round_trips_as_text() {
        let config = StorageConfig {
            request_timeout: Duration::from_millis(1500),
            ..StorageConfig::new(BackendConfig::MongoDB(MongoBackendConfig::default()))
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["request_timeout"], "1s 500ms");
        assert_eq!(json["backend"]["type"], "mongodb");
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_default_is_in_memory_sqlite() {
        let config = StorageConfig::default();
        assert_eq!(config.backend.kind(), BackendKind::Sqlite);
        assert!(config.validate().is_ok());
    }
}
