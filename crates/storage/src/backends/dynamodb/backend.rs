//! DynamoDB backend core configuration and [`Backend`] implementation.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::codec::{Codec, JsonCodec};
use crate::core::{Backend, BackendCapability, BackendKind};
use crate::error::{BackendError, StorageError};

use super::client::{KeyValueApi, KeyValueClientError, TableSpec};
use super::item::{KEY_ATTR, SORT_KEY_ATTR};

pub(crate) const BACKEND_NAME: &str = "dynamodb";

/// DynamoDB backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamoBackendConfig {
    /// AWS region.
    #[serde(default)]
    pub region: String,

    /// Table shared by every resource kind.
    #[serde(default = "default_table")]
    pub table: String,

    /// Endpoint override, for local DynamoDB.
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Static credentials. The default provider chain is used when unset.
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Secret paired with `access_key_id`.
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Optional session token for temporary credentials.
    #[serde(default)]
    pub session_token: Option<String>,

    /// Provisioned read capacity for a newly created table.
    #[serde(default = "default_read_capacity")]
    pub read_capacity: i64,

    /// Provisioned write capacity for a newly created table.
    #[serde(default = "default_write_capacity")]
    pub write_capacity: i64,
}

fn default_table() -> String {
    "apimaster".to_string()
}

fn default_read_capacity() -> i64 {
    4
}

fn default_write_capacity() -> i64 {
    1
}

impl Default for DynamoBackendConfig {
    fn default() -> Self {
        Self {
            region: String::new(),
            table: default_table(),
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            read_capacity: default_read_capacity(),
            write_capacity: default_write_capacity(),
        }
    }
}

impl DynamoBackendConfig {
    /// Returns the configuration problems, if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.region.is_empty() {
            errors.push("dynamodb region must be specified".to_string());
        }
        if self.table.is_empty() {
            errors.push("dynamodb table must not be empty".to_string());
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            errors.push(
                "dynamodb access_key_id and secret_access_key must be set together".to_string(),
            );
        }
        if self.read_capacity < 1 || self.write_capacity < 1 {
            errors.push("dynamodb capacities must be positive".to_string());
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    pub(crate) fn table_spec(&self) -> TableSpec {
        TableSpec {
            table: self.table.clone(),
            hash_key: KEY_ATTR.to_string(),
            range_key: SORT_KEY_ATTR.to_string(),
            read_capacity: self.read_capacity,
            write_capacity: self.write_capacity,
        }
    }
}

/// DynamoDB backend: one table for all kinds, one item per object.
pub struct DynamoBackend<C: Codec = JsonCodec> {
    pub(crate) config: DynamoBackendConfig,
    pub(crate) client: Arc<dyn KeyValueApi>,
    pub(crate) codec: C,
}

impl<C: Codec> Debug for DynamoBackend<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoBackend")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DynamoBackend<JsonCodec> {
    /// Creates a backend over an existing client.
    pub fn with_client(config: DynamoBackendConfig, client: Arc<dyn KeyValueApi>) -> Self {
        Self {
            config,
            client,
            codec: JsonCodec::default(),
        }
    }

    /// Builds an SDK client from the configuration.
    #[cfg(feature = "dynamodb")]
    pub async fn connect(config: DynamoBackendConfig) -> Self {
        let client = super::client::DynamoDbClient::connect(&config).await;
        tracing::info!(
            region = %config.region,
            table = %config.table,
            endpoint = ?config.endpoint_url,
            "opened dynamodb backend"
        );
        Self::with_client(config, Arc::new(client))
    }
}

impl<C: Codec> DynamoBackend<C> {
    /// Replaces the codec used to encode stored objects.
    pub fn with_codec<C2: Codec>(self, codec: C2) -> DynamoBackend<C2> {
        DynamoBackend {
            config: self.config,
            client: self.client,
            codec,
        }
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &DynamoBackendConfig {
        &self.config
    }

    pub(crate) fn table(&self) -> &str {
        &self.config.table
    }
}

/// Maps a client error for `key` onto the storage error hierarchy.
pub(crate) fn client_error(key: &str, err: KeyValueClientError) -> StorageError {
    match err {
        KeyValueClientError::ConditionFailed => StorageError::already_exists(key),
        KeyValueClientError::Throttled(message) | KeyValueClientError::Unavailable(message) => {
            StorageError::unavailable(BACKEND_NAME, key, message)
        }
        KeyValueClientError::NotFound(message) | KeyValueClientError::Internal(message) => {
            StorageError::internal(BACKEND_NAME, key, message)
        }
    }
}

#[async_trait]
impl<C: Codec> Backend for DynamoBackend<C> {
    fn kind(&self) -> BackendKind {
        BackendKind::DynamoDB
    }

    fn capabilities(&self) -> Vec<BackendCapability> {
        vec![
            BackendCapability::Crud,
            BackendCapability::LabelSelector,
            BackendCapability::FieldSelector,
            BackendCapability::OffsetPagination,
        ]
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        self.client
            .ensure_table(&self.config.table_spec())
            .await
            .map_err(|e| BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: format!("failed to ensure table {}: {e}", self.config.table),
            })
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        match self.client.describe_table(&self.config.table).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(BackendError::Unavailable {
                backend_name: BACKEND_NAME.to_string(),
                key: String::new(),
                message: format!("table {} does not exist", self.config.table),
            }),
            Err(e) => Err(BackendError::Unavailable {
                backend_name: BACKEND_NAME.to_string(),
                key: String::new(),
                message: format!("Health check failed: {e}"),
            }),
        }
    }
}
