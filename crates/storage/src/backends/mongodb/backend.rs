//! MongoDB backend core configuration and [`Backend`] implementation.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::codec::{Codec, JsonCodec};
use crate::context::RequestContext;
use crate::core::{Backend, BackendCapability, BackendKind};
use crate::error::{BackendError, StorageError, StorageResult};
use crate::types::Resource;

use super::client::{DocumentApi, DocumentClientError, RequestMeta};

pub(crate) const BACKEND_NAME: &str = "mongodb";

/// A MongoDB credential: authentication database, user and password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MongoCredential {
    /// Database the user is defined in.
    #[serde(default = "default_source")]
    pub source: String,
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

fn default_source() -> String {
    "admin".to_string()
}

/// MongoDB backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoBackendConfig {
    /// `host:port` seeds.
    #[serde(default)]
    pub servers: Vec<String>,

    /// Database holding one collection per resource kind.
    #[serde(default = "default_database")]
    pub database: String,

    /// Administrative credential.
    #[serde(default)]
    pub admin_credential: Option<MongoCredential>,

    /// Credential used for regular traffic; preferred over the admin one.
    #[serde(default)]
    pub user_credential: Option<MongoCredential>,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_database() -> String {
    "apimaster".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for MongoBackendConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            database: default_database(),
            admin_credential: None,
            user_credential: None,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl MongoBackendConfig {
    /// Returns the configuration problems, if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.servers.is_empty() {
            errors.push("mongodb servers must be specified".to_string());
        }
        if self.database.is_empty() {
            errors.push("mongodb database must not be empty".to_string());
        }
        for (name, cred) in [
            ("admin", &self.admin_credential),
            ("user", &self.user_credential),
        ] {
            if let Some(cred) = cred {
                if cred.username.is_empty() {
                    errors.push(format!("mongodb {name} credential has no username"));
                }
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// MongoDB backend: one collection per resource kind, one document per
/// object.
pub struct MongoBackend<C: Codec = JsonCodec> {
    pub(crate) config: MongoBackendConfig,
    pub(crate) client: Arc<dyn DocumentApi>,
    pub(crate) codec: C,
    /// Collections whose indexes were ensured by this process.
    indexed: RwLock<HashSet<String>>,
}

impl<C: Codec> Debug for MongoBackend<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoBackend")
            .field("config", &self.config)
            .field("indexed", &self.indexed.read().len())
            .finish_non_exhaustive()
    }
}

impl MongoBackend<JsonCodec> {
    /// Creates a backend over an existing client.
    pub fn with_client(config: MongoBackendConfig, client: Arc<dyn DocumentApi>) -> Self {
        Self {
            config,
            client,
            codec: JsonCodec::default(),
            indexed: RwLock::new(HashSet::new()),
        }
    }

    /// Connects to the configured servers with the official driver.
    #[cfg(feature = "mongodb")]
    pub fn connect(config: MongoBackendConfig) -> StorageResult<Self> {
        let client = super::client::MongoClient::connect(&config).map_err(|e| {
            StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: e.to_string(),
            })
        })?;
        tracing::info!(servers = ?config.servers, database = %config.database, "opened mongodb backend");
        Ok(Self::with_client(config, Arc::new(client)))
    }
}

impl<C: Codec> MongoBackend<C> {
    /// Replaces the codec used to encode stored objects.
    pub fn with_codec<C2: Codec>(self, codec: C2) -> MongoBackend<C2> {
        MongoBackend {
            config: self.config,
            client: self.client,
            codec,
            indexed: self.indexed,
        }
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &MongoBackendConfig {
        &self.config
    }

    /// Returns the collection for `T`, ensuring its indexes on first use.
    pub(crate) async fn collection<T: Resource>(
        &self,
        ctx: &RequestContext,
        key: &str,
    ) -> StorageResult<RequestMeta> {
        let meta = RequestMeta::new(&self.config.database, T::KIND);
        if self.indexed.read().contains(&meta.collection) {
            return Ok(meta);
        }

        ctx.run(async {
            self.client
                .ensure_indexes(&meta)
                .await
                .map_err(|e| client_error(key, e))
        })
        .await?;
        tracing::debug!(collection = %meta.collection, "ensured collection indexes");
        self.indexed.write().insert(meta.collection.clone());
        Ok(meta)
    }
}

/// Maps a client error for `key` onto the storage error hierarchy.
pub(crate) fn client_error(key: &str, err: DocumentClientError) -> StorageError {
    match err {
        DocumentClientError::Duplicate(_) => StorageError::already_exists(key),
        DocumentClientError::Unavailable(message) => {
            StorageError::unavailable(BACKEND_NAME, key, message)
        }
        DocumentClientError::Internal(message) => {
            StorageError::internal(BACKEND_NAME, key, message)
        }
    }
}

#[async_trait]
impl<C: Codec> Backend for MongoBackend<C> {
    fn kind(&self) -> BackendKind {
        BackendKind::MongoDB
    }

    fn capabilities(&self) -> Vec<BackendCapability> {
        vec![
            BackendCapability::Crud,
            BackendCapability::LabelSelector,
            BackendCapability::FieldSelector,
            BackendCapability::OffsetPagination,
            BackendCapability::Expiry,
        ]
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        self.health_check().await
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        self.client
            .ping(&self.config.database)
            .await
            .map_err(|e| BackendError::Unavailable {
                backend_name: BACKEND_NAME.to_string(),
                key: String::new(),
                message: format!("Health check failed: {e}"),
            })
    }
}
