//! Builds stores from a [`StorageConfig`].
//!
//! The factory owns one backend instance and hands out typed
//! [`Store`] handles for it. All handles share the backend's pool or client.
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! # async fn example() -> apimaster_storage::StorageResult<()> {
//! use std::sync::Arc;
//!
//! use apimaster_storage::config::StorageConfig;
//! use apimaster_storage::factory::StoreFactory;
//! use apimaster_storage::schema::SchemaRegistry;
//!
//! let registry = Arc::new(SchemaRegistry::builder().build());
//! let factory = StoreFactory::connect(StorageConfig::default(), registry).await?;
//! let ctx = factory.default_context();
//! # let _ = ctx;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::backends::dynamodb::{DynamoBackend, DynamoBackendConfig};
use crate::backends::mongodb::{MongoBackend, MongoBackendConfig};
#[cfg(feature = "sqlite")]
use crate::backends::sqlite::SqliteBackend;
use crate::codec::JsonCodec;
use crate::config::{BackendConfig, StorageConfig};
use crate::context::RequestContext;
use crate::core::{Backend, BackendKind, Store};
use crate::error::{BackendError, StorageError, StorageResult, ValidationError};
use crate::schema::SchemaRegistry;
use crate::types::Resource;

enum Inner {
    #[cfg(feature = "sqlite")]
    Sqlite(Arc<SqliteBackend>),
    MongoDB(Arc<MongoBackend>),
    DynamoDB(Arc<DynamoBackend>),
}

/// Hands out stores backed by a single configured backend.
pub struct StoreFactory {
    inner: Inner,
    registry: Arc<SchemaRegistry>,
    request_timeout: Duration,
}

impl std::fmt::Debug for StoreFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreFactory")
            .field("kind", &self.kind())
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl StoreFactory {
    /// Validates `config`, connects to the backend and initializes it.
    pub async fn connect(
        config: StorageConfig,
        registry: Arc<SchemaRegistry>,
    ) -> StorageResult<Self> {
        if let Err(problems) = config.validate() {
            return Err(ValidationError::InvalidConfig { problems }.into());
        }

        let codec = JsonCodec::new(config.storage_version.clone());
        let inner = match config.backend {
            #[cfg(feature = "sqlite")]
            BackendConfig::Sqlite(sqlite) => Inner::Sqlite(Arc::new(
                SqliteBackend::with_config(sqlite, Arc::clone(&registry))?.with_codec(codec),
            )),
            BackendConfig::MongoDB(mongo) => {
                Inner::MongoDB(Arc::new(connect_mongodb(mongo)?.with_codec(codec)))
            }
            BackendConfig::DynamoDB(dynamo) => {
                Inner::DynamoDB(Arc::new(connect_dynamodb(dynamo).await?.with_codec(codec)))
            }
        };

        let factory = Self {
            inner,
            registry,
            request_timeout: config.request_timeout,
        };
        factory.backend().initialize().await?;
        tracing::info!(
            backend = %factory.kind(),
            kinds = factory.registry.len(),
            "storage factory ready"
        );
        Ok(factory)
    }

    /// Wraps an already constructed MongoDB backend.
    pub fn from_mongodb(backend: MongoBackend, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            inner: Inner::MongoDB(Arc::new(backend)),
            registry,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Wraps an already constructed DynamoDB backend.
    pub fn from_dynamodb(backend: DynamoBackend, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            inner: Inner::DynamoDB(Arc::new(backend)),
            registry,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the deadline used by [`default_context`](Self::default_context).
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Returns a store for resources of type `T`.
    ///
    /// Relational backends need `T` registered in the schema registry;
    /// unregistered kinds fail on first use.
    pub fn store<T: Resource>(&self) -> Arc<dyn Store<T>> {
        match &self.inner {
            #[cfg(feature = "sqlite")]
            Inner::Sqlite(backend) => Arc::clone(backend) as Arc<dyn Store<T>>,
            Inner::MongoDB(backend) => Arc::clone(backend) as Arc<dyn Store<T>>,
            Inner::DynamoDB(backend) => Arc::clone(backend) as Arc<dyn Store<T>>,
        }
    }

    /// Returns the backend lifecycle handle.
    pub fn backend(&self) -> Arc<dyn Backend> {
        match &self.inner {
            #[cfg(feature = "sqlite")]
            Inner::Sqlite(backend) => Arc::clone(backend) as Arc<dyn Backend>,
            Inner::MongoDB(backend) => Arc::clone(backend) as Arc<dyn Backend>,
            Inner::DynamoDB(backend) => Arc::clone(backend) as Arc<dyn Backend>,
        }
    }

    /// Returns the configured backend kind.
    pub fn kind(&self) -> BackendKind {
        match &self.inner {
            #[cfg(feature = "sqlite")]
            Inner::Sqlite(_) => BackendKind::Sqlite,
            Inner::MongoDB(_) => BackendKind::MongoDB,
            Inner::DynamoDB(_) => BackendKind::DynamoDB,
        }
    }

    /// Returns the schema registry shared with the backend.
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// A fresh context carrying the configured request timeout.
    pub fn default_context(&self) -> RequestContext {
        RequestContext::with_timeout(self.request_timeout)
    }
}

#[cfg(any(not(feature = "mongodb"), not(feature = "dynamodb")))]
fn feature_disabled(backend: &str) -> StorageError {
    StorageError::Backend(BackendError::ConnectionFailed {
        backend_name: backend.to_string(),
        message: format!("built without the `{backend}` feature"),
    })
}

#[cfg(feature = "mongodb")]
fn connect_mongodb(config: MongoBackendConfig) -> StorageResult<MongoBackend> {
    MongoBackend::connect(config)
}

#[cfg(not(feature = "mongodb"))]
fn connect_mongodb(_config: MongoBackendConfig) -> StorageResult<MongoBackend> {
    Err(feature_disabled("mongodb"))
}

#[cfg(feature = "dynamodb")]
async fn connect_dynamodb(config: DynamoBackendConfig) -> StorageResult<DynamoBackend> {
    Ok(DynamoBackend::connect(config).await)
}

#[cfg(not(feature = "dynamodb"))]
async fn connect_dynamodb(_config: DynamoBackendConfig) -> StorageResult<DynamoBackend> {
    Err(feature_disabled("dynamodb"))
}
