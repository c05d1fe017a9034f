//! SQLite backend implementation.

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, InterruptHandle, OpenFlags};
use serde::{Deserialize, Serialize};

use crate::codec::{Codec, JsonCodec};
use crate::context::RequestContext;
use crate::core::{Backend, BackendCapability, BackendKind};
use crate::error::{BackendError, StorageError, StorageResult};
use crate::schema::SchemaRegistry;

use super::schema;

pub(crate) const BACKEND_NAME: &str = "sqlite";

/// SQLite backend for API object storage.
///
/// Each registered resource kind gets its own table. Statements run on the
/// blocking thread pool; a cancelled request interrupts its statement.
pub struct SqliteBackend<C: Codec = JsonCodec> {
    pool: Pool<SqliteConnectionManager>,
    config: SqliteBackendConfig,
    is_memory: bool,
    registry: Arc<SchemaRegistry>,
    pub(crate) codec: C,
}

impl<C: Codec> Debug for SqliteBackend<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .field("registered_kinds", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// Configuration for the SQLite backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteBackendConfig {
    /// Database file path, or `:memory:`.
    #[serde(default = "default_path")]
    pub path: String,

    /// Maximum number of connections in the pool. In-memory databases
    /// always use a single connection.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable WAL mode for better concurrency.
    #[serde(default = "default_true")]
    pub enable_wal: bool,
}

fn default_path() -> String {
    ":memory:".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for SqliteBackendConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
        }
    }
}

impl SqliteBackendConfig {
    /// Returns the configuration problems, if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.path.is_empty() {
            errors.push("sqlite path must not be empty".to_string());
        }
        if self.max_connections == 0 {
            errors.push("sqlite max_connections must be at least 1".to_string());
        }
        if self.min_connections > self.max_connections {
            errors.push(format!(
                "sqlite min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            ));
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

impl SqliteBackend<JsonCodec> {
    /// Creates a new in-memory SQLite backend.
    pub fn in_memory(registry: Arc<SchemaRegistry>) -> StorageResult<Self> {
        Self::with_config(SqliteBackendConfig::default(), registry)
    }

    /// Opens or creates a file-based SQLite database.
    pub fn open<P: AsRef<Path>>(path: P, registry: Arc<SchemaRegistry>) -> StorageResult<Self> {
        let config = SqliteBackendConfig {
            path: path.as_ref().to_string_lossy().into_owned(),
            ..Default::default()
        };
        Self::with_config(config, registry)
    }

    /// Creates a backend with custom configuration.
    pub fn with_config(
        config: SqliteBackendConfig,
        registry: Arc<SchemaRegistry>,
    ) -> StorageResult<Self> {
        let is_memory = config.path == ":memory:";
        let busy_timeout = Duration::from_millis(u64::from(config.busy_timeout_ms));

        // Every connection to ":memory:" opens a private database, so an
        // in-memory pool gets exactly one connection.
        let (manager, max_size) = if is_memory {
            (SqliteConnectionManager::memory(), 1)
        } else {
            let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
                | OpenFlags::SQLITE_OPEN_URI;
            (
                SqliteConnectionManager::file(&config.path).with_flags(flags),
                config.max_connections,
            )
        };
        let manager = manager.with_init(move |conn| conn.busy_timeout(busy_timeout));

        let mut builder = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(config.min_connections.min(max_size)))
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms));
        if is_memory {
            // Recycling the only connection would drop the database.
            builder = builder.max_lifetime(None).idle_timeout(None);
        }
        let pool = builder
            .build(manager)
            .map_err(|e| {
                StorageError::Backend(BackendError::ConnectionFailed {
                    backend_name: BACKEND_NAME.to_string(),
                    message: e.to_string(),
                })
            })?;

        let backend = Self {
            pool,
            config,
            is_memory,
            registry,
            codec: JsonCodec::default(),
        };

        backend.configure_connection()?;

        tracing::info!(
            path = %backend.config.path,
            kinds = backend.registry.len(),
            "opened sqlite backend"
        );
        Ok(backend)
    }
}

impl<C: Codec> SqliteBackend<C> {
    /// Replaces the codec used to encode stored objects.
    pub fn with_codec<C2: Codec>(self, codec: C2) -> SqliteBackend<C2> {
        SqliteBackend {
            pool: self.pool,
            config: self.config,
            is_memory: self.is_memory,
            registry: self.registry,
            codec,
        }
    }

    /// Creates a table for every registered resource kind.
    pub fn init_schema(&self) -> StorageResult<()> {
        let conn = self.get_connection()?;
        schema::initialize_schema(&conn, &self.registry)
    }

    /// Get a connection from the pool.
    pub(crate) fn get_connection(
        &self,
    ) -> StorageResult<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| {
            StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: e.to_string(),
            })
        })
    }

    /// Runs `op` with a pooled connection on the blocking thread pool.
    ///
    /// If `ctx` ends first, the running statement is interrupted and the
    /// context error is returned without waiting for it.
    pub(crate) async fn with_connection<R, F>(&self, ctx: &RequestContext, op: F) -> StorageResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&Connection) -> StorageResult<R> + Send + 'static,
    {
        ctx.check()?;

        let pool = self.pool.clone();
        let interrupt: Arc<Mutex<Option<InterruptHandle>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&interrupt);

        let task = tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            *slot.lock() = Some(conn.get_interrupt_handle());
            let result = op(&conn);
            slot.lock().take();
            result
        });

        ctx.run_or_abort(
            async move {
                task.await.map_err(|e| {
                    StorageError::Backend(BackendError::Internal {
                        backend_name: BACKEND_NAME.to_string(),
                        key: String::new(),
                        message: format!("blocking task failed: {e}"),
                        source: None,
                    })
                })?
            },
            || {
                if let Some(handle) = interrupt.lock().take() {
                    handle.interrupt();
                }
            },
        )
        .await
    }

    /// Configure connection settings.
    fn configure_connection(&self) -> StorageResult<()> {
        if !self.config.enable_wal || self.is_memory {
            return Ok(());
        }

        let conn = self.get_connection()?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .map_err(|e| {
            StorageError::Backend(BackendError::Internal {
                backend_name: BACKEND_NAME.to_string(),
                key: String::new(),
                message: format!("Failed to enable WAL mode: {}", e),
                source: None,
            })
        })?;
        Ok(())
    }

    /// Returns whether this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &SqliteBackendConfig {
        &self.config
    }

    /// Returns the schema registry.
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }
}

#[async_trait]
impl<C: Codec> Backend for SqliteBackend<C> {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn capabilities(&self) -> Vec<BackendCapability> {
        vec![
            BackendCapability::Crud,
            BackendCapability::LabelSelector,
            BackendCapability::FieldSelector,
            BackendCapability::OffsetPagination,
            BackendCapability::FieldLevelUpdate,
        ]
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        self.init_schema().map_err(|e| BackendError::Internal {
            backend_name: BACKEND_NAME.to_string(),
            key: String::new(),
            message: format!("Failed to initialize schema: {}", e),
            source: None,
        })
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let conn = self
            .get_connection()
            .map_err(|_| BackendError::Unavailable {
                backend_name: BACKEND_NAME.to_string(),
                key: String::new(),
                message: "Failed to get connection".to_string(),
            })?;
        conn.query_row("SELECT 1", [], |_| Ok(()))
            .map_err(|e| BackendError::Unavailable {
                backend_name: BACKEND_NAME.to_string(),
                key: String::new(),
                message: format!("Health check failed: {}", e),
            })?;
        Ok(())
    }
}
