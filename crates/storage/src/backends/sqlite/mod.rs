//! SQLite backend implementation.
//!
//! Each registered resource kind is stored in its own table. A row holds the
//! resource key, the encoded object and zero or more mirrored columns used
//! only for filtering. In-memory databases are meant for tests; file-based
//! databases run in WAL mode.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use apimaster_storage::backends::sqlite::SqliteBackend;
//! use apimaster_storage::schema::{ColumnType, SchemaDescriptor, SchemaRegistry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = SchemaRegistry::builder()
//!     .register_kind(
//!         "Widget",
//!         SchemaDescriptor::builder("widgets")
//!             .resource_key("metadata.name", "name")
//!             .column("spec.count", "count", ColumnType::Integer),
//!     )?
//!     .build();
//!
//! let backend = SqliteBackend::in_memory(Arc::new(registry))?;
//! backend.init_schema()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Schema
//!
//! The descriptor above produces:
//!
//! ```sql
//! CREATE TABLE widgets (
//!     name TEXT NOT NULL UNIQUE,   -- resource key: last segment of the storage key
//!     rawobj BLOB NOT NULL,        -- encoded object, the only thing decoded on read
//!     count INTEGER                -- mirrored from spec.count
//! );
//! CREATE INDEX idx_widgets_count ON widgets (count);
//! ```

mod backend;
mod query_builder;
mod schema;
mod storage;

pub use backend::{SqliteBackend, SqliteBackendConfig};
pub use query_builder::{SqlFragment, SqlParam, SqlTranslator};
pub use schema::SCHEMA_VERSION;
