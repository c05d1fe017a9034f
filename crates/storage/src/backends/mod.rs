//! Database backend implementations.
//!
//! Each backend implements [`Store`](crate::core::Store) and
//! [`Backend`](crate::core::Backend) over a different data model. The store
//! logic for MongoDB and DynamoDB is always compiled against a client trait;
//! the feature flag only pulls in the real network client.
//!
//! # Available Backends
//!
//! | Backend | Feature | Data model |
//! |---------|---------|------------|
//! | SQLite | `sqlite` | Table per kind, raw object plus mirrored filter columns |
//! | MongoDB | `mongodb` | Collection per kind, serialized object matched by regex |
//! | DynamoDB | `dynamodb` | One shared table, object fields as native attributes |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use apimaster_storage::backends::sqlite::SqliteBackend;
//! use apimaster_storage::schema::SchemaRegistry;
//!
//! let registry = Arc::new(SchemaRegistry::builder().build());
//!
//! // In-memory database, for tests
//! let backend = SqliteBackend::in_memory(registry.clone())?;
//!
//! // Or a file-based database
//! let backend = SqliteBackend::open("./data/apimaster.db", registry)?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub mod dynamodb;
pub mod mongodb;

#[cfg(test)]
pub(crate) mod testing;
