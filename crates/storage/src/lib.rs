//! APIMaster Storage Layer
//!
//! This crate persists Kubernetes-style API objects behind one small
//! contract, [`Store`], and ships three interchangeable backends for it.
//! Callers pick a backend through configuration and never see which data
//! model sits underneath.
//!
//! # Features
//!
//! - **Six operations**: create, delete, get, list, guaranteed update, backend name
//! - **Selectors**: label and field selectors translated to each backend's native filter
//! - **Pagination**: page number and page size with a total item count
//! - **Cancellation**: every call observes a [`RequestContext`] deadline and token
//!
//! # Backend Features
//!
//! ```toml
//! [dependencies]
//! apimaster-storage = { version = "0.1", features = ["mongodb", "dynamodb"] }
//! ```
//!
//! - `sqlite` (default) - SQLite with in-memory and file modes
//! - `mongodb` - MongoDB network client
//! - `dynamodb` - DynamoDB network client
//!
//! # Architecture
//!
//! - [`types`] - Objects, lists, selectors, predicates and pagination
//! - [`core`] - The [`Store`] and [`Backend`] traits
//! - [`codec`] / [`decoder`] - Encoding objects and stamping resource versions
//! - [`schema`] - Relational table layouts per kind
//! - [`backends`] - SQLite, MongoDB and DynamoDB implementations
//! - [`config`] / [`factory`] - Selecting and building a backend
//!
//! # Quick Start
//!
//! ```
//! use apimaster_storage::types::{build_page, PageRequest, SelectionPredicate};
//!
//! let predicate = SelectionPredicate::parse(
//!     "tier=prod,!canary",
//!     "metadata.namespace=default",
//!     Some(PageRequest::new(1, 20)),
//! )
//! .unwrap();
//! assert_eq!(predicate.requirements().len(), 3);
//!
//! let window = build_page(45, predicate.page.as_ref());
//! assert_eq!((window.skip, window.per_page), (0, 20));
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod codec;
pub mod config;
pub mod context;
pub mod core;
pub mod decoder;
pub mod error;
pub mod factory;
pub mod schema;
pub mod types;

// Re-export commonly used types at crate root
pub use config::{BackendConfig, StorageConfig};
pub use context::RequestContext;
pub use error::{StorageError, StorageResult};
pub use factory::StoreFactory;
pub use types::{ObjectMeta, Resource, ResourceList, SelectionPredicate, TypeMeta};

// Re-export core traits
pub use core::{
    Backend, BackendCapability, BackendKind, Preconditions, Store, UpdateFn, UpdateOutcome,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
