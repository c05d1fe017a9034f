//! Core storage traits and abstractions.
//!
//! - [`Store`] - The six-operation object store contract
//! - [`Backend`] - Backend lifecycle (initialize, health check, capabilities)
//! - [`PredicateTranslator`] - Selection predicate to native filter
//!
//! # Backend Capabilities
//!
//! | Capability | SQLite | MongoDB | DynamoDB |
//! |------------|--------|---------|----------|
//! | Crud | ✓ | ✓ | ✓ |
//! | LabelSelector | ✓ | ✓ | ✓ |
//! | FieldSelector | ✓ | ✓ | ✓ |
//! | OffsetPagination | ✓ | ✓ | ✓ |
//! | Expiry | ✗ | ✓ | ✗ |
//! | FieldLevelUpdate | ✓ | ✗ | ✗ |

mod backend;
mod store;
mod translator;

pub use backend::{Backend, BackendCapability, BackendKind};
pub use store::{Preconditions, Store, UpdateFn, UpdateOutcome};
pub use translator::{PredicateTranslator, supported_requirements};
