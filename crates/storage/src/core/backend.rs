//! Backend lifecycle abstraction.
//!
//! Every store implements [`Backend`] alongside [`Store`](super::Store) so
//! that callers can prepare it (create tables, ensure indexes) and probe it
//! without knowing which database sits underneath.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// Identifies the type of database backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// SQLite database (file-based or in-memory).
    Sqlite,
    /// MongoDB (document store).
    MongoDB,
    /// Amazon DynamoDB (key-value store).
    DynamoDB,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Sqlite => write!(f, "sqlite"),
            BackendKind::MongoDB => write!(f, "mongodb"),
            BackendKind::DynamoDB => write!(f, "dynamodb"),
        }
    }
}

/// Capabilities that a backend may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendCapability {
    /// Create, get, delete and update.
    Crud,
    /// Label selectors on list.
    LabelSelector,
    /// Field selectors on list.
    FieldSelector,
    /// Page number and size on list.
    OffsetPagination,
    /// Records expire after their time-to-live.
    Expiry,
    /// Updates can rewrite only the fields a transform changed.
    FieldLevelUpdate,
}

impl std::fmt::Display for BackendCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendCapability::Crud => "crud",
            BackendCapability::LabelSelector => "label-selector",
            BackendCapability::FieldSelector => "field-selector",
            BackendCapability::OffsetPagination => "offset-pagination",
            BackendCapability::Expiry => "expiry",
            BackendCapability::FieldLevelUpdate => "field-level-update",
        };
        write!(f, "{}", name)
    }
}

/// Lifecycle operations shared by all backends.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Returns the backend kind.
    fn kind(&self) -> BackendKind;

    /// Returns a human-readable name for this backend.
    fn name(&self) -> &'static str {
        match self.kind() {
            BackendKind::Sqlite => "sqlite",
            BackendKind::MongoDB => "mongodb",
            BackendKind::DynamoDB => "dynamodb",
        }
    }

    /// Returns the capabilities this backend supports.
    fn capabilities(&self) -> Vec<BackendCapability>;

    /// Returns true if the backend supports `capability`.
    fn supports(&self, capability: BackendCapability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Creates tables, indexes or other structures the store needs.
    /// Must be idempotent.
    async fn initialize(&self) -> Result<(), BackendError>;

    /// Checks that the backend is reachable.
    async fn health_check(&self) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(BackendKind::Sqlite.to_string(), "sqlite");
        assert_eq!(BackendKind::MongoDB.to_string(), "mongodb");
        assert_eq!(BackendKind::DynamoDB.to_string(), "dynamodb");
    }

    #[test]
    fn test_backend_kind_serde() {
        let kind: BackendKind = serde_json::from_str("\"dynamodb\"").unwrap();
        assert_eq!(kind, BackendKind::DynamoDB);
    }

    #[test]
    fn test_capability_display() {
        assert_eq!(BackendCapability::FieldLevelUpdate.to_string(), "field-level-update");
    }
}
