//! Error types for the storage layer.
//!
//! Errors are grouped by category: resource state, concurrency, validation,
//! backend I/O, request context and schema declaration. Callers classify a
//! failure through the `is_*` predicates on [`StorageError`] rather than by
//! matching on the nested enums.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Resource state errors
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Precondition errors
    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    /// Object mapping and selector errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Cancellation and deadline errors
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Schema declaration errors
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Errors related to resource state.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The storage key does not resolve to a record.
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// A record already exists under the storage key.
    #[error("key already exists: {key}")]
    AlreadyExists { key: String },
}

/// Errors raised when a caller-supplied precondition does not hold.
#[derive(Error, Debug)]
pub enum ConcurrencyError {
    /// The stored object does not satisfy the preconditions.
    #[error("precondition failed for {key}: {message}")]
    Conflict { key: String, message: String },
}

/// Errors related to mapping objects and parsing selectors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// The object cannot be mapped onto the backend representation.
    #[error("invalid object {key}: {message}")]
    InvalidObject { key: String, message: String },

    /// A label or field selector could not be parsed.
    #[error("invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    /// No table schema was registered for the resource kind.
    #[error("no table schema registered for kind {kind}")]
    UnregisteredKind { kind: String },

    /// The storage configuration is unusable.
    #[error("invalid storage configuration: {}", problems.join("; "))]
    InvalidConfig { problems: Vec<String> },
}

/// Errors originating from the database backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable. `key` is empty for calls
    /// not tied to one object, such as health checks.
    #[error("backend unavailable: {backend_name} (key {key:?}): {message}")]
    Unavailable {
        backend_name: String,
        key: String,
        message: String,
    },

    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Backend I/O failed while operating on a key.
    #[error("internal error in {backend_name} for key {key}: {message}")]
    Internal {
        backend_name: String,
        key: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Encoding or decoding a payload failed.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Errors raised when the request context ends before the backend answers.
#[derive(Error, Debug)]
pub enum ContextError {
    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,

    /// The request deadline passed.
    #[error("request deadline exceeded after {timeout_ms}ms")]
    DeadlineExceeded { timeout_ms: u64 },
}

/// Errors in a statically declared table schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("table name is missing")]
    MissingTable,

    #[error("table {table} declares no resource key column")]
    MissingResourceKey { table: String },

    #[error("table {table} declares no raw object column")]
    MissingRawObject { table: String },

    #[error("'{identifier}' is not a valid SQL identifier")]
    InvalidIdentifier { identifier: String },

    #[error("column {column} is declared twice in table {table}")]
    DuplicateColumn { table: String, column: String },

    #[error("kind {kind} is registered twice")]
    DuplicateKind { kind: String },
}

impl StorageError {
    /// Builds an [`BackendError::Internal`] error for `key`.
    pub fn internal(
        backend_name: &str,
        key: &str,
        message: impl Into<String>,
    ) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: backend_name.to_string(),
            key: key.to_string(),
            message: message.into(),
            source: None,
        })
    }

    /// Builds a [`BackendError::Unavailable`] error for `key`.
    pub fn unavailable(backend_name: &str, key: &str, message: impl Into<String>) -> Self {
        StorageError::Backend(BackendError::Unavailable {
            backend_name: backend_name.to_string(),
            key: key.to_string(),
            message: message.into(),
        })
    }

    /// Builds a [`ResourceError::NotFound`] error for `key`.
    pub fn not_found(key: &str) -> Self {
        StorageError::Resource(ResourceError::NotFound {
            key: key.to_string(),
        })
    }

    /// Builds a [`ResourceError::AlreadyExists`] error for `key`.
    pub fn already_exists(key: &str) -> Self {
        StorageError::Resource(ResourceError::AlreadyExists {
            key: key.to_string(),
        })
    }

    /// Builds a [`ValidationError::InvalidObject`] error for `key`.
    pub fn invalid_object(key: &str, message: impl Into<String>) -> Self {
        StorageError::Validation(ValidationError::InvalidObject {
            key: key.to_string(),
            message: message.into(),
        })
    }

    /// Returns true if the key did not resolve to a record.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::Resource(ResourceError::NotFound { .. }))
    }

    /// Returns true if a record already existed under the key.
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            StorageError::Resource(ResourceError::AlreadyExists { .. })
        )
    }

    /// Returns true if the object could not be mapped onto the backend.
    pub fn is_invalid_object(&self) -> bool {
        matches!(
            self,
            StorageError::Validation(
                ValidationError::InvalidObject { .. } | ValidationError::UnregisteredKind { .. }
            )
        )
    }

    /// Returns true for backend I/O and encoding failures.
    pub fn is_internal(&self) -> bool {
        matches!(self, StorageError::Backend(_))
    }

    /// Returns true if a precondition did not hold.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Concurrency(ConcurrencyError::Conflict { .. }))
    }

    /// Returns true if the request context was cancelled or timed out.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StorageError::Context(_))
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            key: String::new(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StorageError {
    fn from(err: r2d2::Error) -> Self {
        StorageError::unavailable("sqlite", "", err.to_string())
    }
}
