//! DynamoDB backend implementation.
//!
//! Every resource kind shares one table. An item holds the encoded object's
//! fields as native attributes plus the `key` hash key and the `sortKey`
//! range key, both equal to the storage key. Lists scan the table with a
//! filter expression scoped to the list key prefix.
//!
//! The store talks to DynamoDB through [`KeyValueApi`]; the SDK-backed
//! [`DynamoDbClient`] is available with the `dynamodb` feature.
//!
//! # Example
//!
//! ```ignore
//! use apimaster_storage::backends::dynamodb::{DynamoBackend, DynamoBackendConfig};
//! use apimaster_storage::core::Backend;
//!
//! let config = DynamoBackendConfig {
//!     region: "us-west-2".to_string(),
//!     endpoint_url: Some("http://localhost:8000".to_string()),
//!     ..Default::default()
//! };
//! let backend = DynamoBackend::connect(config).await;
//! backend.initialize().await?;
//! ```

mod backend;
mod client;
mod filter;
mod item;
mod storage;


pub use backend::{DynamoBackend, DynamoBackendConfig};
#[cfg(feature = "dynamodb")]
pub use client::DynamoDbClient;
pub use client::{KeyValueApi, KeyValueClientError, ScanOutput, ScanRequest, TableSpec};
pub use filter::{Condition, ConditionOp, DynamoTranslator, FilterExpression};
pub use item::{AttrValue, Item, KEY_ATTR, SORT_KEY_ATTR};
