//! MongoDB backend implementation.
//!
//! Each resource kind gets its own collection in the configured database.
//! A document holds the storage key, a fresh uid, an expiry timestamp and
//! the encoded object as a JSON string:
//!
//! ```text
//! { key: "ns/foo", uid: "…", ttl: ISODate("2200-01-01"), obj: "{\"kind\":…}" }
//! ```
//!
//! Collections carry a unique index on `key` and a TTL index on `ttl`,
//! ensured the first time this process touches the collection. Selectors
//! are matched with regular expressions over `obj`.
//!
//! The store talks to MongoDB through [`DocumentApi`]; the driver-backed
//! [`MongoClient`] is available with the `mongodb` feature.

mod backend;
mod client;
mod document;
mod filter;
mod storage;


pub use backend::{MongoBackend, MongoBackendConfig, MongoCredential};
#[cfg(feature = "mongodb")]
pub use client::MongoClient;
pub use client::{DocumentApi, DocumentClientError, FindQuery, RequestMeta};
pub use document::DocObject;
pub use filter::MongoTranslator;
