use async_trait::async_trait;
use bson::Document;

/// Database and collection a request targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestMeta {
    /// Database name.
    pub database: String,
    /// Collection name, one per resource kind.
    pub collection: String,
}

impl RequestMeta {
    /// Targets `collection` in `database`.
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

/// A filtered, sorted and windowed `find`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    /// Match filter.
    pub filter: Document,
    /// Sort specification.
    pub sort: Option<Document>,
    /// Documents to skip.
    pub skip: Option<u64>,
    /// Maximum documents to return.
    pub limit: Option<i64>,
}

impl FindQuery {
    /// An unsorted, unbounded query for `filter`.
    pub fn new(filter: Document) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }
}

/// Failures reported by a [`DocumentApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentClientError {
    /// A unique index rejected the write.
    Duplicate(String),
    /// No server could be reached.
    Unavailable(String),
    /// Any other driver failure.
    Internal(String),
}

impl std::fmt::Display for DocumentClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentClientError::Duplicate(msg) => write!(f, "duplicate key: {msg}"),
            DocumentClientError::Unavailable(msg) => write!(f, "unavailable: {msg}"),
            DocumentClientError::Internal(msg) => f.write_str(msg),
        }
    }
}

/// The document operations the MongoDB store needs.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Round trip to the server.
    async fn ping(&self, database: &str) -> Result<(), DocumentClientError>;

    /// Creates the unique `key` index and the `ttl` expiry index.
    async fn ensure_indexes(&self, meta: &RequestMeta) -> Result<(), DocumentClientError>;

    /// Returns the first document matching `filter`.
    async fn find_one(
        &self,
        meta: &RequestMeta,
        filter: Document,
    ) -> Result<Option<Document>, DocumentClientError>;

    /// Returns every document matching the query.
    async fn find(
        &self,
        meta: &RequestMeta,
        query: FindQuery,
    ) -> Result<Vec<Document>, DocumentClientError>;

    /// Counts documents matching `filter`.
    async fn count_documents(
        &self,
        meta: &RequestMeta,
        filter: Document,
    ) -> Result<u64, DocumentClientError>;

    /// Inserts `doc`; a duplicate `key` fails with
    /// [`DocumentClientError::Duplicate`].
    async fn insert_one(&self, meta: &RequestMeta, doc: Document)
    -> Result<(), DocumentClientError>;

    /// Returns the number of matched documents.
    async fn update_one(
        &self,
        meta: &RequestMeta,
        filter: Document,
        update: Document,
    ) -> Result<u64, DocumentClientError>;

    /// Returns the number of deleted documents.
    async fn delete_one(
        &self,
        meta: &RequestMeta,
        filter: Document,
    ) -> Result<u64, DocumentClientError>;
}

#[cfg(feature = "mongodb")]
pub use driver::MongoClient;

#[cfg(feature = "mongodb")]
mod driver {
    use std::time::Duration;

    use async_trait::async_trait;
    use bson::{Document, doc};
    use mongodb::error::{ErrorKind, WriteFailure};
    use mongodb::options::{ClientOptions, Credential, IndexOptions, ServerAddress};
    use mongodb::{Client, Collection, IndexModel};

    use super::{DocumentApi, DocumentClientError, FindQuery, RequestMeta};
    use crate::backends::mongodb::backend::{MongoBackendConfig, MongoCredential};

    const DUPLICATE_KEY: i32 = 11000;

    /// [`DocumentApi`] over the official MongoDB driver.
    #[derive(Debug, Clone)]
    pub struct MongoClient {
        client: Client,
    }

    impl MongoClient {
        /// Wraps an existing driver client.
        pub fn new(client: Client) -> Self {
            Self { client }
        }

        /// Builds a client for the configured servers. The user credential
        /// wins over the admin credential when both are set.
        pub fn connect(config: &MongoBackendConfig) -> Result<Self, DocumentClientError> {
            let hosts = config
                .servers
                .iter()
                .map(|s| ServerAddress::parse(s))
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_driver_error)?;

            let mut options = ClientOptions::default();
            options.hosts = hosts;
            options.app_name = Some("apimaster".to_string());
            options.connect_timeout = Some(Duration::from_millis(config.connect_timeout_ms));
            if let Some(cred) = config
                .user_credential
                .as_ref()
                .or(config.admin_credential.as_ref())
            {
                options.credential = Some(credential(cred));
            }

            let client = Client::with_options(options).map_err(map_driver_error)?;
            Ok(Self { client })
        }

        fn collection(&self, meta: &RequestMeta) -> Collection<Document> {
            self.client
                .database(&meta.database)
                .collection(&meta.collection)
        }
    }

    fn credential(cred: &MongoCredential) -> Credential {
        let mut credential = Credential::default();
        credential.username = Some(cred.username.clone());
        credential.password = Some(cred.password.clone());
        credential.source = Some(cred.source.clone());
        credential
    }

    #[async_trait]
    impl DocumentApi for MongoClient {
        async fn ping(&self, database: &str) -> Result<(), DocumentClientError> {
            self.client
                .database(database)
                .run_command(doc! { "ping": 1 })
                .await
                .map_err(map_driver_error)?;
            Ok(())
        }

        async fn ensure_indexes(&self, meta: &RequestMeta) -> Result<(), DocumentClientError> {
            let collection = self.collection(meta);
            let key_index = IndexModel::builder()
                .keys(doc! { "key": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build();
            let ttl_index = IndexModel::builder()
                .keys(doc! { "ttl": 1 })
                .options(
                    IndexOptions::builder()
                        .expire_after(Duration::from_secs(0))
                        .build(),
                )
                .build();
            collection
                .create_indexes([key_index, ttl_index])
                .await
                .map_err(map_driver_error)?;
            Ok(())
        }

        async fn find_one(
            &self,
            meta: &RequestMeta,
            filter: Document,
        ) -> Result<Option<Document>, DocumentClientError> {
            self.collection(meta)
                .find_one(filter)
                .await
                .map_err(map_driver_error)
        }

        async fn find(
            &self,
            meta: &RequestMeta,
            query: FindQuery,
        ) -> Result<Vec<Document>, DocumentClientError> {
            let mut find = self.collection(meta).find(query.filter);
            if let Some(sort) = query.sort {
                find = find.sort(sort);
            }
            if let Some(skip) = query.skip {
                find = find.skip(skip);
            }
            if let Some(limit) = query.limit {
                find = find.limit(limit);
            }

            let mut cursor = find.await.map_err(map_driver_error)?;
            let mut docs = Vec::new();
            while cursor.advance().await.map_err(map_driver_error)? {
                docs.push(cursor.deserialize_current().map_err(map_driver_error)?);
            }
            Ok(docs)
        }

        async fn count_documents(
            &self,
            meta: &RequestMeta,
            filter: Document,
        ) -> Result<u64, DocumentClientError> {
            self.collection(meta)
                .count_documents(filter)
                .await
                .map_err(map_driver_error)
        }

        async fn insert_one(
            &self,
            meta: &RequestMeta,
            doc: Document,
        ) -> Result<(), DocumentClientError> {
            self.collection(meta)
                .insert_one(doc)
                .await
                .map_err(map_driver_error)?;
            Ok(())
        }

        async fn update_one(
            &self,
            meta: &RequestMeta,
            filter: Document,
            update: Document,
        ) -> Result<u64, DocumentClientError> {
            let result = self
                .collection(meta)
                .update_one(filter, update)
                .await
                .map_err(map_driver_error)?;
            Ok(result.matched_count)
        }

        async fn delete_one(
            &self,
            meta: &RequestMeta,
            filter: Document,
        ) -> Result<u64, DocumentClientError> {
            let result = self
                .collection(meta)
                .delete_one(filter)
                .await
                .map_err(map_driver_error)?;
            Ok(result.deleted_count)
        }
    }

    fn map_driver_error(err: mongodb::error::Error) -> DocumentClientError {
        let message = err.to_string();
        match err.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY => {
                DocumentClientError::Duplicate(message)
            }
            ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) => {
                DocumentClientError::Unavailable(message)
            }
            _ => DocumentClientError::Internal(message),
        }
    }
}
