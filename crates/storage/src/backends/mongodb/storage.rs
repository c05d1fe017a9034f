//! Store implementation for MongoDB.

use async_trait::async_trait;
use bson::{Document, doc};
use chrono::Utc;

use crate::codec::Codec;
use crate::context::RequestContext;
use crate::core::{PredicateTranslator, Preconditions, Store, UpdateFn};
use crate::decoder::{DecodeOptions, RawRecord, decode_list, decode_record};
use crate::error::{StorageError, StorageResult};
use crate::types::{Resource, ResourceList, SelectionPredicate, build_page};

use super::MongoBackend;
use super::backend::{BACKEND_NAME, client_error};
use super::client::{FindQuery, RequestMeta};
use super::document::{DocObject, PAYLOAD_FIELD, expiry, key_filter, to_bson_datetime};
use super::filter::MongoTranslator;

fn decode_options() -> DecodeOptions {
    DecodeOptions::new(BACKEND_NAME)
}

fn document_error(key: &str, message: String) -> StorageError {
    StorageError::internal(BACKEND_NAME, key, message)
}

fn into_record(key: &str, doc: Document) -> StorageResult<RawRecord> {
    let obj = DocObject::from_document(doc).map_err(|e| document_error(key, e))?;
    Ok(RawRecord::new(obj.obj.into_bytes(), obj.key))
}

impl<C: Codec> MongoBackend<C> {
    fn encode<T: Resource>(&self, key: &str, obj: &T) -> StorageResult<String> {
        let payload = self.codec.encode(obj).map_err(|e| match e {
            StorageError::Validation(_) => e,
            other => document_error(key, format!("encode failed: {other}")),
        })?;
        String::from_utf8(payload).map_err(|e| document_error(key, e.to_string()))
    }

    /// Fetches the single document stored under `key`.
    async fn fetch(
        &self,
        ctx: &RequestContext,
        meta: &RequestMeta,
        key: &str,
    ) -> StorageResult<Option<RawRecord>> {
        let query = FindQuery {
            limit: Some(2),
            ..FindQuery::new(key_filter(key))
        };
        let mut docs = ctx
            .run(async {
                self.client
                    .find(meta, query)
                    .await
                    .map_err(|e| client_error(key, e))
            })
            .await?;
        if docs.len() > 1 {
            panic!(
                "collection {} holds more than one document for key {key:?}",
                meta.collection
            );
        }
        docs.pop().map(|doc| into_record(key, doc)).transpose()
    }

    async fn insert<T: Resource>(
        &self,
        ctx: &RequestContext,
        meta: &RequestMeta,
        key: &str,
        obj: &T,
        ttl: u64,
    ) -> StorageResult<()> {
        let payload = self.encode(key, obj)?;
        let doc = DocObject::new(key, payload.into_bytes(), ttl, Utc::now())
            .and_then(|d| d.to_document())
            .map_err(|e| document_error(key, e))?;

        ctx.run(async {
            self.client
                .insert_one(meta, doc)
                .await
                .map_err(|e| client_error(key, e))
        })
        .await
    }

    async fn refetch<T: Resource>(
        &self,
        ctx: &RequestContext,
        meta: &RequestMeta,
        key: &str,
        out: &mut T,
    ) -> StorageResult<()> {
        match self.fetch(ctx, meta, key).await? {
            Some(record) => decode_record(&self.codec, &record, out, decode_options()),
            None => Err(StorageError::not_found(key)),
        }
    }
}

#[async_trait]
impl<T: Resource, C: Codec> Store<T> for MongoBackend<C> {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn create(
        &self,
        ctx: &RequestContext,
        key: &str,
        obj: &T,
        out: &mut T,
        ttl: u64,
    ) -> StorageResult<()> {
        let meta = self.collection::<T>(ctx, key).await?;
        if self.fetch(ctx, &meta, key).await?.is_some() {
            return Err(StorageError::already_exists(key));
        }

        self.insert(ctx, &meta, key, obj, ttl).await?;
        tracing::debug!(key, collection = %meta.collection, ttl, "created document");
        self.refetch(ctx, &meta, key, out).await
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        key: &str,
        out: &mut T,
        preconditions: Option<&Preconditions>,
    ) -> StorageResult<()> {
        let meta = self.collection::<T>(ctx, key).await?;
        let Some(record) = self.fetch(ctx, &meta, key).await? else {
            return Err(StorageError::not_found(key));
        };

        let mut current = T::default();
        decode_record(&self.codec, &record, &mut current, decode_options())?;
        if let Some(preconditions) = preconditions {
            preconditions.check(key, &current)?;
        }

        let deleted = ctx
            .run(async {
                self.client
                    .delete_one(&meta, key_filter(key))
                    .await
                    .map_err(|e| client_error(key, e))
            })
            .await?;
        if deleted == 0 {
            return Err(StorageError::not_found(key));
        }

        tracing::debug!(key, collection = %meta.collection, "deleted document");
        *out = current;
        Ok(())
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        key: &str,
        out: &mut T,
        ignore_not_found: bool,
    ) -> StorageResult<()> {
        let meta = self.collection::<T>(ctx, key).await?;
        match self.fetch(ctx, &meta, key).await? {
            Some(record) => decode_record(&self.codec, &record, out, decode_options()),
            None if ignore_not_found => {
                *out = T::default();
                Ok(())
            }
            None => Err(StorageError::not_found(key)),
        }
    }

    async fn get_to_list(
        &self,
        ctx: &RequestContext,
        key: &str,
        predicate: &SelectionPredicate,
        list: &mut ResourceList<T>,
    ) -> StorageResult<()> {
        let meta = self.collection::<T>(ctx, key).await?;
        let filter = MongoTranslator.translate(predicate);

        let total = ctx
            .run(async {
                self.client
                    .count_documents(&meta, filter.clone())
                    .await
                    .map_err(|e| client_error(key, e))
            })
            .await?;

        let window = build_page(total, predicate.page.as_ref());
        let mut records = Vec::new();
        if !window.is_past_end(total) {
            let mut query = FindQuery {
                sort: Some(doc! { "key": 1 }),
                ..FindQuery::new(filter)
            };
            if window.has_page {
                query.skip = Some(window.skip);
                query.limit = Some(i64::try_from(window.per_page).unwrap_or(i64::MAX));
            }

            let docs = ctx
                .run(async {
                    self.client
                        .find(&meta, query)
                        .await
                        .map_err(|e| client_error(key, e))
                })
                .await?;
            records = docs
                .into_iter()
                .map(|doc| into_record(key, doc))
                .collect::<StorageResult<Vec<_>>>()?;
        }

        tracing::debug!(
            key,
            collection = %meta.collection,
            total,
            returned = records.len(),
            "listed documents"
        );
        decode_list(&self.codec, &records, list, decode_options())?;
        list.metadata.total_items = Some(total);
        Ok(())
    }

    async fn guaranteed_update(
        &self,
        ctx: &RequestContext,
        key: &str,
        out: &mut T,
        ignore_not_found: bool,
        _preconditions: Option<&Preconditions>,
        try_update: UpdateFn<'_, T>,
    ) -> StorageResult<()> {
        let meta = self.collection::<T>(ctx, key).await?;

        let existing = self.fetch(ctx, &meta, key).await?;
        let current = match &existing {
            Some(record) => {
                let mut current = T::default();
                decode_record(&self.codec, record, &mut current, decode_options())?;
                current
            }
            None if ignore_not_found => T::default(),
            None => return Err(StorageError::not_found(key)),
        };

        let outcome = try_update(current)?;

        if existing.is_none() {
            let ttl = outcome.ttl.unwrap_or(0);
            self.insert(ctx, &meta, key, &outcome.object, ttl).await?;
            tracing::debug!(key, collection = %meta.collection, "created document on update");
            return self.refetch(ctx, &meta, key, out).await;
        }

        let mut set = Document::new();
        set.insert(PAYLOAD_FIELD, self.encode(key, &outcome.object)?);
        if let Some(ttl) = outcome.ttl {
            set.insert("ttl", to_bson_datetime(expiry(ttl, Utc::now())));
        }

        let matched = ctx
            .run(async {
                self.client
                    .update_one(&meta, key_filter(key), doc! { "$set": set })
                    .await
                    .map_err(|e| client_error(key, e))
            })
            .await?;
        if matched == 0 {
            return Err(StorageError::not_found(key));
        }

        tracing::debug!(key, collection = %meta.collection, "updated document");
        self.refetch(ctx, &meta, key, out).await
    }
}
