//! Store implementation for DynamoDB.

use async_trait::async_trait;

use crate::codec::Codec;
use crate::context::RequestContext;
use crate::core::{PredicateTranslator, Preconditions, Store, UpdateFn};
use crate::decoder::{DecodeOptions, RawRecord, decode_list, decode_record};
use crate::error::{StorageError, StorageResult};
use crate::types::{Resource, ResourceList, SelectionPredicate, build_page};

use super::DynamoBackend;
use super::backend::{BACKEND_NAME, client_error};
use super::client::ScanRequest;
use super::filter::{DynamoTranslator, FilterExpression};
use super::item::{Item, KEY_ATTR, from_item, item_key, to_item};

fn decode_options() -> DecodeOptions {
    DecodeOptions::new(BACKEND_NAME)
}

fn into_record(key: &str, item: Item) -> StorageResult<RawRecord> {
    let (stored_key, payload) =
        from_item(item).map_err(|e| StorageError::internal(BACKEND_NAME, key, e))?;
    Ok(RawRecord::new(payload, stored_key))
}

impl<C: Codec> DynamoBackend<C> {
    fn encode_item<T: Resource>(&self, key: &str, obj: &T) -> StorageResult<Item> {
        let payload = self.codec.encode(obj).map_err(|e| match e {
            StorageError::Validation(_) => e,
            other => StorageError::internal(BACKEND_NAME, key, format!("encode failed: {other}")),
        })?;
        to_item(key, &payload).map_err(|e| StorageError::invalid_object(key, e))
    }

    async fn fetch(&self, ctx: &RequestContext, key: &str) -> StorageResult<Option<RawRecord>> {
        let item = ctx
            .run(async {
                self.client
                    .get_item(self.table(), item_key(key))
                    .await
                    .map_err(|e| client_error(key, e))
            })
            .await?;
        item.map(|item| into_record(key, item)).transpose()
    }

    async fn put(
        &self,
        ctx: &RequestContext,
        key: &str,
        item: Item,
        condition: Option<FilterExpression>,
    ) -> StorageResult<()> {
        ctx.run(async {
            self.client
                .put_item(self.table(), item, condition)
                .await
                .map_err(|e| client_error(key, e))
        })
        .await
    }

    /// Creates `obj` unless an item already holds `key`.
    async fn insert<T: Resource>(
        &self,
        ctx: &RequestContext,
        key: &str,
        obj: &T,
    ) -> StorageResult<()> {
        let item = self.encode_item(key, obj)?;
        let mut absent = FilterExpression::default();
        absent.and_not_exists(KEY_ATTR);
        self.put(ctx, key, item, Some(absent)).await
    }

    async fn refetch<T: Resource>(
        &self,
        ctx: &RequestContext,
        key: &str,
        out: &mut T,
    ) -> StorageResult<()> {
        match self.fetch(ctx, key).await? {
            Some(record) => decode_record(&self.codec, &record, out, decode_options()),
            None => Err(StorageError::not_found(key)),
        }
    }

    /// Counts the items matching `filter`, following every scan page.
    async fn count(
        &self,
        ctx: &RequestContext,
        key: &str,
        filter: &FilterExpression,
    ) -> StorageResult<u64> {
        let mut total = 0;
        let mut start = None;
        loop {
            let request = ScanRequest {
                select_count: true,
                exclusive_start_key: start.take(),
                ..ScanRequest::new(self.table(), filter)
            };
            let page = ctx
                .run(async { self.client.scan(request).await.map_err(|e| client_error(key, e)) })
                .await?;
            total += page.count;
            match page.last_evaluated_key {
                Some(last) => start = Some(last),
                None => return Ok(total),
            }
        }
    }

    /// Collects matching items in scan order, stopping once `wanted` items
    /// are in hand.
    async fn collect(
        &self,
        ctx: &RequestContext,
        key: &str,
        filter: &FilterExpression,
        wanted: Option<u64>,
    ) -> StorageResult<Vec<Item>> {
        let mut items = Vec::new();
        let mut start = None;
        loop {
            let request = ScanRequest {
                exclusive_start_key: start.take(),
                ..ScanRequest::new(self.table(), filter)
            };
            let page = ctx
                .run(async { self.client.scan(request).await.map_err(|e| client_error(key, e)) })
                .await?;
            items.extend(page.items);
            let satisfied = wanted.is_some_and(|n| items.len() as u64 >= n);
            match page.last_evaluated_key {
                Some(last) if !satisfied => start = Some(last),
                _ => return Ok(items),
            }
        }
    }
}

#[async_trait]
impl<T: Resource, C: Codec> Store<T> for DynamoBackend<C> {
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
        if ttl > 0 {
            tracing::debug!(key, ttl, "dynamodb ignores ttl");
        }
        if self.fetch(ctx, key).await?.is_some() {
            return Err(StorageError::already_exists(key));
        }

        self.insert(ctx, key, obj).await?;
        tracing::debug!(key, table = %self.table(), "created item");
        self.refetch(ctx, key, out).await
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        key: &str,
        out: &mut T,
        preconditions: Option<&Preconditions>,
    ) -> StorageResult<()> {
        let Some(record) = self.fetch(ctx, key).await? else {
            return Err(StorageError::not_found(key));
        };

        let mut current = T::default();
        decode_record(&self.codec, &record, &mut current, decode_options())?;
        if let Some(preconditions) = preconditions {
            preconditions.check(key, &current)?;
        }

        let old = ctx
            .run(async {
                self.client
                    .delete_item(self.table(), item_key(key))
                    .await
                    .map_err(|e| client_error(key, e))
            })
            .await?;
        if old.is_none() {
            return Err(StorageError::not_found(key));
        }

        tracing::debug!(key, table = %self.table(), "deleted item");
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
        match self.fetch(ctx, key).await? {
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
        let mut filter = DynamoTranslator.translate(predicate);
        // Every kind shares the table; the list key scopes the scan.
        if !key.is_empty() {
            filter.and_begins_with(KEY_ATTR, key);
        }

        let total = self.count(ctx, key, &filter).await?;
        let window = build_page(total, predicate.page.as_ref());

        let mut records = Vec::new();
        if !window.is_past_end(total) {
            let wanted = window.has_page.then(|| window.skip + window.per_page);
            let items = self.collect(ctx, key, &filter, wanted).await?;
            let (skip, take) = if window.has_page {
                (
                    usize::try_from(window.skip).unwrap_or(usize::MAX),
                    usize::try_from(window.per_page).unwrap_or(usize::MAX),
                )
            } else {
                (0, usize::MAX)
            };
            records = items
                .into_iter()
                .skip(skip)
                .take(take)
                .map(|item| into_record(key, item))
                .collect::<StorageResult<Vec<_>>>()?;
        }

        tracing::debug!(
            key,
            table = %self.table(),
            total,
            returned = records.len(),
            "listed items"
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
        let existing = self.fetch(ctx, key).await?;
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
        if outcome.ttl.is_some_and(|ttl| ttl > 0) {
            tracing::debug!(key, "dynamodb ignores ttl");
        }

        if existing.is_none() {
            self.insert(ctx, key, &outcome.object).await?;
            tracing::debug!(key, table = %self.table(), "created item on update");
        } else {
            let item = self.encode_item(key, &outcome.object)?;
            self.put(ctx, key, item, None).await?;
            tracing::debug!(key, table = %self.table(), "updated item");
        }
        self.refetch(ctx, key, out).await
    }
}
