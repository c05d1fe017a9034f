//! Store implementation for SQLite.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{Connection, ErrorCode, params_from_iter};
use serde_json::Value;

use crate::codec::Codec;
use crate::context::RequestContext;
use crate::core::{Preconditions, Store, UpdateFn};
use crate::decoder::{DecodeOptions, RawRecord, decode_list, decode_record};
use crate::error::{StorageError, StorageResult};
use crate::schema::SchemaDescriptor;
use crate::types::{Resource, ResourceList, SelectionPredicate, build_page, resource_key};

use super::SqliteBackend;
use super::backend::BACKEND_NAME;
use super::query_builder::{SqlParam, SqlTranslator};

/// Rows matched by a query, with the total before paging.
struct QueryResult {
    total: u64,
    records: Vec<RawRecord>,
}

fn decode_options() -> DecodeOptions {
    DecodeOptions::new(BACKEND_NAME).with_name_from_resource_key()
}

fn sql_error(key: &str, err: rusqlite::Error) -> StorageError {
    StorageError::internal(BACKEND_NAME, key, err.to_string())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl<C: Codec> SqliteBackend<C> {
    fn descriptor<T: Resource>(&self) -> StorageResult<Arc<SchemaDescriptor>> {
        self.registry().for_resource::<T>().map(Arc::clone)
    }

    /// Encodes `obj` and returns the payload together with its JSON form,
    /// from which mirrored column values are taken.
    fn encode_row<T: Resource>(&self, key: &str, obj: &T) -> StorageResult<(Vec<u8>, Value)> {
        let payload = self.codec.encode(obj).map_err(|e| match e {
            StorageError::Validation(_) => e,
            other => StorageError::internal(BACKEND_NAME, key, format!("encode failed: {other}")),
        })?;
        let value = serde_json::from_slice(&payload).map_err(|e| {
            StorageError::internal(BACKEND_NAME, key, format!("payload is not JSON: {e}"))
        })?;
        Ok((payload, value))
    }

    async fn do_query(
        &self,
        ctx: &RequestContext,
        descriptor: &Arc<SchemaDescriptor>,
        key: &str,
        predicate: SelectionPredicate,
    ) -> StorageResult<QueryResult> {
        let descriptor = Arc::clone(descriptor);
        let key = key.to_string();

        self.with_connection(ctx, move |conn| {
            let translator = SqlTranslator::new(&descriptor);

            let count = translator.count_query(&predicate);
            tracing::debug!(table = descriptor.table_name(), sql = %count.sql, "count query");
            let total: i64 = conn
                .query_row(&count.sql, params_from_iter(count.values()), |row| row.get(0))
                .map_err(|e| sql_error(&key, e))?;
            let total = u64::try_from(total).unwrap_or_default();

            let window = build_page(total, predicate.page.as_ref());
            if window.is_past_end(total) {
                return Ok(QueryResult {
                    total,
                    records: Vec::new(),
                });
            }

            let query = translator.select_query(&predicate, &window);
            tracing::debug!(table = descriptor.table_name(), sql = %query.sql, "select query");
            let mut stmt = conn.prepare(&query.sql).map_err(|e| sql_error(&key, e))?;
            let rows = stmt
                .query_map(params_from_iter(query.values()), |row| {
                    let resource_key: String = row.get(0)?;
                    let payload: Vec<u8> = row.get(1)?;
                    Ok(RawRecord::new(payload, resource_key))
                })
                .map_err(|e| sql_error(&key, e))?;

            let records = rows
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| sql_error(&key, e))?;
            Ok(QueryResult { total, records })
        })
        .await
    }

    /// Fetches the single row stored under `key`.
    async fn fetch(
        &self,
        ctx: &RequestContext,
        descriptor: &Arc<SchemaDescriptor>,
        key: &str,
    ) -> StorageResult<Option<RawRecord>> {
        let predicate =
            SelectionPredicate::field_equals(&descriptor.resource_key().field, resource_key(key));
        let mut result = self.do_query(ctx, descriptor, key, predicate).await?;
        if result.records.len() > 1 {
            panic!(
                "table {} holds {} rows for resource key {:?}",
                descriptor.table_name(),
                result.records.len(),
                resource_key(key)
            );
        }
        Ok(result.records.pop())
    }

    async fn insert<T: Resource>(
        &self,
        ctx: &RequestContext,
        descriptor: &Arc<SchemaDescriptor>,
        key: &str,
        obj: &T,
    ) -> StorageResult<()> {
        let (payload, value) = self.encode_row(key, obj)?;

        let mut columns = vec![
            format!("\"{}\"", descriptor.resource_key_column()),
            format!("\"{}\"", descriptor.raw_object_column()),
        ];
        let mut params = vec![
            SqlParam::string(resource_key(key)),
            SqlParam::Blob(payload),
        ];
        for def in descriptor.columns().iter().filter(|c| !c.resource_key) {
            columns.push(format!("\"{}\"", def.column));
            params.push(def.extract(&value).into());
        }
        let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            descriptor.table_name(),
            columns.join(", "),
            placeholders.join(", ")
        );

        let key = key.to_string();
        self.with_connection(ctx, move |conn| {
            let values: Vec<rusqlite::types::Value> = params.into_iter().map(Into::into).collect();
            match conn.execute(&sql, params_from_iter(values)) {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => Err(StorageError::already_exists(&key)),
                Err(e) => Err(sql_error(&key, e)),
            }
        })
        .await
    }

    /// Rewrites the raw object and the mirrored columns named by
    /// `changed_fields` (all of them when the set is empty).
    async fn update<T: Resource>(
        &self,
        ctx: &RequestContext,
        descriptor: &Arc<SchemaDescriptor>,
        key: &str,
        obj: &T,
        changed_fields: &std::collections::BTreeSet<String>,
    ) -> StorageResult<()> {
        let (payload, value) = self.encode_row(key, obj)?;

        let mut assignments = vec![format!("\"{}\" = ?1", descriptor.raw_object_column())];
        let mut params = vec![SqlParam::Blob(payload)];
        for def in descriptor.update_columns(changed_fields) {
            params.push(def.extract(&value).into());
            assignments.push(format!("\"{}\" = ?{}", def.column, params.len()));
        }
        params.push(SqlParam::string(resource_key(key)));
        let sql = format!(
            "UPDATE \"{}\" SET {} WHERE \"{}\" = ?{}",
            descriptor.table_name(),
            assignments.join(", "),
            descriptor.resource_key_column(),
            params.len()
        );

        let key = key.to_string();
        self.with_connection(ctx, move |conn| {
            let values: Vec<rusqlite::types::Value> = params.into_iter().map(Into::into).collect();
            conn.execute(&sql, params_from_iter(values))
                .map_err(|e| sql_error(&key, e))?;
            Ok(())
        })
        .await
    }

    async fn remove(
        &self,
        ctx: &RequestContext,
        descriptor: &Arc<SchemaDescriptor>,
        key: &str,
    ) -> StorageResult<()> {
        let sql = format!(
            "DELETE FROM \"{}\" WHERE \"{}\" = ?1",
            descriptor.table_name(),
            descriptor.resource_key_column()
        );
        let key = key.to_string();
        self.with_connection(ctx, move |conn: &Connection| {
            conn.execute(&sql, [resource_key(&key)])
                .map_err(|e| sql_error(&key, e))?;
            Ok(())
        })
        .await
    }

    /// Reads `key` back into `out` after a write.
    async fn refetch<T: Resource>(
        &self,
        ctx: &RequestContext,
        descriptor: &Arc<SchemaDescriptor>,
        key: &str,
        out: &mut T,
    ) -> StorageResult<()> {
        match self.fetch(ctx, descriptor, key).await? {
            Some(record) => decode_record(&self.codec, &record, out, decode_options()),
            None => Err(StorageError::not_found(key)),
        }
    }
}

#[async_trait]
impl<T: Resource, C: Codec> Store<T> for SqliteBackend<C> {
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
        let descriptor = self.descriptor::<T>()?;
        if ttl != 0 {
            tracing::debug!(key, ttl, "sqlite does not expire records, ignoring ttl");
        }

        if self.fetch(ctx, &descriptor, key).await?.is_some() {
            return Err(StorageError::already_exists(key));
        }

        self.insert(ctx, &descriptor, key, obj).await?;
        tracing::debug!(key, table = descriptor.table_name(), "created row");
        self.refetch(ctx, &descriptor, key, out).await
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        key: &str,
        out: &mut T,
        preconditions: Option<&Preconditions>,
    ) -> StorageResult<()> {
        let descriptor = self.descriptor::<T>()?;
        let Some(record) = self.fetch(ctx, &descriptor, key).await? else {
            return Err(StorageError::not_found(key));
        };

        let mut current = T::default();
        decode_record(&self.codec, &record, &mut current, decode_options())?;
        if let Some(preconditions) = preconditions {
            preconditions.check(key, &current)?;
        }

        self.remove(ctx, &descriptor, key).await?;
        tracing::debug!(key, table = descriptor.table_name(), "deleted row");
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
        let descriptor = self.descriptor::<T>()?;
        match self.fetch(ctx, &descriptor, key).await? {
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
        let descriptor = self.descriptor::<T>()?;
        let result = self
            .do_query(ctx, &descriptor, key, predicate.clone())
            .await?;
        tracing::debug!(
            key,
            table = descriptor.table_name(),
            total = result.total,
            returned = result.records.len(),
            "listed rows"
        );

        decode_list(&self.codec, &result.records, list, decode_options())?;
        list.metadata.total_items = Some(result.total);
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
        let descriptor = self.descriptor::<T>()?;

        let existing = self.fetch(ctx, &descriptor, key).await?;
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
        if outcome.ttl.is_some_and(|ttl| ttl != 0) {
            tracing::debug!(key, "sqlite does not expire records, ignoring ttl");
        }

        if existing.is_none() {
            self.insert(ctx, &descriptor, key, &outcome.object).await?;
            tracing::debug!(key, table = descriptor.table_name(), "created row on update");
        } else {
            self.update(ctx, &descriptor, key, &outcome.object, &outcome.changed_fields)
                .await?;
            tracing::debug!(
                key,
                table = descriptor.table_name(),
                fields = outcome.changed_fields.len(),
                "updated row"
            );
        }

        self.refetch(ctx, &descriptor, key, out).await
    }
}
