//! The object store contract.
//!
//! This module defines the [`Store`] trait implemented by every backend,
//! together with the typed update function used by
//! [`Store::guaranteed_update`] and the [`Preconditions`] checked on delete.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::codec::ApiObjectVersioner;
use crate::context::RequestContext;
use crate::error::{ConcurrencyError, StorageResult};
use crate::types::{Resource, ResourceList, SelectionPredicate};

/// Result of a successful update transform.
#[derive(Debug, Clone)]
pub struct UpdateOutcome<T> {
    /// The object to persist.
    pub object: T,
    /// Dotted paths of fields the transform changed. Empty means "unknown";
    /// backends that support field-level updates then rewrite every field.
    pub changed_fields: BTreeSet<String>,
    /// New time-to-live in seconds; `None` keeps the current expiry.
    pub ttl: Option<u64>,
}

impl<T> UpdateOutcome<T> {
    /// Persists `object` with no field hint and the current expiry.
    pub fn new(object: T) -> Self {
        Self {
            object,
            changed_fields: BTreeSet::new(),
            ttl: None,
        }
    }

    /// Records that the transform changed `field`.
    pub fn changed(mut self, field: impl Into<String>) -> Self {
        self.changed_fields.insert(field.into());
        self
    }

    /// Sets a new time-to-live in seconds.
    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Transform applied by [`Store::guaranteed_update`] to the current object.
pub type UpdateFn<'a, T> = Box<dyn FnOnce(T) -> StorageResult<UpdateOutcome<T>> + Send + 'a>;

/// Conditions the stored object must satisfy before it is deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preconditions {
    /// Required `metadata.uid`.
    pub uid: Option<String>,
    /// Required `metadata.resourceVersion`.
    pub resource_version: Option<String>,
}

impl Preconditions {
    /// Requires the given uid.
    pub fn uid(uid: impl Into<String>) -> Self {
        Self {
            uid: Some(uid.into()),
            resource_version: None,
        }
    }

    /// Fails with `Conflict` if `obj` does not satisfy every condition.
    pub fn check<T: Resource>(&self, key: &str, obj: &T) -> StorageResult<()> {
        let meta = obj.metadata();
        if let Some(uid) = &self.uid {
            if &meta.uid != uid {
                return Err(ConcurrencyError::Conflict {
                    key: key.to_string(),
                    message: format!("uid is {:?}, expected {uid:?}", meta.uid),
                }
                .into());
            }
        }
        if let Some(version) = &self.resource_version {
            if &meta.resource_version != version {
                return Err(ConcurrencyError::Conflict {
                    key: key.to_string(),
                    message: format!(
                        "resource version is {:?}, expected {version:?}",
                        meta.resource_version
                    ),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Object storage for one resource type.
///
/// Every operation takes a [`RequestContext`]; a cancelled or expired
/// context aborts the backend call and returns a context error. Results are
/// written into caller-supplied `out` parameters, which are only modified on
/// success (or zeroed, for [`get`](Store::get) with `ignore_not_found`).
///
/// No operation retries internally, and no sequence of round trips within an
/// operation is atomic: count-then-page in [`get_to_list`](Store::get_to_list)
/// and read-transform-write in [`guaranteed_update`](Store::guaranteed_update)
/// can interleave with other writers.
///
/// # Example
///
/// ```ignore
/// use apimaster_storage::core::{Store, UpdateOutcome};
/// use apimaster_storage::RequestContext;
///
/// async fn bump<S: Store<Widget>>(store: &S) -> StorageResult<()> {
///     let ctx = RequestContext::background();
///     let mut out = Widget::default();
///
///     store.create(&ctx, "ns/foo", &Widget::named("foo"), &mut out, 0).await?;
///     store
///         .guaranteed_update(
///             &ctx,
///             "ns/foo",
///             &mut out,
///             false,
///             None,
///             Box::new(|mut current: Widget| {
///                 current.count += 1;
///                 Ok(UpdateOutcome::new(current).changed("spec.count"))
///             }),
///         )
///         .await?;
///     assert_eq!(out.count, 1);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait Store<T: Resource>: Send + Sync {
    /// Returns a human-readable name for this storage backend.
    fn backend_name(&self) -> &'static str;

    /// Returns the versioner used to stamp objects read from this store.
    fn versioner(&self) -> ApiObjectVersioner {
        ApiObjectVersioner
    }

    /// Stores a new object under `key` and reads it back into `out`.
    ///
    /// # Arguments
    ///
    /// * `key` - The storage key
    /// * `obj` - The object to store
    /// * `out` - Receives the stored object as read back
    /// * `ttl` - Time-to-live in seconds; 0 means no expiry
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(AlreadyExists)` - If `key` is occupied; the
    ///   stored object is left unchanged
    /// * `StorageError::Backend` - If backend I/O or encoding fails
    async fn create(
        &self,
        ctx: &RequestContext,
        key: &str,
        obj: &T,
        out: &mut T,
        ttl: u64,
    ) -> StorageResult<()>;

    /// Removes the object under `key`, decoding its last value into `out`.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If `key` does not resolve
    /// * `StorageError::Concurrency(Conflict)` - If `preconditions` do not hold
    async fn delete(
        &self,
        ctx: &RequestContext,
        key: &str,
        out: &mut T,
        preconditions: Option<&Preconditions>,
    ) -> StorageResult<()>;

    /// Reads the object under `key` into `out`.
    ///
    /// On a missing key, `out` is reset to `T::default()` and the call
    /// succeeds if `ignore_not_found`; otherwise it fails with `NotFound`.
    async fn get(
        &self,
        ctx: &RequestContext,
        key: &str,
        out: &mut T,
        ignore_not_found: bool,
    ) -> StorageResult<()>;

    /// Appends every object matching `predicate` to `list`.
    ///
    /// Counts matching objects first, then fetches the requested page.
    /// `list.metadata.total_items` receives the count.
    async fn get_to_list(
        &self,
        ctx: &RequestContext,
        key: &str,
        predicate: &SelectionPredicate,
        list: &mut ResourceList<T>,
    ) -> StorageResult<()>;

    /// Reads, transforms and rewrites the object under `key`.
    ///
    /// The current object (or `T::default()` when absent and
    /// `ignore_not_found` is set) is passed to `try_update`. If the key was
    /// absent the result is created as by [`create`](Store::create);
    /// otherwise it overwrites the stored object. The stored result is read
    /// back into `out`.
    ///
    /// The write is not conditional on the value read: a concurrent writer
    /// between the read and the write is silently overwritten.
    /// `preconditions` are accepted for interface compatibility and not
    /// checked.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If `key` is absent and
    ///   `ignore_not_found` is false
    /// * Any error returned by `try_update`, unchanged
    async fn guaranteed_update(
        &self,
        ctx: &RequestContext,
        key: &str,
        out: &mut T,
        ignore_not_found: bool,
        preconditions: Option<&Preconditions>,
        try_update: UpdateFn<'_, T>,
    ) -> StorageResult<()>;
}
