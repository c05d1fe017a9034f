//! Turns raw backend records into decoded objects.
//!
//! Only the encoded payload is read back; mirrored columns and attributes
//! exist for filtering and never contribute to the decoded state.

use crate::codec::{ApiObjectVersioner, Codec, RESOURCE_VERSION_EXISTS};
use crate::error::{StorageError, StorageResult};
use crate::types::{Resource, ResourceList};

/// A record as persisted by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// The authoritative encoded object.
    pub encoded_payload: Vec<u8>,
    /// The key the record is stored under.
    pub resource_key: String,
}

impl RawRecord {
    /// Creates a record.
    pub fn new(encoded_payload: Vec<u8>, resource_key: impl Into<String>) -> Self {
        Self {
            encoded_payload,
            resource_key: resource_key.into(),
        }
    }
}

/// How decoded objects are stamped.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Backend named in decode errors.
    pub backend_name: &'static str,
    /// Overwrite `metadata.name` with the record's resource key.
    pub name_from_resource_key: bool,
}

impl DecodeOptions {
    /// Options for records read from `backend_name`.
    pub fn new(backend_name: &'static str) -> Self {
        Self {
            backend_name,
            name_from_resource_key: false,
        }
    }

    /// Also set `metadata.name` from the resource key.
    pub fn with_name_from_resource_key(mut self) -> Self {
        self.name_from_resource_key = true;
        self
    }
}

/// Decodes `record` into `out` and stamps its version metadata.
pub fn decode_record<C: Codec, T: Resource>(
    codec: &C,
    record: &RawRecord,
    out: &mut T,
    options: DecodeOptions,
) -> StorageResult<()> {
    codec
        .decode(&record.encoded_payload, out)
        .map_err(|err| match err {
            StorageError::Validation(_) => err,
            other => StorageError::internal(
                options.backend_name,
                &record.resource_key,
                format!("cannot decode stored payload: {other}"),
            ),
        })?;
    stamp(out, &record.resource_key, options);
    Ok(())
}

/// Decodes every record and appends it to `list`.
pub fn decode_list<C: Codec, T: Resource>(
    codec: &C,
    records: &[RawRecord],
    list: &mut ResourceList<T>,
    options: DecodeOptions,
) -> StorageResult<()> {
    list.items.reserve(records.len());
    for record in records {
        let mut item = T::default();
        decode_record(codec, record, &mut item, options)?;
        list.items.push(item);
    }
    ApiObjectVersioner.update_list(list, RESOURCE_VERSION_EXISTS);
    Ok(())
}

fn stamp<T: Resource>(obj: &mut T, resource_key: &str, options: DecodeOptions) {
    ApiObjectVersioner.update_object(obj, RESOURCE_VERSION_EXISTS);
    if options.name_from_resource_key {
        obj.metadata_mut().name = resource_key.to_string();
    }
}
