//! Stored document layout.

use bson::{Document, doc};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Field holding the encoded object.
pub(crate) const PAYLOAD_FIELD: &str = "obj";

/// One stored object: `{ key, uid, ttl, obj }`.
///
/// The encoded object is kept as a JSON string so selector regexes can
/// match against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocObject {
    /// Storage key.
    pub key: String,
    /// Random identifier assigned on insert.
    pub uid: String,
    /// Expiry instant watched by the TTL index.
    pub ttl: bson::DateTime,
    /// Encoded object.
    pub obj: String,
}

impl DocObject {
    /// Builds a document expiring `ttl` seconds after `now`.
    pub fn new(key: &str, payload: Vec<u8>, ttl: u64, now: DateTime<Utc>) -> Result<Self, String> {
        let obj = String::from_utf8(payload).map_err(|e| format!("payload is not UTF-8: {e}"))?;
        Ok(Self {
            key: key.to_string(),
            uid: uuid::Uuid::new_v4().to_string(),
            ttl: to_bson_datetime(expiry(ttl, now)),
            obj,
        })
    }

    /// Serializes into a BSON document.
    pub fn to_document(&self) -> Result<Document, String> {
        bson::to_document(self).map_err(|e| e.to_string())
    }

    /// Reads a stored BSON document.
    pub fn from_document(doc: Document) -> Result<Self, String> {
        bson::from_document(doc).map_err(|e| e.to_string())
    }
}

/// Filter selecting the document stored under `key`.
pub(crate) fn key_filter(key: &str) -> Document {
    doc! { "key": key }
}

/// Expiry used for a time-to-live of zero.
pub fn ttl_forever() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2200, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Absolute expiry for a time-to-live in seconds; zero never expires.
pub fn expiry(ttl: u64, now: DateTime<Utc>) -> DateTime<Utc> {
    if ttl == 0 {
        return ttl_forever();
    }
    i64::try_from(ttl)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or_else(ttl_forever)
}

pub(crate) fn to_bson_datetime(at: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(at.timestamp_millis())
}
