//! On-wire shape of a persisted snapshot.
//!
//! ```text
//! {
//!   "<property>": <value>,
//!   ...,
//!   "__keepsake__": { "expireInTimestamp": <unix ms>, "version": <n> }
//! }
//! ```
//!
//! The metadata field is omitted entirely when neither expiration nor a
//! version is configured.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved field name carrying envelope metadata.
pub const METADATA_FIELD: &str = "__keepsake__";

/// A persisted snapshot: property name to serialized value.
pub type Snapshot = Map<String, Value>;

/// Expiration and version metadata stored alongside a snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeMeta {
    /// Absolute Unix-ms timestamp at which the entry stops being valid.
    #[serde(
        rename = "expireInTimestamp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub expire_in_timestamp: Option<i64>,

    /// Version the entry was written under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

impl EnvelopeMeta {
    /// Build the metadata for a write, or `None` if nothing needs recording.
    pub fn for_write(now_millis: i64, expire_in: Option<i64>, version: Option<u32>) -> Option<Self> {
        if expire_in.is_none() && version.is_none() {
            return None;
        }
        Some(Self {
            expire_in_timestamp: expire_in.map(|ms| now_millis.saturating_add(ms)),
            version,
        })
    }

    /// Lenient extraction from stored data.
    ///
    /// A malformed metadata object never fails: a non-numeric timestamp reads
    /// as "no timestamp" and a non-integer version as "no version".
    pub fn from_stored(value: Option<&Value>) -> Self {
        let Some(Value::Object(meta)) = value else {
            return Self::default();
        };
        let expire_in_timestamp = meta.get("expireInTimestamp").and_then(|ts| {
            ts.as_i64()
                .or_else(|| ts.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
        });
        let version = meta
            .get("version")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok());
        Self {
            expire_in_timestamp,
            version,
        }
    }

    /// An entry is expired once its timestamp is at or before `now`.
    /// No timestamp means it never expires.
    pub fn is_expired(&self, now_millis: i64) -> bool {
        match self.expire_in_timestamp {
            Some(ts) => ts <= now_millis,
            None => false,
        }
    }

    /// A configured version that differs from the stored one is a mismatch.
    /// With no configured version every entry matches.
    pub fn is_version_mismatch(&self, configured: Option<u32>) -> bool {
        match configured {
            Some(expected) => self.version != Some(expected),
            None => false,
        }
    }
}

/// Attach metadata to a snapshot, producing the value handed to the backend.
pub fn seal(mut data: Snapshot, meta: Option<EnvelopeMeta>) -> Value {
    data.remove(METADATA_FIELD);
    if let Some(meta) = meta {
        // EnvelopeMeta only holds integers; serialization cannot fail.
        if let Ok(meta) = serde_json::to_value(meta) {
            data.insert(METADATA_FIELD.to_string(), meta);
        }
    }
    Value::Object(data)
}

/// Split a parsed stored value into its data and metadata.
///
/// Anything that is not a JSON object has no usable data.
pub fn open(value: Value) -> (Snapshot, EnvelopeMeta) {
    match value {
        Value::Object(mut data) => {
            let meta = EnvelopeMeta::from_stored(data.get(METADATA_FIELD));
            data.remove(METADATA_FIELD);
            (data, meta)
        }
        _ => (Snapshot::new(), EnvelopeMeta::default()),
    }
}
