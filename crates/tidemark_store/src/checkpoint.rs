//! Checkpoint model and its persisted JSON form.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Discriminator written to the `type` field for timestamp values.
pub const DATE_TYPE_TAG: &str = "date";

/// Name of one independently checkpointed sync stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamName(String);

impl StreamName {
    /// Creates a stream name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for StreamName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Progress marker of a checkpoint.
///
/// The variant is explicit so the persisted form can carry a discriminator
/// instead of guessing the type on load.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CheckpointValue {
    /// Integer key, typically an auto-increment id.
    Integer(i64),
    /// Opaque text key.
    Text(String),
    /// Point in time, typically a `modified_at` column.
    Timestamp(DateTime<Utc>),
}

impl CheckpointValue {
    /// Parses an ISO 8601 timestamp.
    ///
    /// Accepts RFC 3339, a naive date-time (taken as UTC) or a bare date
    /// (midnight UTC).
    pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
                return Some(Utc.from_utc_datetime(&naive));
            }
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    /// Returns true for the `Timestamp` variant.
    pub fn is_timestamp(&self) -> bool {
        matches!(self, CheckpointValue::Timestamp(_))
    }
}

impl PartialOrd for CheckpointValue {
    /// Values of different variants are unordered.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (CheckpointValue::Integer(a), CheckpointValue::Integer(b)) => Some(a.cmp(b)),
            (CheckpointValue::Text(a), CheckpointValue::Text(b)) => Some(a.cmp(b)),
            (CheckpointValue::Timestamp(a), CheckpointValue::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for CheckpointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointValue::Integer(n) => write!(f, "{n}"),
            CheckpointValue::Text(s) => f.write_str(s),
            CheckpointValue::Timestamp(ts) => {
                f.write_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

impl From<i64> for CheckpointValue {
    fn from(n: i64) -> Self {
        CheckpointValue::Integer(n)
    }
}

impl From<i32> for CheckpointValue {
    fn from(n: i32) -> Self {
        CheckpointValue::Integer(i64::from(n))
    }
}

impl From<u32> for CheckpointValue {
    fn from(n: u32) -> Self {
        CheckpointValue::Integer(i64::from(n))
    }
}

impl From<String> for CheckpointValue {
    fn from(s: String) -> Self {
        CheckpointValue::Text(s)
    }
}

impl From<&str> for CheckpointValue {
    fn from(s: &str) -> Self {
        CheckpointValue::Text(s.to_string())
    }
}

impl From<DateTime<Utc>> for CheckpointValue {
    fn from(ts: DateTime<Utc>) -> Self {
        CheckpointValue::Timestamp(ts)
    }
}

impl From<NaiveDate> for CheckpointValue {
    fn from(date: NaiveDate) -> Self {
        let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        CheckpointValue::Timestamp(Utc.from_utc_datetime(&midnight))
    }
}

/// Durable sync progress of one stream.
///
/// `value` drives the `since` parameter of the next fetch. `offset` is only
/// used when `value` did not move between pages. The two are only ever
/// changed together through [`Checkpoint::set_position`].
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    stream: StreamName,
    value: Option<CheckpointValue>,
    offset: u64,
    modified: Option<DateTime<Utc>>,
}

impl Checkpoint {
    /// Creates a checkpoint that has never been saved.
    pub fn new(stream: StreamName, value: Option<CheckpointValue>, offset: u64) -> Self {
        Self {
            stream,
            value,
            offset,
            modified: None,
        }
    }

    /// Stream this checkpoint belongs to.
    pub fn stream(&self) -> &StreamName {
        &self.stream
    }

    /// Last-seen progress marker.
    pub fn value(&self) -> Option<&CheckpointValue> {
        self.value.as_ref()
    }

    /// Secondary page offset within `value`.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// When the store last wrote this checkpoint.
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    /// Replaces value and offset as one unit.
    pub fn set_position(&mut self, value: Option<CheckpointValue>, offset: u64) {
        self.value = value;
        self.offset = offset;
    }

    pub(crate) fn touch(&mut self) {
        self.modified = Some(Utc::now());
    }

    pub(crate) fn with_modified(mut self, modified: Option<DateTime<Utc>>) -> Self {
        self.modified = modified;
        self
    }

    /// Converts to the persisted record shape.
    pub fn to_record(&self) -> CheckpointRecord {
        let (value, value_type) = match &self.value {
            None => (serde_json::Value::Null, None),
            Some(CheckpointValue::Integer(n)) => (serde_json::Value::from(*n), None),
            Some(CheckpointValue::Text(s)) => (serde_json::Value::from(s.clone()), None),
            Some(CheckpointValue::Timestamp(ts)) => (
                serde_json::Value::from(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
                Some(DATE_TYPE_TAG.to_string()),
            ),
        };
        CheckpointRecord {
            value,
            value_type,
            offset: self.offset,
        }
    }

    /// Builds a checkpoint from its persisted record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupted`] if the record's value does not match
    /// its declared type.
    pub fn from_record(stream: StreamName, record: CheckpointRecord) -> StoreResult<Self> {
        let value = record.decode_value()?;
        Ok(Self::new(stream, value, record.offset))
    }

    /// Encodes the checkpoint into its JSON blob.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> StoreResult<String> {
        Ok(serde_json::to_string(&self.to_record())?)
    }

    /// Decodes a checkpoint from its JSON blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob is not valid JSON or has the wrong shape.
    pub fn from_json(stream: StreamName, json: &str) -> StoreResult<Self> {
        let record: CheckpointRecord = serde_json::from_str(json)?;
        Self::from_record(stream, record)
    }
}

/// Persisted checkpoint shape shared by the file and `SQLite` backends.
///
/// ```json
/// {"value": "2024-03-01T12:00:00Z", "type": "date", "offset": 0}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Progress value: a string, an integer or null.
    #[serde(default)]
    pub value: serde_json::Value,
    /// `"date"` for timestamps, absent or null otherwise.
    #[serde(rename = "type", default)]
    pub value_type: Option<String>,
    /// Page offset within `value`.
    #[serde(default)]
    pub offset: u64,
}

impl CheckpointRecord {
    fn decode_value(&self) -> StoreResult<Option<CheckpointValue>> {
        use serde_json::Value;

        match (self.value_type.as_deref(), &self.value) {
            (_, Value::Null) => Ok(None),
            (Some(DATE_TYPE_TAG), Value::String(raw)) => CheckpointValue::parse_timestamp(raw)
                .map(|ts| Some(CheckpointValue::Timestamp(ts)))
                .ok_or_else(|| StoreError::Corrupted(format!("invalid date value {raw:?}"))),
            (Some(DATE_TYPE_TAG), other) => Err(StoreError::Corrupted(format!(
                "date value must be a string, got {other}"
            ))),
            (Some(other), _) => Err(StoreError::Corrupted(format!(
                "unknown value type {other:?}"
            ))),
            (None, Value::Number(n)) => n
                .as_i64()
                .map(|n| Some(CheckpointValue::Integer(n)))
                .ok_or_else(|| StoreError::Corrupted(format!("non-integer value {n}"))),
            (None, Value::String(s)) => Ok(Some(CheckpointValue::Text(s.clone()))),
            (None, other) => Err(StoreError::Corrupted(format!(
                "unsupported value {other}"
            ))),
        }
    }
}
