//! Parsing checkpoint values from flags and JSON fields.

use crate::error::{CliError, CliResult};
use clap::ValueEnum;
use serde_json::Value;
use tidemark_store::CheckpointValue;

/// How a raw value is turned into a checkpoint value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ValueKind {
    /// Integer if it parses, else a date, else text
    Auto,
    /// Signed 64-bit integer
    Integer,
    /// Opaque text
    Text,
    /// RFC 3339 date-time, naive date-time (UTC) or plain date
    Date,
}

/// Parses a flag value.
pub fn parse(raw: &str, kind: ValueKind) -> CliResult<CheckpointValue> {
    match kind {
        ValueKind::Integer => raw
            .parse::<i64>()
            .map(CheckpointValue::Integer)
            .map_err(|e| CliError::Usage(format!("'{raw}' is not an integer: {e}"))),
        ValueKind::Text => Ok(CheckpointValue::Text(raw.to_string())),
        ValueKind::Date => CheckpointValue::parse_timestamp(raw)
            .map(CheckpointValue::Timestamp)
            .ok_or_else(|| CliError::Usage(format!("'{raw}' is not a date"))),
        ValueKind::Auto => Ok(raw
            .parse::<i64>()
            .map(CheckpointValue::Integer)
            .ok()
            .or_else(|| CheckpointValue::parse_timestamp(raw).map(CheckpointValue::Timestamp))
            .unwrap_or_else(|| CheckpointValue::Text(raw.to_string()))),
    }
}

/// Reads a record's key field.
pub fn from_json(field: &Value, kind: ValueKind) -> CliResult<CheckpointValue> {
    match field {
        Value::String(raw) => parse(raw, kind),
        Value::Number(n) => match (n.as_i64(), kind) {
            (Some(i), ValueKind::Text) => Ok(CheckpointValue::Text(i.to_string())),
            (Some(i), ValueKind::Auto | ValueKind::Integer) => Ok(CheckpointValue::Integer(i)),
            _ => Err(CliError::Usage(format!("unsupported numeric key {n}"))),
        },
        other => Err(CliError::Usage(format!("unsupported key {other}"))),
    }
}
