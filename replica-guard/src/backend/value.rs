//! Backend-neutral values and rows.

use crate::error::{ErrorContext, GuardError, Result};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Date64Array, Float64Array, Int64Array,
    StringArray, TimestampMicrosecondArray, TimestampMillisecondArray, TimestampNanosecondArray,
    TimestampSecondArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::fmt;

/// A single value returned by a backend.
///
/// Timestamps are always UTC. Values coming from zone-less timestamp columns
/// are interpreted as UTC wall-clock time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

/// One result row.
pub type Row = Vec<Value>;

impl Value {
    /// Interprets the value as an integer count.
    ///
    /// Integral floats and numeric text (the PostgreSQL simple-query
    /// protocol returns everything as text) are accepted.
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::Int(v) => Ok(*v),
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() => Ok(*v as i64),
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|e| GuardError::Parse(format!("'{s}' is not an integer: {e}"))),
            other => Err(GuardError::Parse(format!(
                "expected an integer, found {other:?}"
            ))),
        }
    }

    /// Interprets the value as an optional UTC timestamp.
    ///
    /// NULL maps to `None`. Text is parsed as RFC 3339 or as one of the
    /// `YYYY-MM-DD HH:MM:SS[.fff][ UTC|+zz:zz]` layouts engines commonly emit.
    pub fn as_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        match self {
            Value::Null => Ok(None),
            Value::Timestamp(ts) => Ok(Some(*ts)),
            Value::Text(s) => parse_timestamp(s).map(Some),
            other => Err(GuardError::Parse(format!(
                "expected a timestamp, found {other:?}"
            ))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f UTC")),
        }
    }
}

/// Zone names Trino may print for a zero offset.
const UTC_ZONE_NAMES: [&str; 6] = ["UTC", "Z", "GMT", "Etc/UTC", "Etc/GMT", "Zulu"];

/// `America/Bogota`, `CET` and the like; offsets such as `+02:00` are not names.
fn is_zone_name(token: &str) -> bool {
    token.starts_with(|c: char| c.is_ascii_alphabetic())
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-' | '+'))
}

/// Parses the timestamp layouts produced by PostgreSQL, Trino and DataFusion.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    let trimmed = text.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }

    let without_utc = match trimmed.rsplit_once(' ') {
        Some((rest, zone)) if UTC_ZONE_NAMES.contains(&zone) => rest,
        Some((_, zone)) if is_zone_name(zone) => {
            return Err(GuardError::Parse(format!(
                "'{text}' uses time zone '{zone}'; only UTC and numeric offsets are supported"
            )));
        }
        _ => trimmed.strip_suffix('Z').unwrap_or(trimmed),
    };

    for layout in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%#z"] {
        if let Ok(ts) = DateTime::parse_from_str(without_utc, layout) {
            return Ok(ts.with_timezone(&Utc));
        }
    }

    for layout in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(without_utc, layout) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(without_utc, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    Err(GuardError::Parse(format!(
        "'{text}' is not a recognised timestamp"
    )))
}

/// Converts Arrow record batches into rows.
pub fn rows_from_batches(batches: &[RecordBatch]) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    for batch in batches {
        let columns = batch
            .columns()
            .iter()
            .map(normalize_column)
            .collect::<Result<Vec<_>>>()?;
        for row_idx in 0..batch.num_rows() {
            let row = columns
                .iter()
                .map(|column| value_at(column, row_idx))
                .collect::<Result<Row>>()?;
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Casts integer, float and string families to one representative type each.
fn normalize_column(column: &ArrayRef) -> Result<ArrayRef> {
    let target = match column.data_type() {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => Some(DataType::Int64),
        DataType::Float16 | DataType::Float32 | DataType::Decimal128(_, _) => {
            Some(DataType::Float64)
        }
        DataType::LargeUtf8 | DataType::Utf8View => Some(DataType::Utf8),
        _ => None,
    };

    match target {
        Some(data_type) => cast(column, &data_type)
            .with_context(|| format!("cannot read {} result column", column.data_type())),
        None => Ok(column.clone()),
    }
}

fn value_at(column: &ArrayRef, idx: usize) -> Result<Value> {
    if column.is_null(idx) {
        return Ok(Value::Null);
    }

    let any = column.as_any();
    let value = match column.data_type() {
        DataType::Null => Value::Null,
        DataType::Boolean => Value::Bool(downcast::<BooleanArray>(any)?.value(idx)),
        DataType::Int64 => Value::Int(downcast::<Int64Array>(any)?.value(idx)),
        DataType::Float64 => Value::Float(downcast::<Float64Array>(any)?.value(idx)),
        DataType::Utf8 => Value::Text(downcast::<StringArray>(any)?.value(idx).to_string()),
        DataType::Timestamp(unit, _) => {
            let ts = match unit {
                TimeUnit::Second => {
                    DateTime::from_timestamp(downcast::<TimestampSecondArray>(any)?.value(idx), 0)
                }
                TimeUnit::Millisecond => DateTime::from_timestamp_millis(
                    downcast::<TimestampMillisecondArray>(any)?.value(idx),
                ),
                TimeUnit::Microsecond => DateTime::from_timestamp_micros(
                    downcast::<TimestampMicrosecondArray>(any)?.value(idx),
                ),
                TimeUnit::Nanosecond => Some(DateTime::from_timestamp_nanos(
                    downcast::<TimestampNanosecondArray>(any)?.value(idx),
                )),
            };
            ts.map(Value::Timestamp).ok_or_else(|| {
                GuardError::Parse("timestamp out of representable range".to_string())
            })?
        }
        DataType::Date32 => {
            let days = downcast::<Date32Array>(any)?.value(idx) as i64;
            DateTime::from_timestamp(days * 86_400, 0)
                .map(Value::Timestamp)
                .ok_or_else(|| GuardError::Parse("date out of representable range".to_string()))?
        }
        DataType::Date64 => DateTime::from_timestamp_millis(downcast::<Date64Array>(any)?.value(idx))
            .map(Value::Timestamp)
            .ok_or_else(|| GuardError::Parse("date out of representable range".to_string()))?,
        _ => Value::Text(array_value_to_string(column, idx)?),
    };
    Ok(value)
}

fn downcast<T: 'static>(any: &dyn std::any::Any) -> Result<&T> {
    any.downcast_ref::<T>()
        .ok_or_else(|| GuardError::Internal("unexpected Arrow array type".to_string()))
}
