//! Shared data types produced by the collectors and consumed by the writer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single field value inside a metric record.
///
/// Counters are carried as unsigned integers, rates as floats; anything the
/// collectors cannot classify stays textual and is stringified on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Float(f64),
    Unsigned(u64),
    Bool(bool),
    Text(String),
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Unsigned(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

/// Normalized output unit of a collection cycle.
///
/// Immutable once created; produced by the traffic engine and consumed only
/// by the buffered writer. The timestamp is a nanosecond unix epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRecord {
    pub measurement: String,
    pub tags: HashMap<String, String>,
    pub fields: HashMap<String, FieldValue>,
    pub timestamp_ns: i64,
}

impl MetricRecord {
    pub fn new(measurement: impl Into<String>, timestamp_ns: i64) -> Self {
        Self {
            measurement: measurement.into(),
            tags: HashMap::new(),
            fields: HashMap::new(),
            timestamp_ns,
        }
    }
}

/// A discovered network port, cached wholesale by the traffic engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub ne_id: String,
    pub port_id: String,
    pub port_name: String,
    pub port_type: String,
    pub bandwidth: u64,
}

impl Port {
    /// Composite cache key, `"neId|portId"`.
    pub fn key(&self) -> String {
        port_key(&self.ne_id, &self.port_id)
    }
}

pub fn port_key(ne_id: &str, port_id: &str) -> String {
    format!("{ne_id}|{port_id}")
}

/// Converts a UTC timestamp to the nanosecond epoch used on records.
pub fn to_epoch_nanos(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt().unwrap_or(0)
}
