//! Time-series storage interface.
//!
//! The store is an external collaborator: the core only needs a health
//! probe, a batched point write, and a close hook. The bundled
//! implementation persists points to SQLite; swapping in another backend is
//! a matter of implementing [`MetricStore`].

pub mod schema;
pub mod sqlite;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sqlite::SqliteMetricStore;

use crate::models::FieldValue;

/// Write failure against the time-series store. Batches that fail to write
/// are dropped after logging; there is no internal retry.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("point serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store is closed")]
    Closed,
}

/// A storage-ready point: conversion rules (blank-tag dropping, rate
/// clamping, stringification) have already been applied by the writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPoint {
    pub measurement: String,
    pub tags: HashMap<String, String>,
    pub fields: HashMap<String, FieldValue>,
    pub timestamp_ns: i64,
}

/// Write interface consumed by the buffered writer.
pub trait MetricStore: Send + Sync {
    /// Connectivity probe; `false` means writes are expected to fail.
    fn health_check(&self) -> bool;

    /// Writes the whole point set in one call.
    fn write(&self, points: &[DataPoint]) -> Result<(), StorageError>;

    /// Releases the underlying connection. Idempotent.
    fn close(&self);
}
