//! Buffered asynchronous metric writer.
//!
//! Producers enqueue records into a mutex-guarded buffer and never block on
//! storage I/O: hitting the batch-size threshold hands a copy of the buffer
//! to a bounded worker pool, and an independent background timer drains
//! whatever accumulates between thresholds. A failed flush drops the batch
//! after logging; retrying would grow the buffer without bound during a
//! sustained storage outage.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use crate::models::{FieldValue, MetricRecord};
use crate::storage::{DataPoint, MetricStore};

/// Overflow flushes in flight at once.
const FLUSH_WORKERS: u32 = 2;

/// Rate fields are clamped into `[0, 1e12]`; anything outside is treated as
/// corrupt and zeroed.
const MAX_RATE_VALUE: f64 = 1e12;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub buffer_size: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub records_enqueued: u64,
    pub batches_flushed: u64,
    pub records_written: u64,
    pub records_dropped: u64,
}

struct Inner {
    store: Arc<dyn MetricStore>,
    buffer: Mutex<Vec<MetricRecord>>,
    workers: Semaphore,
    shutdown: AtomicBool,
    records_enqueued: AtomicU64,
    batches_flushed: AtomicU64,
    records_written: AtomicU64,
    records_dropped: AtomicU64,
}

impl Inner {
    /// Converts a batch and writes it in one storage call. Records that
    /// fail conversion are skipped; a storage error drops the whole batch.
    fn flush_batch(&self, batch: Vec<MetricRecord>) {
        if batch.is_empty() {
            return;
        }
        let batch_len = batch.len();
        let mut points = Vec::with_capacity(batch_len);
        for record in batch {
            match to_data_point(record) {
                Ok(point) => points.push(point),
                Err(reason) => {
                    warn!("skipping unconvertible record: {reason}");
                    self.records_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        if points.is_empty() {
            warn!("no valid points in batch of {batch_len}");
            return;
        }

        match self.store.write(&points) {
            Ok(()) => {
                self.batches_flushed.fetch_add(1, Ordering::Relaxed);
                self.records_written
                    .fetch_add(points.len() as u64, Ordering::Relaxed);
                info!("flushed {} points to storage", points.len());
            }
            Err(e) => {
                self.records_dropped
                    .fetch_add(points.len() as u64, Ordering::Relaxed);
                error!("storage write failed, dropping {} points: {e}", points.len());
            }
        }
    }

    /// Copy-and-clear under the lock.
    fn swap_buffer(&self) -> Vec<MetricRecord> {
        let mut buffer = self.buffer.lock().expect("writer buffer poisoned");
        std::mem::take(&mut *buffer)
    }
}

pub struct BufferedWriter {
    inner: Arc<Inner>,
    batch_size: usize,
    flush_interval: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl BufferedWriter {
    /// Creates the writer and starts its background flush timer. Must be
    /// called inside a tokio runtime.
    pub fn new(store: Arc<dyn MetricStore>, batch_size: usize, flush_interval: Duration) -> Self {
        let inner = Arc::new(Inner {
            store,
            buffer: Mutex::new(Vec::new()),
            workers: Semaphore::new(FLUSH_WORKERS as usize),
            shutdown: AtomicBool::new(false),
            records_enqueued: AtomicU64::new(0),
            batches_flushed: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
        });

        let timer_inner = Arc::clone(&inner);
        let timer = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + flush_interval, flush_interval);
            loop {
                ticks.tick().await;
                if timer_inner.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                let batch = timer_inner.swap_buffer();
                if batch.is_empty() {
                    continue;
                }
                debug!("timer flush of {} buffered records", batch.len());
                timer_inner.flush_batch(batch);
            }
        });

        info!(
            "buffered writer started (batch_size={batch_size}, flush_interval={}s)",
            flush_interval.as_secs()
        );
        Self {
            inner,
            batch_size,
            flush_interval,
            timer: Mutex::new(Some(timer)),
        }
    }

    /// Appends records to the buffer. When the buffer reaches the batch
    /// size it is handed to the worker pool; the caller never waits on
    /// storage I/O.
    pub fn enqueue(&self, records: Vec<MetricRecord>) {
        if records.is_empty() {
            return;
        }
        if self.inner.shutdown.load(Ordering::SeqCst) {
            warn!("writer is shut down, dropping {} records", records.len());
            self.inner
                .records_dropped
                .fetch_add(records.len() as u64, Ordering::Relaxed);
            return;
        }

        self.inner
            .records_enqueued
            .fetch_add(records.len() as u64, Ordering::Relaxed);

        let overflow = {
            let mut buffer = self.inner.buffer.lock().expect("writer buffer poisoned");
            buffer.extend(records);
            if buffer.len() >= self.batch_size {
                Some(std::mem::take(&mut *buffer))
            } else {
                None
            }
        };

        if let Some(batch) = overflow {
            debug!("batch threshold hit, scheduling flush of {} records", batch.len());
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                let _permit = inner
                    .workers
                    .acquire()
                    .await
                    .expect("worker semaphore closed");
                inner.flush_batch(batch);
            });
        }
    }

    /// Synchronous flush of whatever the buffer holds, run inline. Used at
    /// shutdown and at explicit durability points.
    pub fn flush_now(&self) {
        let batch = self.inner.swap_buffer();
        if !batch.is_empty() {
            debug!("inline flush of {} buffered records", batch.len());
            self.inner.flush_batch(batch);
        }
    }

    pub fn stats(&self) -> WriterStats {
        WriterStats {
            buffer_size: self
                .inner
                .buffer
                .lock()
                .expect("writer buffer poisoned")
                .len(),
            batch_size: self.batch_size,
            flush_interval: self.flush_interval,
            records_enqueued: self.inner.records_enqueued.load(Ordering::Relaxed),
            batches_flushed: self.inner.batches_flushed.load(Ordering::Relaxed),
            records_written: self.inner.records_written.load(Ordering::Relaxed),
            records_dropped: self.inner.records_dropped.load(Ordering::Relaxed),
        }
    }

    /// Stops the timer, flushes the remaining buffer, waits for in-flight
    /// worker flushes, and releases the store. Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutting down buffered writer");

        if let Some(timer) = self.timer.lock().expect("timer handle poisoned").take() {
            timer.abort();
        }

        self.flush_now();

        // Draining every permit waits out the in-flight overflow flushes.
        let _all = self
            .inner
            .workers
            .acquire_many(FLUSH_WORKERS)
            .await
            .expect("worker semaphore closed");

        self.inner.store.close();
        info!("buffered writer shut down");
    }
}

/// Applies the storage conversion rules to one record.
///
/// Blank tag values are dropped, rate fields are clamped, booleans and
/// numerics pass through, and anything else is already textual.
fn to_data_point(record: MetricRecord) -> Result<DataPoint, String> {
    if record.measurement.trim().is_empty() {
        return Err("record has no measurement name".to_string());
    }

    let tags = record
        .tags
        .into_iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .collect();

    let fields = record
        .fields
        .into_iter()
        .map(|(name, value)| {
            let value = match value {
                FieldValue::Float(v) if name.ends_with("_rate") => {
                    if !v.is_finite() || v < 0.0 || v > MAX_RATE_VALUE {
                        FieldValue::Float(0.0)
                    } else {
                        FieldValue::Float(v)
                    }
                }
                other => other,
            };
            (name, value)
        })
        .collect();

    Ok(DataPoint {
        measurement: record.measurement,
        tags,
        fields,
        timestamp_ns: record.timestamp_ns,
    })
}
