//! SQLite-backed metric store.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use rusqlite::{params, Connection};

use super::schema::create_tables;
use super::{DataPoint, MetricStore, StorageError};

pub struct SqliteMetricStore {
    conn: Arc<Mutex<Connection>>,
    closed: AtomicBool,
}

impl SqliteMetricStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(&db_path).context("Failed to open database connection")?;

        // WAL mode for concurrent reads while the writer flushes (ignore
        // errors for in-memory databases).
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")?;

        create_tables(&conn).context("Failed to create database tables")?;

        info!(
            "metric store initialized at {}",
            db_path.as_ref().display()
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        create_tables(&conn).context("Failed to create database tables")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            closed: AtomicBool::new(false),
        })
    }

    /// Number of stored points, used by tests and the stats output.
    pub fn point_count(&self) -> Result<u64, StorageError> {
        let conn = self.conn.lock().expect("store connection poisoned");
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM metric_points", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl MetricStore for SqliteMetricStore {
    fn health_check(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let conn = self.conn.lock().expect("store connection poisoned");
        match conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)) {
            Ok(_) => true,
            Err(e) => {
                warn!("metric store health check failed: {e}");
                false
            }
        }
    }

    fn write(&self, points: &[DataPoint]) -> Result<(), StorageError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        if points.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().expect("store connection poisoned");
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO metric_points (measurement, tags, fields, timestamp_ns)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for point in points {
                stmt.execute(params![
                    point.measurement,
                    serde_json::to_string(&point.tags)?,
                    serde_json::to_string(&point.fields)?,
                    point.timestamp_ns,
                ])?;
            }
        }
        tx.commit()?;

        debug!("wrote {} points to metric store", points.len());
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("metric store closed");
    }
}
