use anyhow::Result;
use rusqlite::Connection;

pub fn create_tables(conn: &Connection) -> Result<()> {
    // One row per metric point; tags and fields are kept as JSON documents
    // keyed by the measurement name and nanosecond timestamp.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS metric_points (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            measurement TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '{}',
            fields TEXT NOT NULL DEFAULT '{}',
            timestamp_ns INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_metric_points_measurement_ts
         ON metric_points (measurement, timestamp_ns)",
        [],
    )?;

    Ok(())
}
