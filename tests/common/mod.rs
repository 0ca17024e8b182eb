//! Shared test doubles: a scriptable SNMP transport and an in-memory store.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pm_watcher::snmp::{SnmpTransport, SnmpValue, TransportError};
use pm_watcher::storage::{DataPoint, MetricStore, StorageError};

/// Scriptable transport. GET responses are per-OID queues where the last
/// entry is sticky, so a state sequence like PENDING, STARTED, FINISHED can
/// be scripted once and polled any number of times.
#[derive(Default)]
pub struct MockTransport {
    gets: Mutex<HashMap<String, VecDeque<SnmpValue>>>,
    walks: Mutex<HashMap<String, Vec<(String, SnmpValue)>>>,
    /// SET calls whose varbind OIDs contain this substring fail.
    failing_set_oid: Mutex<Option<String>>,
    pub sets: Mutex<Vec<Vec<(String, SnmpValue)>>>,
    pub get_calls: AtomicUsize,
    pub walk_calls: AtomicUsize,
    pub set_calls: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_get(&self, oid: &str, values: Vec<SnmpValue>) {
        self.gets
            .lock()
            .unwrap()
            .insert(oid.to_string(), values.into());
    }

    pub fn script_walk(&self, base_oid: &str, rows: Vec<(String, SnmpValue)>) {
        self.walks.lock().unwrap().insert(base_oid.to_string(), rows);
    }

    pub fn fail_sets_containing(&self, oid_fragment: &str) {
        *self.failing_set_oid.lock().unwrap() = Some(oid_fragment.to_string());
    }

    /// OIDs of every varbind seen across all SET calls, in order.
    pub fn set_oids(&self) -> Vec<String> {
        self.sets
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|(oid, _)| oid.clone())
            .collect()
    }
}

#[async_trait]
impl SnmpTransport for MockTransport {
    async fn get(&self, oid: &str) -> Result<SnmpValue, TransportError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let mut gets = self.gets.lock().unwrap();
        match gets.get_mut(oid) {
            Some(queue) if queue.len() > 1 => Ok(queue.pop_front().unwrap()),
            Some(queue) => queue
                .front()
                .cloned()
                .ok_or(TransportError::Timeout(Duration::from_secs(1))),
            None => Err(TransportError::Timeout(Duration::from_secs(1))),
        }
    }

    async fn walk(&self, base_oid: &str) -> Result<Vec<(String, SnmpValue)>, TransportError> {
        self.walk_calls.fetch_add(1, Ordering::SeqCst);
        self.walks
            .lock()
            .unwrap()
            .get(base_oid)
            .cloned()
            .ok_or(TransportError::Timeout(Duration::from_secs(1)))
    }

    async fn set(&self, varbinds: &[(String, SnmpValue)]) -> Result<(), TransportError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.sets.lock().unwrap().push(varbinds.to_vec());
        if let Some(fragment) = self.failing_set_oid.lock().unwrap().as_deref() {
            if varbinds.iter().any(|(oid, _)| oid.contains(fragment)) {
                return Err(TransportError::Session("set rejected".to_string()));
            }
        }
        Ok(())
    }
}

/// Store that records every write batch. Can be switched to fail writes.
#[derive(Default)]
pub struct MockStore {
    pub writes: Mutex<Vec<Vec<DataPoint>>>,
    pub fail_writes: AtomicBool,
    pub closed: AtomicBool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn total_points(&self) -> usize {
        self.writes.lock().unwrap().iter().map(Vec::len).sum()
    }
}

impl MetricStore for MockStore {
    fn health_check(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn write(&self, points: &[DataPoint]) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        self.writes.lock().unwrap().push(points.to_vec());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
