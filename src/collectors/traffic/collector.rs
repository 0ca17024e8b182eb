//! Port traffic collection through the PM request workflow.
//!
//! Discovers ports from the NE manager's port table (cached with a TTL),
//! partitions them into request-sized batches, drives one PM request per
//! batch, correlates the two result tables into per-port records, and turns
//! cumulative counters into rates against the previous cycle's samples.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use regex::RegexBuilder;
use tokio::time::sleep;

use crate::models::{port_key, to_epoch_nanos, FieldValue, MetricRecord, Port};
use crate::pm::{PmFilterType, PmRequestManager, PmRequestType, PmpRecord, ValueRecord};
use crate::snmp::mib::{port_field, OID_PM_REQUEST_NEXT_ID, OID_PORT_ENTRY};
use crate::snmp::{oid_suffix, SnmpTransport};

use super::counters::{calculate_rates, parse_counter_values, TrafficCounter};

pub const MEASUREMENT: &str = "port_traffic";

/// Tunables for the collection workflow, sourced from the `pm` section of
/// the application config.
#[derive(Debug, Clone)]
pub struct TrafficSettings {
    /// Ports per PM request; bounds both the filter value length and the
    /// result-table size per request.
    pub batch_size: usize,
    /// Hard timeout for one PM request execution.
    pub request_timeout: Duration,
    /// Whole-attempt retries inside `execute`.
    pub request_retries: u32,
    /// Optional case-insensitive regex applied to cached port names.
    pub port_filter: Option<String>,
    /// Port cache lifetime; the cache is invalidated wholesale on expiry.
    pub cache_ttl: Duration,
    /// Pause between batches to bound load on the remote system.
    pub batch_delay: Duration,
}

impl Default for TrafficSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            request_timeout: Duration::from_secs(60),
            request_retries: 3,
            port_filter: None,
            cache_ttl: Duration::from_secs(300),
            batch_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortStatistics {
    pub total_ports: usize,
    pub ports_with_traffic_data: usize,
    pub last_collection_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterCleanup {
    pub expired: usize,
    pub evicted: usize,
}

struct PortCache {
    ports: HashMap<String, Port>,
    refreshed_at: DateTime<Utc>,
}

pub struct PortTrafficCollector {
    transport: Arc<dyn SnmpTransport>,
    manager: PmRequestManager,
    settings: TrafficSettings,
    port_cache: Mutex<Option<PortCache>>,
    previous_counters: Mutex<HashMap<String, TrafficCounter>>,
}

impl PortTrafficCollector {
    pub fn new(transport: Arc<dyn SnmpTransport>, settings: TrafficSettings) -> Self {
        let manager = PmRequestManager::new(Arc::clone(&transport));
        Self {
            transport,
            manager,
            settings,
            port_cache: Mutex::new(None),
            previous_counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn manager(&self) -> &PmRequestManager {
        &self.manager
    }

    /// Cheap connectivity probe: the next-request-id scalar answers on any
    /// PM-capable agent.
    pub async fn probe(&self) -> bool {
        match self.transport.get(OID_PM_REQUEST_NEXT_ID).await {
            Ok(value) => {
                info!("SNMP probe ok, next PM request id {value}");
                true
            }
            Err(e) => {
                warn!("SNMP probe failed: {e}");
                false
            }
        }
    }

    /// Discovers ports from the port table, serving cached results within
    /// the TTL. The name filter applies to the cached set without
    /// re-walking; an invalid regex degrades to no filtering.
    pub async fn discover_ports(&self, name_filter: Option<&str>) -> HashMap<String, Port> {
        let now = Utc::now();
        {
            let cache = self.port_cache.lock().expect("port cache poisoned");
            if let Some(cached) = cache.as_ref() {
                let age = (now - cached.refreshed_at)
                    .to_std()
                    .unwrap_or(Duration::MAX);
                if age < self.settings.cache_ttl && !cached.ports.is_empty() {
                    debug!("serving {} ports from cache", cached.ports.len());
                    return Self::filter_ports(&cached.ports, name_filter);
                }
            }
        }

        info!("discovering network ports");
        let rows = match self.transport.walk(OID_PORT_ENTRY).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("port discovery walk failed: {e}");
                return HashMap::new();
            }
        };

        // Rows arrive one column at a time; group them by (neId, portId)
        // and keep only entries where a name column was observed.
        let mut partial: HashMap<String, Port> = HashMap::new();
        for (oid, value) in &rows {
            let Some(suffix) = oid_suffix(oid, OID_PORT_ENTRY) else {
                continue;
            };
            if suffix.len() < 3 {
                continue;
            }
            let (field, ne_id, pid) = (suffix[0], suffix[1], suffix[2]);
            let key = port_key(ne_id, pid);
            let port = partial.entry(key).or_insert_with(|| Port {
                ne_id: ne_id.to_string(),
                port_id: pid.to_string(),
                port_name: String::new(),
                port_type: String::new(),
                bandwidth: 0,
            });
            match field {
                port_field::NAME => port.port_name = value.to_string(),
                port_field::PORT_TYPE => port.port_type = value.to_string(),
                port_field::BANDWIDTH => {
                    port.bandwidth = value.as_i64().and_then(|v| u64::try_from(v).ok()).unwrap_or(0)
                }
                _ => {}
            }
        }
        partial.retain(|_, port| !port.port_name.is_empty());

        info!("discovered {} ports", partial.len());
        let filtered = Self::filter_ports(&partial, name_filter);
        *self.port_cache.lock().expect("port cache poisoned") = Some(PortCache {
            ports: partial,
            refreshed_at: now,
        });
        filtered
    }

    fn filter_ports(ports: &HashMap<String, Port>, name_filter: Option<&str>) -> HashMap<String, Port> {
        let Some(pattern) = name_filter.filter(|f| !f.is_empty()) else {
            return ports.clone();
        };
        let regex = match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(regex) => regex,
            Err(e) => {
                warn!("invalid port filter regex {pattern:?}: {e}; not filtering");
                return ports.clone();
            }
        };
        let filtered: HashMap<String, Port> = ports
            .iter()
            .filter(|(_, port)| regex.is_match(&port.port_name))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        debug!("{} of {} ports match filter {pattern:?}", filtered.len(), ports.len());
        filtered
    }

    /// Runs one full collection cycle and returns the metric records from
    /// every batch that succeeded. A failing batch is logged and skipped;
    /// it never aborts the remaining batches.
    pub async fn collect_port_traffic(
        &self,
        ports: Option<HashMap<String, Port>>,
    ) -> Vec<MetricRecord> {
        let ports = match ports {
            Some(ports) => ports,
            None => {
                self.discover_ports(self.settings.port_filter.as_deref())
                    .await
            }
        };
        if ports.is_empty() {
            warn!("no ports to collect traffic for");
            return Vec::new();
        }

        // Discovery order: deterministic by port key.
        let mut keys: Vec<&String> = ports.keys().collect();
        keys.sort();
        let batches: Vec<&[&String]> = keys.chunks(self.settings.batch_size.max(1)).collect();
        info!(
            "collecting traffic for {} ports in {} batches",
            ports.len(),
            batches.len()
        );

        let mut records = Vec::new();
        let mut failed_batches = 0usize;
        let epoch = Utc::now().timestamp();

        for (index, batch) in batches.iter().enumerate() {
            let batch_ports: HashMap<String, Port> = batch
                .iter()
                .map(|key| ((*key).clone(), ports[*key].clone()))
                .collect();
            match self
                .collect_batch(&batch_ports, &format!("Port_Traffic_{epoch}_{index}"))
                .await
            {
                Ok(batch_records) => records.extend(batch_records),
                Err(reason) => {
                    warn!("batch {index} failed: {reason}");
                    failed_batches += 1;
                }
            }
            if index + 1 < batches.len() {
                sleep(self.settings.batch_delay).await;
            }
        }

        if failed_batches > 0 {
            warn!(
                "collection cycle finished with {failed_batches}/{} failed batches, {} records",
                batches.len(),
                records.len()
            );
        } else {
            info!("collection cycle finished: {} records", records.len());
        }
        records
    }

    /// One batch: create → execute → fetch → correlate → delete.
    async fn collect_batch(
        &self,
        batch_ports: &HashMap<String, Port>,
        request_name: &str,
    ) -> Result<Vec<MetricRecord>, String> {
        let mut keys: Vec<&str> = batch_ports.keys().map(String::as_str).collect();
        keys.sort_unstable();
        let filter_value = keys.join(",");

        let request_id = self
            .manager
            .create(
                request_name,
                &filter_value,
                PmRequestType::Current,
                PmFilterType::Port,
            )
            .await
            .map_err(|e| format!("create failed: {e}"))?;

        if !self
            .manager
            .execute(
                request_id,
                self.settings.request_timeout,
                self.settings.request_retries,
            )
            .await
        {
            // Best-effort cleanup so the remote row does not leak.
            self.manager.delete(request_id).await;
            return Err(format!("execute failed for request {request_id}"));
        }

        let (pmps, values) = self.manager.results(request_id).await;
        let records = self.process_results(&pmps, &values, batch_ports);
        self.manager.delete(request_id).await;
        Ok(records)
    }

    /// Correlates PMP rows with value rows and emits one record per port.
    fn process_results(
        &self,
        pmps: &[PmpRecord],
        values: &[ValueRecord],
        ports: &HashMap<String, Port>,
    ) -> Vec<MetricRecord> {
        let now = Utc::now();
        let timestamp_ns = to_epoch_nanos(now);

        // pmpNumber -> port, dropping PMPs that do not belong to this batch.
        let mut pmp_to_port: Vec<(u32, &PmpRecord, &Port)> = Vec::new();
        for pmp in pmps {
            let (Some(ne_id), Some(pid)) = (pmp.ne_id.as_deref(), pmp.port_id.as_deref()) else {
                debug!("PMP {} lacks ne/port identity, dropping", pmp.pmp_number);
                continue;
            };
            let key = port_key(ne_id, pid);
            match ports.get(&key) {
                Some(port) => pmp_to_port.push((pmp.pmp_number, pmp, port)),
                None => debug!("PMP {} maps to unknown port {key}, dropping", pmp.pmp_number),
            }
        }

        let mut values_by_pmp: HashMap<u32, Vec<ValueRecord>> = HashMap::new();
        for value in values {
            values_by_pmp
                .entry(value.pmp_number)
                .or_default()
                .push(value.clone());
        }

        let mut records = Vec::new();
        for (pmp_number, pmp, port) in pmp_to_port {
            let Some(pmp_values) = values_by_pmp.get(&pmp_number) else {
                continue;
            };
            let current = parse_counter_values(pmp_values, now);
            let key = port.key();

            let rates = {
                let mut counters = self.previous_counters.lock().expect("counter map poisoned");
                let rates = calculate_rates(&current, counters.get(&key));
                counters.insert(key, current);
                rates
            };

            let mut record = MetricRecord::new(MEASUREMENT, timestamp_ns);
            record.tags.insert("ne_id".into(), port.ne_id.clone());
            record.tags.insert("port_id".into(), port.port_id.clone());
            record
                .tags
                .insert("port_name".into(), port.port_name.clone());
            record
                .tags
                .insert("port_type".into(), port.port_type.clone());
            record
                .tags
                .insert("pmp_name".into(), pmp.pmp_name.clone().unwrap_or_default());
            record.tags.insert(
                "pmp_direction".into(),
                pmp.direction.clone().unwrap_or_default(),
            );
            record.tags.insert(
                "pmp_location".into(),
                pmp.location.clone().unwrap_or_default(),
            );
            record
                .tags
                .insert("ne_name".into(), pmp.ne_name.clone().unwrap_or_default());

            let fields = &mut record.fields;
            fields.insert("bytes_in_total".into(), current.bytes_in.into());
            fields.insert("bytes_out_total".into(), current.bytes_out.into());
            fields.insert("packets_in_total".into(), current.packets_in.into());
            fields.insert("packets_out_total".into(), current.packets_out.into());
            fields.insert("errors_in_total".into(), current.errors_in.into());
            fields.insert("errors_out_total".into(), current.errors_out.into());
            fields.insert("discards_in_total".into(), current.discards_in.into());
            fields.insert("discards_out_total".into(), current.discards_out.into());
            fields.insert("bytes_in_rate".into(), rates.bytes_in_rate.into());
            fields.insert("bytes_out_rate".into(), rates.bytes_out_rate.into());
            fields.insert("packets_in_rate".into(), rates.packets_in_rate.into());
            fields.insert("packets_out_rate".into(), rates.packets_out_rate.into());
            fields.insert("bits_in_rate".into(), rates.bits_in_rate.into());
            fields.insert("bits_out_rate".into(), rates.bits_out_rate.into());
            if port.bandwidth > 0 {
                fields.insert("bandwidth".into(), FieldValue::Unsigned(port.bandwidth));
            }

            records.push(record);
        }

        debug!(
            "correlated {} of {} PMPs into records",
            records.len(),
            pmps.len()
        );
        records
    }

    pub fn port_statistics(&self) -> PortStatistics {
        let cache = self.port_cache.lock().expect("port cache poisoned");
        let counters = self.previous_counters.lock().expect("counter map poisoned");
        PortStatistics {
            total_ports: cache.as_ref().map_or(0, |c| c.ports.len()),
            ports_with_traffic_data: counters.len(),
            last_collection_time: counters.values().map(|c| c.timestamp).max(),
        }
    }

    /// Prunes cached counters by age, then evicts the oldest entries until
    /// the map fits `max_count`.
    pub fn cleanup_old_counters(&self, max_age: Duration, max_count: usize) -> CounterCleanup {
        let now = Utc::now();
        let mut counters = self.previous_counters.lock().expect("counter map poisoned");
        let mut cleanup = CounterCleanup::default();

        let before = counters.len();
        counters.retain(|_, counter| {
            (now - counter.timestamp).to_std().unwrap_or(Duration::MAX) <= max_age
        });
        cleanup.expired = before - counters.len();

        while counters.len() > max_count {
            let oldest = counters
                .iter()
                .min_by_key(|(_, counter)| counter.timestamp)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    counters.remove(&key);
                    cleanup.evicted += 1;
                }
                None => break,
            }
        }

        if cleanup.expired > 0 || cleanup.evicted > 0 {
            info!(
                "counter cleanup: {} expired, {} evicted, {} remaining",
                cleanup.expired,
                cleanup.evicted,
                counters.len()
            );
        }
        cleanup
    }
}
