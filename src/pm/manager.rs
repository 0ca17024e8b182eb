//! Client-driven lifecycle manager for remote PM requests.
//!
//! A PM request is a server-side job: the manager creates a row in the
//! vendor request table (create-and-activate), starts it, polls the remote
//! state until it settles, fetches the two result tables, and destroys the
//! row. Every transition except the initial creation is observed by polling,
//! never asserted locally. Failed steps are retried with increasing backoff;
//! exhausting the retry budget surfaces as a boolean, not a fault.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::time::{sleep, Instant};

use crate::snmp::mib::{
    OID_PM_REQUEST_FILTER_TYPE, OID_PM_REQUEST_FILTER_VALUE, OID_PM_REQUEST_INFO,
    OID_PM_REQUEST_NAME, OID_PM_REQUEST_NEXT_ID, OID_PM_REQUEST_ROW_STATUS, OID_PM_REQUEST_STATE,
    OID_PM_REQUEST_TYPE, OID_PM_RESULT_PMP_ENTRY, OID_PM_RESULT_VALUE_ENTRY,
    REQUEST_STATE_START, ROW_STATUS_CREATE_AND_GO, ROW_STATUS_DESTROY,
};
use crate::snmp::{SnmpTransport, SnmpValue, TransportError};

use super::records::{
    assemble_pmp_records, assemble_value_records, PmFilterType, PmRequestState, PmRequestType,
    PmpRecord, ValueRecord,
};

/// Cadence of the remote state poll while a request executes.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default distinct-row ceilings for the two result tables. The value table
/// carries many rows per PMP and gets the larger bound.
pub const DEFAULT_MAX_PMP_ROWS: usize = 1000;
pub const DEFAULT_MAX_VALUE_ROWS: usize = 5000;

#[derive(Debug, Error)]
pub enum PmError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Local book-keeping for one outstanding remote request.
#[derive(Debug, Clone)]
pub struct TrackedRequest {
    pub name: String,
    pub filter_value: String,
    pub request_type: PmRequestType,
    pub filter_type: PmFilterType,
    pub created_at: DateTime<Utc>,
    pub state: PmRequestState,
    pub last_error: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupStats {
    pub old_requests: usize,
    pub failed_requests: usize,
    pub total_cleaned: usize,
    pub cleanup_errors: usize,
}

pub struct PmRequestManager {
    transport: Arc<dyn SnmpTransport>,
    /// Locally known outstanding requests. Guarded because a slow collection
    /// cycle may still hold the manager when the next timer fires.
    requests: Mutex<HashMap<u32, TrackedRequest>>,
    max_pmp_rows: usize,
    max_value_rows: usize,
}

impl PmRequestManager {
    pub fn new(transport: Arc<dyn SnmpTransport>) -> Self {
        Self::with_row_caps(transport, DEFAULT_MAX_PMP_ROWS, DEFAULT_MAX_VALUE_ROWS)
    }

    pub fn with_row_caps(
        transport: Arc<dyn SnmpTransport>,
        max_pmp_rows: usize,
        max_value_rows: usize,
    ) -> Self {
        Self {
            transport,
            requests: Mutex::new(HashMap::new()),
            max_pmp_rows,
            max_value_rows,
        }
    }

    /// Reads the next free request id from the well-known scalar.
    pub async fn next_request_id(&self) -> Result<u32, PmError> {
        let value = self.transport.get(OID_PM_REQUEST_NEXT_ID).await?;
        let id = value
            .as_i64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| PmError::Protocol(format!("next request id not an id: {value}")))?;
        Ok(id)
    }

    /// Creates and activates a remote request in one SET.
    ///
    /// Nothing is tracked locally unless the remote row is confirmed
    /// activated: a failed SET leaves no partial request behind.
    pub async fn create(
        &self,
        name: &str,
        filter_value: &str,
        request_type: PmRequestType,
        filter_type: PmFilterType,
    ) -> Result<u32, PmError> {
        let request_id = self.next_request_id().await?;
        info!("creating PM request {request_id}: {name}");

        let varbinds = vec![
            (
                format!("{OID_PM_REQUEST_NAME}.{request_id}"),
                SnmpValue::Text(name.to_string()),
            ),
            (
                format!("{OID_PM_REQUEST_TYPE}.{request_id}"),
                SnmpValue::Integer(request_type as i64),
            ),
            (
                format!("{OID_PM_REQUEST_FILTER_TYPE}.{request_id}"),
                SnmpValue::Integer(filter_type as i64),
            ),
            (
                format!("{OID_PM_REQUEST_FILTER_VALUE}.{request_id}"),
                SnmpValue::Text(filter_value.to_string()),
            ),
            (
                format!("{OID_PM_REQUEST_ROW_STATUS}.{request_id}"),
                SnmpValue::Integer(ROW_STATUS_CREATE_AND_GO),
            ),
        ];
        self.transport.set(&varbinds).await?;

        let tracked = TrackedRequest {
            name: name.to_string(),
            filter_value: filter_value.to_string(),
            request_type,
            filter_type,
            created_at: Utc::now(),
            state: PmRequestState::Created,
            last_error: None,
        };
        self.requests
            .lock()
            .expect("request map poisoned")
            .insert(request_id, tracked);

        debug!("PM request {request_id} created and activated");
        Ok(request_id)
    }

    /// Starts the request and polls until it finishes, fails, or times out.
    ///
    /// The whole attempt (start SET plus poll loop) is retried up to
    /// `max_retries` times with `2 × attempt` seconds between attempts.
    /// Returns `false` on exhaustion; the last error is retained on the
    /// tracked request for the caller to surface.
    pub async fn execute(&self, request_id: u32, timeout: Duration, max_retries: u32) -> bool {
        let mut last_error: Option<String> = None;

        for attempt in 0..max_retries {
            if attempt > 0 {
                let backoff = Duration::from_secs(2 * u64::from(attempt));
                info!(
                    "retrying PM request {request_id} (attempt {}/{max_retries}) after {backoff:?}",
                    attempt + 1
                );
                sleep(backoff).await;
            } else {
                info!("executing PM request {request_id}");
            }

            let start_bind = vec![(
                format!("{OID_PM_REQUEST_STATE}.{request_id}"),
                SnmpValue::Integer(REQUEST_STATE_START),
            )];
            if let Err(e) = self.transport.set(&start_bind).await {
                let msg = format!("starting PM request {request_id} failed: {e}");
                warn!("{msg} (attempt {}/{max_retries})", attempt + 1);
                last_error = Some(msg);
                continue;
            }

            let started_at = Instant::now();
            let mut last_state: Option<PmRequestState> = None;
            let mut state_changed_at = started_at;
            let mut stall_logged = false;
            let mut attempt_failed = false;

            while started_at.elapsed() < timeout {
                let Some(state) = self.request_state(request_id).await else {
                    let msg = format!("cannot read state of PM request {request_id}");
                    warn!("{msg} (attempt {}/{max_retries})", attempt + 1);
                    last_error = Some(msg);
                    attempt_failed = true;
                    break;
                };

                if last_state != Some(state) {
                    debug!("PM request {request_id} state: {last_state:?} -> {state:?}");
                    last_state = Some(state);
                    state_changed_at = Instant::now();
                    stall_logged = false;
                }

                match state {
                    PmRequestState::Finished => {
                        info!(
                            "PM request {request_id} finished after {:.1}s",
                            started_at.elapsed().as_secs_f64()
                        );
                        self.update_tracked(request_id, |r| r.state = state);
                        return true;
                    }
                    state if state.is_terminal_failure() => {
                        let msg = if state == PmRequestState::Failed {
                            let info = self.request_info(request_id).await;
                            format!("PM request {request_id} failed remotely: {info}")
                        } else {
                            format!("PM request {request_id} cancelled (state {state:?})")
                        };
                        warn!("{msg} (attempt {}/{max_retries})", attempt + 1);
                        last_error = Some(msg);
                        self.update_tracked(request_id, |r| r.state = state);
                        attempt_failed = true;
                        break;
                    }
                    _ => {}
                }

                // A state frozen for more than half the window is suspicious,
                // but only the hard timeout ends the wait.
                if state_changed_at.elapsed() > timeout / 2 && !stall_logged {
                    warn!(
                        "PM request {request_id} stuck in {state:?} for over {:.0}s",
                        (timeout / 2).as_secs_f64()
                    );
                    stall_logged = true;
                }

                sleep(POLL_INTERVAL).await;
            }

            if !attempt_failed {
                let msg = format!(
                    "PM request {request_id} timed out after {timeout:?} (last state {last_state:?})"
                );
                warn!("{msg} (attempt {}/{max_retries})", attempt + 1);
                last_error = Some(msg);
            }
        }

        error!(
            "PM request {request_id} failed after {max_retries} attempts: {}",
            last_error.as_deref().unwrap_or("unknown error")
        );
        self.update_tracked(request_id, |r| {
            r.state = PmRequestState::Failed;
            r.last_error = last_error.clone();
        });
        false
    }

    /// Last observed remote state, `None` on transport error or an
    /// unparseable state value. Callers must not infer progress from `None`.
    pub async fn request_state(&self, request_id: u32) -> Option<PmRequestState> {
        let oid = format!("{OID_PM_REQUEST_STATE}.{request_id}");
        match self.transport.get(&oid).await {
            Ok(value) => match value.as_i64().and_then(PmRequestState::from_wire) {
                Some(state) => Some(state),
                None => {
                    debug!("PM request {request_id} returned invalid state value {value}");
                    None
                }
            },
            Err(e) => {
                debug!("reading state of PM request {request_id} failed: {e}");
                None
            }
        }
    }

    /// Best-effort diagnostic text from the request row, empty on error.
    pub async fn request_info(&self, request_id: u32) -> String {
        let oid = format!("{OID_PM_REQUEST_INFO}.{request_id}");
        match self.transport.get(&oid).await {
            Ok(value) => value.to_string(),
            Err(_) => String::new(),
        }
    }

    /// Walks both result tables and assembles the rows belonging to
    /// `request_id`. Each table degrades independently to empty on walk
    /// failure; rows for other requests are ignored.
    pub async fn results(&self, request_id: u32) -> (Vec<PmpRecord>, Vec<ValueRecord>) {
        let pmps = match self.transport.walk(OID_PM_RESULT_PMP_ENTRY).await {
            Ok(rows) => {
                assemble_pmp_records(&rows, OID_PM_RESULT_PMP_ENTRY, request_id, self.max_pmp_rows)
            }
            Err(e) => {
                warn!("PMP result walk for request {request_id} failed: {e}");
                Vec::new()
            }
        };
        let values = match self.transport.walk(OID_PM_RESULT_VALUE_ENTRY).await {
            Ok(rows) => assemble_value_records(
                &rows,
                OID_PM_RESULT_VALUE_ENTRY,
                request_id,
                self.max_value_rows,
            ),
            Err(e) => {
                warn!("value result walk for request {request_id} failed: {e}");
                Vec::new()
            }
        };
        debug!(
            "request {request_id} results: {} PMPs, {} values",
            pmps.len(),
            values.len()
        );
        (pmps, values)
    }

    /// Destroys the remote row and drops local tracking.
    ///
    /// Local tracking is removed even when the destroy SET fails: the remote
    /// side may or may not clean up, but the manager must stop retrying a
    /// row it can no longer reason about. Fire-and-forget cleanup.
    pub async fn delete(&self, request_id: u32) -> bool {
        info!("deleting PM request {request_id}");
        let varbinds = vec![(
            format!("{OID_PM_REQUEST_ROW_STATUS}.{request_id}"),
            SnmpValue::Integer(ROW_STATUS_DESTROY),
        )];
        let ok = match self.transport.set(&varbinds).await {
            Ok(()) => true,
            Err(e) => {
                warn!("destroying PM request {request_id} failed: {e}");
                false
            }
        };
        self.requests
            .lock()
            .expect("request map poisoned")
            .remove(&request_id);
        ok
    }

    /// Deletes locally tracked requests past their retention windows.
    ///
    /// FINISHED rows older than `max_age`, FAILED/CANCELLED rows older than
    /// `max_failed_age`, and rows stuck in PENDING/STARTED beyond twice
    /// `max_age` (anomalous, force-cleaned with a warning). The remote table
    /// is never scanned for orphans.
    pub async fn cleanup_old_requests(
        &self,
        max_age: Duration,
        max_failed_age: Duration,
    ) -> CleanupStats {
        let now = Utc::now();
        let mut stats = CleanupStats::default();
        let mut to_delete = Vec::new();

        {
            let requests = self.requests.lock().expect("request map poisoned");
            for (&request_id, tracked) in requests.iter() {
                let age = (now - tracked.created_at)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                let cleanup = match tracked.state {
                    PmRequestState::Finished if age > max_age => {
                        stats.old_requests += 1;
                        true
                    }
                    PmRequestState::Failed | PmRequestState::Cancelled
                        if age > max_failed_age =>
                    {
                        stats.failed_requests += 1;
                        true
                    }
                    PmRequestState::Pending | PmRequestState::Started if age > max_age * 2 => {
                        warn!(
                            "force-cleaning PM request {request_id} stuck in {:?} for {:.0}s",
                            tracked.state,
                            age.as_secs_f64()
                        );
                        stats.old_requests += 1;
                        true
                    }
                    _ => false,
                };
                if cleanup {
                    to_delete.push(request_id);
                }
            }
        }

        for request_id in to_delete {
            if self.delete(request_id).await {
                stats.total_cleaned += 1;
            } else {
                stats.cleanup_errors += 1;
            }
        }

        if stats.total_cleaned > 0 || stats.cleanup_errors > 0 {
            info!(
                "PM request cleanup: {} cleaned ({} finished, {} failed, {} errors)",
                stats.total_cleaned, stats.old_requests, stats.failed_requests, stats.cleanup_errors
            );
        }
        stats
    }

    /// Snapshot of the locally tracked requests.
    pub fn tracked_requests(&self) -> Vec<(u32, TrackedRequest)> {
        self.requests
            .lock()
            .expect("request map poisoned")
            .iter()
            .map(|(id, r)| (*id, r.clone()))
            .collect()
    }

    pub fn tracked_count(&self) -> usize {
        self.requests.lock().expect("request map poisoned").len()
    }

    fn update_tracked(&self, request_id: u32, f: impl FnOnce(&mut TrackedRequest)) {
        if let Some(tracked) = self
            .requests
            .lock()
            .expect("request map poisoned")
            .get_mut(&request_id)
        {
            f(tracked);
        }
    }
}
