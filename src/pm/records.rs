//! PM request enums and result-table row types.
//!
//! Both result tables are shared across every outstanding request on the
//! remote system; the assembly functions here filter rows by the leading
//! request-id index component and build partial records incrementally, since
//! bulk pages deliver fields in arbitrary order.

use std::collections::HashMap;

use log::{debug, warn};

use crate::snmp::mib::{pmp_field, value_field};
use crate::snmp::{oid_suffix, SnmpValue};

/// Remote request state, wire values 1..7. Observed by polling, never
/// asserted locally beyond the initial creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmRequestState {
    Created = 1,
    Pending = 2,
    Started = 3,
    Finished = 4,
    Failed = 5,
    Cancelling = 6,
    Cancelled = 7,
}

impl PmRequestState {
    pub fn from_wire(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Created),
            2 => Some(Self::Pending),
            3 => Some(Self::Started),
            4 => Some(Self::Finished),
            5 => Some(Self::Failed),
            6 => Some(Self::Cancelling),
            7 => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// States from which the request will never progress.
    pub fn is_terminal_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Cancelling | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmRequestType {
    History = 1,
    Current = 2,
    Points = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmFilterType {
    Tp = 1,
    Port = 2,
    Ne = 3,
    Snc = 4,
    EthernetPath = 5,
    Module = 6,
    EquipHolder = 7,
}

/// One row of the point-result table, keyed `(request_id, pmp_number)`.
///
/// The correlated attributes get named fields; the remaining fixed columns
/// are kept in `extra` under their table field names for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct PmpRecord {
    pub request_id: u32,
    pub pmp_number: u32,
    pub ne_id: Option<String>,
    pub port_id: Option<String>,
    pub ne_name: Option<String>,
    pub pmp_name: Option<String>,
    pub location: Option<String>,
    pub direction: Option<String>,
    pub native_location: Option<String>,
    pub extra: HashMap<String, String>,
}

/// One row of the value-result table, keyed
/// `(request_id, pmp_number, value_number)`. Many value rows map to one PMP.
#[derive(Debug, Clone, Default)]
pub struct ValueRecord {
    pub request_id: u32,
    pub pmp_number: u32,
    pub value_number: u32,
    pub param_name: Option<String>,
    pub param_value: Option<String>,
    pub unit: Option<String>,
    pub status: Option<String>,
}

fn extra_field_name(field: &str) -> &'static str {
    match field {
        pmp_field::TP_ID_HIGH => "tp_id_high",
        pmp_field::TP_ID_LOW => "tp_id_low",
        pmp_field::OBJ_LOCATION => "obj_location",
        pmp_field::RETRIEVAL_TIME => "retrieval_time",
        pmp_field::PERIOD_END_TIME => "period_end_time",
        pmp_field::MONITORED_TIME => "monitored_time",
        pmp_field::NUM_VALUES => "num_values",
        pmp_field::RELATED_PATHS => "related_paths",
        pmp_field::RELATED_SERVICES => "related_services",
        pmp_field::RELATED_SUBSCRIBERS => "related_subscribers",
        pmp_field::MODULE_ID => "module_id",
        pmp_field::EQUIP_HOLDER_ID => "equip_holder_id",
        _ => "",
    }
}

/// Assembles point-table walk rows into records for `request_id` only.
///
/// Rows belonging to other requests share the table and are skipped; the
/// number of distinct PMPs is capped to bound memory.
pub fn assemble_pmp_records(
    rows: &[(String, SnmpValue)],
    entry_oid: &str,
    request_id: u32,
    max_rows: usize,
) -> Vec<PmpRecord> {
    let mut records: HashMap<u32, PmpRecord> = HashMap::new();
    let mut capped = false;

    for (oid, value) in rows {
        let Some(suffix) = oid_suffix(oid, entry_oid) else {
            continue;
        };
        if suffix.len() < 3 {
            continue;
        }
        let field = suffix[0];
        let (Ok(req_id), Ok(pmp_number)) = (suffix[1].parse::<u32>(), suffix[2].parse::<u32>())
        else {
            debug!("unparseable PMP row index in {oid}");
            continue;
        };
        if req_id != request_id {
            continue;
        }
        if !records.contains_key(&pmp_number) && records.len() >= max_rows {
            capped = true;
            continue;
        }

        let record = records.entry(pmp_number).or_insert_with(|| PmpRecord {
            request_id: req_id,
            pmp_number,
            ..PmpRecord::default()
        });
        let text = value.to_string();
        match field {
            pmp_field::NE_ID => record.ne_id = Some(text),
            pmp_field::PORT_ID => record.port_id = Some(text),
            pmp_field::NE_NAME => record.ne_name = Some(text),
            pmp_field::PMP_NAME => record.pmp_name = Some(text),
            pmp_field::LOCATION => record.location = Some(text),
            pmp_field::DIRECTION => record.direction = Some(text),
            pmp_field::NATIVE_LOCATION => record.native_location = Some(text),
            other => {
                let name = extra_field_name(other);
                if !name.is_empty() {
                    record.extra.insert(name.to_string(), text);
                }
            }
        }
    }

    if capped {
        warn!("PMP results for request {request_id} hit the {max_rows}-row cap, truncating");
    }

    let mut result: Vec<PmpRecord> = records.into_values().collect();
    result.sort_by_key(|r| r.pmp_number);
    result
}

/// Assembles value-table walk rows into records for `request_id` only,
/// capped at `max_rows` distinct `(pmpNumber, valueNumber)` keys.
pub fn assemble_value_records(
    rows: &[(String, SnmpValue)],
    entry_oid: &str,
    request_id: u32,
    max_rows: usize,
) -> Vec<ValueRecord> {
    let mut records: HashMap<(u32, u32), ValueRecord> = HashMap::new();
    let mut capped = false;

    for (oid, value) in rows {
        let Some(suffix) = oid_suffix(oid, entry_oid) else {
            continue;
        };
        if suffix.len() < 4 {
            continue;
        }
        let field = suffix[0];
        let (Ok(req_id), Ok(pmp_number), Ok(value_number)) = (
            suffix[1].parse::<u32>(),
            suffix[2].parse::<u32>(),
            suffix[3].parse::<u32>(),
        ) else {
            debug!("unparseable value row index in {oid}");
            continue;
        };
        if req_id != request_id {
            continue;
        }
        let key = (pmp_number, value_number);
        if !records.contains_key(&key) && records.len() >= max_rows {
            capped = true;
            continue;
        }

        let record = records.entry(key).or_insert_with(|| ValueRecord {
            request_id: req_id,
            pmp_number,
            value_number,
            ..ValueRecord::default()
        });
        let text = value.to_string();
        match field {
            value_field::PARAM_NAME => record.param_name = Some(text),
            value_field::PARAM_VALUE => record.param_value = Some(text),
            value_field::UNIT => record.unit = Some(text),
            value_field::STATUS => record.status = Some(text),
            _ => {}
        }
    }

    if capped {
        warn!("value results for request {request_id} hit the {max_rows}-row cap, truncating");
    }

    let mut result: Vec<ValueRecord> = records.into_values().collect();
    result.sort_by_key(|r| (r.pmp_number, r.value_number));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snmp::mib::OID_PM_RESULT_PMP_ENTRY;

    fn pmp_row(field: &str, req: u32, pmp: u32, value: &str) -> (String, SnmpValue) {
        (
            format!("{OID_PM_RESULT_PMP_ENTRY}.{field}.{req}.{pmp}"),
            SnmpValue::Text(value.to_string()),
        )
    }

    #[test]
    fn state_wire_mapping_is_closed() {
        assert_eq!(PmRequestState::from_wire(1), Some(PmRequestState::Created));
        assert_eq!(PmRequestState::from_wire(4), Some(PmRequestState::Finished));
        assert_eq!(PmRequestState::from_wire(7), Some(PmRequestState::Cancelled));
        assert_eq!(PmRequestState::from_wire(0), None);
        assert_eq!(PmRequestState::from_wire(8), None);
    }

    #[test]
    fn terminal_failure_covers_failed_and_cancel_family() {
        assert!(PmRequestState::Failed.is_terminal_failure());
        assert!(PmRequestState::Cancelling.is_terminal_failure());
        assert!(PmRequestState::Cancelled.is_terminal_failure());
        assert!(!PmRequestState::Finished.is_terminal_failure());
        assert!(!PmRequestState::Started.is_terminal_failure());
    }

    #[test]
    fn assembly_filters_by_request_id() {
        let rows = vec![
            pmp_row(pmp_field::NE_ID, 5, 1, "35"),
            pmp_row(pmp_field::NE_ID, 9, 1, "99"),
            pmp_row(pmp_field::PORT_ID, 5, 1, "12"),
            pmp_row(pmp_field::PORT_ID, 9, 2, "44"),
            pmp_row(pmp_field::NE_ID, 5, 2, "35"),
        ];
        let records = assemble_pmp_records(&rows, OID_PM_RESULT_PMP_ENTRY, 5, 1000);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.request_id == 5));
        assert_eq!(records[0].ne_id.as_deref(), Some("35"));
        assert_eq!(records[0].port_id.as_deref(), Some("12"));
    }

    #[test]
    fn assembly_merges_fields_across_interleaved_rows() {
        let rows = vec![
            pmp_row(pmp_field::NE_ID, 3, 7, "35"),
            pmp_row(pmp_field::PMP_NAME, 3, 7, "PMP-A"),
            pmp_row(pmp_field::DIRECTION, 3, 7, "rx"),
            pmp_row(pmp_field::MODULE_ID, 3, 7, "2"),
        ];
        let records = assemble_pmp_records(&rows, OID_PM_RESULT_PMP_ENTRY, 3, 1000);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.pmp_name.as_deref(), Some("PMP-A"));
        assert_eq!(record.direction.as_deref(), Some("rx"));
        assert_eq!(record.extra.get("module_id").map(String::as_str), Some("2"));
    }

    #[test]
    fn pmp_row_cap_bounds_distinct_records() {
        let mut rows = Vec::new();
        for pmp in 0..10 {
            rows.push(pmp_row(pmp_field::NE_ID, 1, pmp, "35"));
        }
        let records = assemble_pmp_records(&rows, OID_PM_RESULT_PMP_ENTRY, 1, 4);
        assert_eq!(records.len(), 4);
    }

    #[test]
    fn value_assembly_groups_by_full_key() {
        let entry = crate::snmp::mib::OID_PM_RESULT_VALUE_ENTRY;
        let rows = vec![
            (
                format!("{entry}.{}.6.1.1", value_field::PARAM_NAME),
                SnmpValue::Text("Bytes In".into()),
            ),
            (
                format!("{entry}.{}.6.1.1", value_field::PARAM_VALUE),
                SnmpValue::Text("1024".into()),
            ),
            (
                format!("{entry}.{}.6.1.2", value_field::PARAM_NAME),
                SnmpValue::Text("Bytes Out".into()),
            ),
            (
                format!("{entry}.{}.9.1.1", value_field::PARAM_NAME),
                SnmpValue::Text("ignored, other request".into()),
            ),
        ];
        let records = assemble_value_records(&rows, entry, 6, 5000);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].param_name.as_deref(), Some("Bytes In"));
        assert_eq!(records[0].param_value.as_deref(), Some("1024"));
        assert_eq!(records[1].param_name.as_deref(), Some("Bytes Out"));
    }
}
