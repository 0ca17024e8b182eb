//! OID constants for the vendor NBI performance-monitoring MIB.
//!
//! The PM request table is indexed by request id; the two result tables are
//! indexed by `requestId.pmpNumber` and `requestId.pmpNumber.valueNumber`
//! respectively and are shared across all outstanding requests.

/// Scalar holding the next free request id.
pub const OID_PM_REQUEST_NEXT_ID: &str = "1.3.6.1.4.1.42229.6.22.10.1.0";

/// PM request table columns, indexed by request id.
pub const OID_PM_REQUEST_NAME: &str = "1.3.6.1.4.1.42229.6.22.10.2.1.2";
pub const OID_PM_REQUEST_ROW_STATUS: &str = "1.3.6.1.4.1.42229.6.22.10.2.1.3";
pub const OID_PM_REQUEST_STATE: &str = "1.3.6.1.4.1.42229.6.22.10.2.1.4";
pub const OID_PM_REQUEST_INFO: &str = "1.3.6.1.4.1.42229.6.22.10.2.1.6";
pub const OID_PM_REQUEST_TYPE: &str = "1.3.6.1.4.1.42229.6.22.10.2.1.7";
pub const OID_PM_REQUEST_FILTER_TYPE: &str = "1.3.6.1.4.1.42229.6.22.10.2.1.10";
pub const OID_PM_REQUEST_FILTER_VALUE: &str = "1.3.6.1.4.1.42229.6.22.10.2.1.11";

/// Result table entries. Rows appear as `<entry>.<column>.<indices...>`.
pub const OID_PM_RESULT_PMP_ENTRY: &str = "1.3.6.1.4.1.42229.6.22.10.3.1";
pub const OID_PM_RESULT_VALUE_ENTRY: &str = "1.3.6.1.4.1.42229.6.22.10.4.1";

/// Port table entry, rows `<entry>.<column>.<neId>.<portId>`.
pub const OID_PORT_ENTRY: &str = "1.3.6.1.4.1.42229.6.22.2.3.1";

/// RowStatus SET values.
pub const ROW_STATUS_CREATE_AND_GO: i64 = 4;
pub const ROW_STATUS_DESTROY: i64 = 6;

/// Request-state SET value that starts execution.
pub const REQUEST_STATE_START: i64 = 3;

/// Point-result table columns (after the entry node).
pub mod pmp_field {
    pub const NE_ID: &str = "3";
    pub const PORT_ID: &str = "4";
    pub const TP_ID_HIGH: &str = "5";
    pub const TP_ID_LOW: &str = "6";
    pub const NE_NAME: &str = "7";
    pub const OBJ_LOCATION: &str = "8";
    pub const PMP_NAME: &str = "9";
    pub const LOCATION: &str = "10";
    pub const DIRECTION: &str = "11";
    pub const RETRIEVAL_TIME: &str = "12";
    pub const PERIOD_END_TIME: &str = "13";
    pub const MONITORED_TIME: &str = "14";
    pub const NUM_VALUES: &str = "15";
    pub const RELATED_PATHS: &str = "16";
    pub const RELATED_SERVICES: &str = "17";
    pub const RELATED_SUBSCRIBERS: &str = "18";
    pub const NATIVE_LOCATION: &str = "19";
    pub const MODULE_ID: &str = "20";
    pub const EQUIP_HOLDER_ID: &str = "21";
}

/// Value-result table columns (after the entry node).
pub mod value_field {
    pub const PARAM_NAME: &str = "4";
    pub const PARAM_VALUE: &str = "5";
    pub const UNIT: &str = "6";
    pub const STATUS: &str = "7";
}

/// Port table columns (after the entry node).
pub mod port_field {
    pub const NAME: &str = "2";
    pub const PORT_TYPE: &str = "3";
    pub const BANDWIDTH: &str = "7";
}
