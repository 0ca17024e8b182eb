//! PM request lifecycle management against the vendor NBI MIB.

pub mod manager;
pub mod records;

pub use manager::{CleanupStats, PmError, PmRequestManager, TrackedRequest};
pub use records::{PmFilterType, PmRequestState, PmRequestType, PmpRecord, ValueRecord};
