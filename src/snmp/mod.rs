//! SNMP transport abstraction.
//!
//! The wire protocol itself is a commodity: this module only defines the
//! three primitives the PM workflow needs (scalar GET, prefix-terminated
//! bulk walk, multi-varbind SET) plus the value and error types they carry.
//! The production implementation backed by the `snmp2` crate lives in
//! [`client`]; tests substitute their own [`SnmpTransport`].

pub mod client;
pub mod mib;

use async_trait::async_trait;
use thiserror::Error;

pub use client::{SnmpTarget, SnmpV2cTransport};

/// Decoded SNMP value, reduced to what the PM tables actually carry.
#[derive(Debug, Clone, PartialEq)]
pub enum SnmpValue {
    Integer(i64),
    Counter(u64),
    Text(String),
    Null,
}

impl SnmpValue {
    /// Integer view of the value; numeric strings are accepted because some
    /// agents expose integer columns as octet strings.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SnmpValue::Integer(v) => Some(*v),
            SnmpValue::Counter(v) => i64::try_from(*v).ok(),
            SnmpValue::Text(s) => s.trim().parse().ok(),
            SnmpValue::Null => None,
        }
    }
}

impl std::fmt::Display for SnmpValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnmpValue::Integer(v) => write!(f, "{v}"),
            SnmpValue::Counter(v) => write!(f, "{v}"),
            SnmpValue::Text(s) => write!(f, "{s}"),
            SnmpValue::Null => Ok(()),
        }
    }
}

/// Network-level failure talking to the remote manager.
///
/// Always retryable at the caller's discretion; never corrupts local state.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("SNMP request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("SNMP session error: {0}")]
    Session(String),
    #[error("malformed SNMP response: {0}")]
    Malformed(String),
}

/// Synchronous request/response primitives against one SNMP agent.
///
/// `walk` must stop emitting pairs once an OID no longer has the base OID as
/// a prefix; `set` carries all varbinds in a single PDU so row creation is
/// atomic in intent.
#[async_trait]
pub trait SnmpTransport: Send + Sync {
    async fn get(&self, oid: &str) -> Result<SnmpValue, TransportError>;

    async fn walk(&self, base_oid: &str) -> Result<Vec<(String, SnmpValue)>, TransportError>;

    async fn set(&self, varbinds: &[(String, SnmpValue)]) -> Result<(), TransportError>;
}

/// Splits `oid` into its numeric components after `base`, or `None` when the
/// OID is not underneath the base.
pub fn oid_suffix<'a>(oid: &'a str, base: &str) -> Option<Vec<&'a str>> {
    let rest = oid.strip_prefix(base)?.strip_prefix('.')?;
    if rest.is_empty() {
        return None;
    }
    Some(rest.split('.').collect())
}
