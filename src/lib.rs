//! SNMP performance monitoring collector.
//!
//! The crate is split along the data path: `snmp` speaks to the agent,
//! `pm` drives the PM request lifecycle, `collectors` turns result tables
//! into per-port rate records, and `writer` batches those records into a
//! `storage` backend.

pub mod cli;
pub mod collectors;
pub mod config;
pub mod models;
pub mod pm;
pub mod snmp;
pub mod storage;
pub mod writer;
