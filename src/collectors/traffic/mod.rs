//! Port traffic collection.
//!
//! - `collector`: the PM-request-driven collection workflow
//! - `counters`: pure counter classification and rate math

pub mod collector;
pub mod counters;

pub use collector::{
    CounterCleanup, PortStatistics, PortTrafficCollector, TrafficSettings, MEASUREMENT,
};
pub use counters::{TrafficCounter, TrafficRates};
