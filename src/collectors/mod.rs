pub mod traffic;

pub use traffic::{PortTrafficCollector, TrafficSettings};
