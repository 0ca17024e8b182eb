//! Counter classification and rate computation.
//!
//! Everything here is pure: parameter names are classified by ordered
//! keyword tables, and rates are derived from consecutive cumulative samples
//! with the 32-bit wraparound-versus-reset heuristic. No network types leak
//! into this module so the math stays unit-testable in isolation.

use chrono::{DateTime, Utc};
use log::debug;

use crate::pm::ValueRecord;

/// Last-observed cumulative counters for one port key.
///
/// Overwritten on every collection cycle; deltas are only ever taken against
/// the immediately preceding sample for the same port key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafficCounter {
    pub timestamp: DateTime<Utc>,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub packets_in: u64,
    pub packets_out: u64,
    pub errors_in: u64,
    pub errors_out: u64,
    pub discards_in: u64,
    pub discards_out: u64,
}

impl TrafficCounter {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            bytes_in: 0,
            bytes_out: 0,
            packets_in: 0,
            packets_out: 0,
            errors_in: 0,
            errors_out: 0,
            discards_in: 0,
            discards_out: 0,
        }
    }
}

/// Per-cycle rates derived from two consecutive counter samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrafficRates {
    pub bytes_in_rate: f64,
    pub bytes_out_rate: f64,
    pub packets_in_rate: f64,
    pub packets_out_rate: f64,
    pub bits_in_rate: f64,
    pub bits_out_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CounterFamily {
    Bytes,
    Packets,
    Errors,
    Discards,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    In,
    Out,
}

/// Ordered keyword tables for the name heuristics. First match wins.
const FAMILY_KEYWORDS: &[(&[&str], CounterFamily)] = &[
    (&["bytes", "octets"], CounterFamily::Bytes),
    (&["packets", "frames"], CounterFamily::Packets),
    (&["error"], CounterFamily::Errors),
    (&["discard", "drop"], CounterFamily::Discards),
];

const DIRECTION_KEYWORDS: &[(&[&str], Direction)] = &[
    (&["in", "rx", "receive", "ingress", "input"], Direction::In),
    (
        &["out", "tx", "transmit", "egress", "output"],
        Direction::Out,
    ),
];

fn match_keywords<T: Copy>(name: &str, table: &[(&[&str], T)]) -> Option<T> {
    for (keywords, result) in table {
        if keywords.iter().any(|kw| name.contains(kw)) {
            return Some(*result);
        }
    }
    None
}

/// Parses an integer counter out of a parameter value string. Accepts plain
/// digit strings and float-like renderings such as `"1024.0"`.
fn parse_counter(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if let Ok(v) = trimmed.parse::<u64>() {
        return Some(v);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v as u64)
}

/// Classifies a batch of value records into a fresh counter sample.
///
/// Unparseable values and unclassified parameter names are skipped, never
/// fatal; the direction defaults to nothing, so a counter with no direction
/// keyword is ignored too.
pub fn parse_counter_values(values: &[ValueRecord], timestamp: DateTime<Utc>) -> TrafficCounter {
    let mut counter = TrafficCounter::new(timestamp);

    for value in values {
        let Some(param) = value.param_name.as_deref() else {
            continue;
        };
        let Some(raw) = value.param_value.as_deref() else {
            continue;
        };
        let Some(parsed) = parse_counter(raw) else {
            debug!("skipping unparseable counter value {raw:?} for {param:?}");
            continue;
        };

        let name = param.to_lowercase();
        let Some(family) = match_keywords(&name, FAMILY_KEYWORDS) else {
            continue;
        };
        let Some(direction) = match_keywords(&name, DIRECTION_KEYWORDS) else {
            continue;
        };

        let slot = match (family, direction) {
            (CounterFamily::Bytes, Direction::In) => &mut counter.bytes_in,
            (CounterFamily::Bytes, Direction::Out) => &mut counter.bytes_out,
            (CounterFamily::Packets, Direction::In) => &mut counter.packets_in,
            (CounterFamily::Packets, Direction::Out) => &mut counter.packets_out,
            (CounterFamily::Errors, Direction::In) => &mut counter.errors_in,
            (CounterFamily::Errors, Direction::Out) => &mut counter.errors_out,
            (CounterFamily::Discards, Direction::In) => &mut counter.discards_in,
            (CounterFamily::Discards, Direction::Out) => &mut counter.discards_out,
        };
        *slot = parsed;
    }

    counter
}

const COUNTER_WRAP: u64 = 1 << 32;

/// Rate for one monotonic counter between two samples.
///
/// When the counter went backwards, the delta is reconstructed across a
/// 32-bit rollover. A reconstructed delta of at least half the counter
/// space, or a backwards jump too large to be a 32-bit wrap at all (the
/// previous sample came from a 64-bit counter), means the counter was
/// reset rather than wrapped, and the rate is reported as zero.
pub fn counter_rate(current: u64, previous: u64, dt_secs: f64) -> f64 {
    if current >= previous {
        return (current - previous) as f64 / dt_secs;
    }
    let reconstructed =
        i128::from(current) + i128::from(COUNTER_WRAP) - i128::from(previous);
    if (0..i128::from(COUNTER_WRAP / 2)).contains(&reconstructed) {
        reconstructed as f64 / dt_secs
    } else {
        0.0
    }
}

/// Computes all rates for a port, given the previous sample if one exists.
///
/// With no previous sample, or a non-positive time delta, every rate is
/// zero. Each counter is handled independently; bit rates derive from the
/// byte rates.
pub fn calculate_rates(current: &TrafficCounter, previous: Option<&TrafficCounter>) -> TrafficRates {
    let Some(previous) = previous else {
        return TrafficRates::default();
    };
    let dt_secs = (current.timestamp - previous.timestamp).num_milliseconds() as f64 / 1000.0;
    if dt_secs <= 0.0 {
        return TrafficRates::default();
    }

    let bytes_in_rate = counter_rate(current.bytes_in, previous.bytes_in, dt_secs);
    let bytes_out_rate = counter_rate(current.bytes_out, previous.bytes_out, dt_secs);
    TrafficRates {
        bytes_in_rate,
        bytes_out_rate,
        packets_in_rate: counter_rate(current.packets_in, previous.packets_in, dt_secs),
        packets_out_rate: counter_rate(current.packets_out, previous.packets_out, dt_secs),
        bits_in_rate: bytes_in_rate * 8.0,
        bits_out_rate: bytes_out_rate * 8.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn value(param: &str, raw: &str) -> ValueRecord {
        ValueRecord {
            request_id: 1,
            pmp_number: 1,
            value_number: 0,
            param_name: Some(param.to_string()),
            param_value: Some(raw.to_string()),
            unit: None,
            status: None,
        }
    }

    #[test]
    fn classification_covers_all_families_and_directions() {
        let values = vec![
            value("Bytes Received", "100"),
            value("Octets Tx", "200"),
            value("Frames Ingress", "30"),
            value("Packets Output", "40"),
            value("Errors In", "5"),
            value("Error Egress", "6"),
            value("Discards Rx", "7"),
            value("Dropped Transmit", "8"),
        ];
        let counter = parse_counter_values(&values, Utc::now());
        assert_eq!(counter.bytes_in, 100);
        assert_eq!(counter.bytes_out, 200);
        assert_eq!(counter.packets_in, 30);
        assert_eq!(counter.packets_out, 40);
        assert_eq!(counter.errors_in, 5);
        assert_eq!(counter.errors_out, 6);
        assert_eq!(counter.discards_in, 7);
        assert_eq!(counter.discards_out, 8);
    }

    #[test]
    fn unclassified_and_unparseable_values_are_ignored() {
        let values = vec![
            value("Temperature", "42"),
            value("Bytes In", "not a number"),
            value("Bytes In", "1024.0"),
        ];
        let counter = parse_counter_values(&values, Utc::now());
        // The float-like rendering wins; the garbage one is skipped.
        assert_eq!(counter.bytes_in, 1024);
        assert_eq!(counter.bytes_out, 0);
    }

    #[test]
    fn rate_for_monotonic_counters_is_exact() {
        assert_eq!(counter_rate(1500, 500, 2.0), 500.0);
        assert_eq!(counter_rate(500, 500, 5.0), 0.0);
    }

    #[test]
    fn rate_reconstructs_32bit_wraparound() {
        // 10 + 2^32 - 4294967290 = 16, well under half the counter space.
        assert_eq!(counter_rate(10, 4_294_967_290, 1.0), 16.0);
    }

    #[test]
    fn rate_treats_large_backwards_jump_as_reset() {
        // Reconstructed delta >= 2^31 means the counter was reset.
        assert_eq!(counter_rate(5, 100, 1.0), 0.0);
    }

    #[test]
    fn rate_treats_reset_from_64bit_counter_as_reset() {
        // A previous sample beyond the 32-bit space cannot be a wrap;
        // the reconstruction must not underflow.
        assert_eq!(counter_rate(5, 10_000_000_000, 1.0), 0.0);
        assert_eq!(counter_rate(0, u64::MAX, 1.0), 0.0);
    }

    #[test]
    fn rates_zero_without_previous_sample() {
        let now = Utc::now();
        let current = TrafficCounter {
            bytes_in: 1000,
            ..TrafficCounter::new(now)
        };
        assert_eq!(calculate_rates(&current, None), TrafficRates::default());
    }

    #[test]
    fn rates_zero_for_non_positive_time_delta() {
        let now = Utc::now();
        let previous = TrafficCounter::new(now);
        let current = TrafficCounter {
            bytes_in: 1000,
            ..TrafficCounter::new(now)
        };
        assert_eq!(
            calculate_rates(&current, Some(&previous)),
            TrafficRates::default()
        );

        let earlier = TrafficCounter {
            bytes_in: 1000,
            ..TrafficCounter::new(now - TimeDelta::seconds(5))
        };
        assert_eq!(
            calculate_rates(&earlier, Some(&previous)),
            TrafficRates::default()
        );
    }

    #[test]
    fn bit_rates_follow_byte_rates() {
        let now = Utc::now();
        let previous = TrafficCounter {
            bytes_in: 0,
            bytes_out: 100,
            ..TrafficCounter::new(now - TimeDelta::seconds(1))
        };
        let current = TrafficCounter {
            bytes_in: 1000,
            bytes_out: 600,
            ..TrafficCounter::new(now)
        };
        let rates = calculate_rates(&current, Some(&previous));
        assert_eq!(rates.bytes_in_rate, 1000.0);
        assert_eq!(rates.bits_in_rate, 8000.0);
        assert_eq!(rates.bytes_out_rate, 500.0);
        assert_eq!(rates.bits_out_rate, 4000.0);
    }

    #[test]
    fn wraparound_example_end_to_end() {
        let t0 = Utc::now();
        let t1 = t0 + TimeDelta::seconds(1);
        let previous = TrafficCounter {
            bytes_in: 4_294_967_290,
            ..TrafficCounter::new(t0)
        };
        let current = TrafficCounter {
            bytes_in: 10,
            ..TrafficCounter::new(t1)
        };
        let rates = calculate_rates(&current, Some(&previous));
        assert_eq!(rates.bytes_in_rate, 16.0);
        assert_eq!(rates.bits_in_rate, 128.0);
    }
}
