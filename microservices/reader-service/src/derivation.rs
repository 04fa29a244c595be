//! Answer derivation
//!
//! Three independent, deterministic strategies over projected rows.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::projector::{EventRecord, HealthSample};

/// Sentinel returned instead of a ratio when the series is too short
pub const NOT_ENOUGH_DATA: &str = "not enough data";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceEventCount {
    pub source_device: String,
    pub critical_event_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CriticalAlerts {
    /// Events in query order (newest first)
    pub events: Vec<EventRecord>,
    /// One entry per device, ordered by device name
    pub summary: Vec<DeviceEventCount>,
}

pub fn aggregate_critical_events(events: Vec<EventRecord>) -> CriticalAlerts {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    // Events without a device are listed but not counted
    for device in events.iter().filter_map(|e| e.source_device.as_deref()) {
        *counts.entry(device).or_default() += 1;
    }

    let summary = counts
        .into_iter()
        .map(|(device, count)| DeviceEventCount {
            source_device: device.to_string(),
            critical_event_count: count,
        })
        .collect();

    CriticalAlerts { events, summary }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Critical,
    Warning,
    Ok,
    Unknown,
}

impl Health {
    pub const CRITICAL_ABOVE: f64 = 90.0;
    pub const WARNING_ABOVE: f64 = 70.0;

    pub fn classify(value: f64) -> Self {
        if value > Self::CRITICAL_ABOVE {
            Self::Critical
        } else if value > Self::WARNING_ABOVE {
            Self::Warning
        } else {
            Self::Ok
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceHealth {
    pub device: String,
    pub health: Health,
}

/// Classify the last sample iterated.
///
/// A `last()` query normally yields a single row per series, but a device
/// reporting several metric types yields one row each; the final one wins.
pub fn classify_device_health<I>(device: &str, samples: I) -> DeviceHealth
where
    I: IntoIterator<Item = HealthSample>,
{
    let health = samples
        .into_iter()
        .last()
        .map(|sample| Health::classify(sample.value))
        .unwrap_or(Health::Unknown);

    DeviceHealth {
        device: device.to_string(),
        health,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureRatio {
    pub device: String,
    pub initial_temp: f64,
    pub latest_temp: f64,
    pub ratio: f64,
    pub anomaly: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemperatureAnomaly {
    NotEnoughData,
    Measured(TemperatureRatio),
}

/// Compare the latest value of an ascending series with the first one
pub fn detect_temperature_anomaly(device: &str, values: &[f64], threshold: f64) -> TemperatureAnomaly {
    let (initial, latest) = match values {
        [first, .., last] => (*first, *last),
        _ => return TemperatureAnomaly::NotEnoughData,
    };

    // The threshold applies to the exact ratio; only the reported value is rounded
    let exact = if initial != 0.0 { latest / initial } else { 0.0 };

    TemperatureAnomaly::Measured(TemperatureRatio {
        device: device.to_string(),
        initial_temp: initial,
        latest_temp: latest,
        ratio: round_half_even(exact),
        anomaly: exact >= threshold,
    })
}

/// Two decimals, ties to even on the exact binary value
fn round_half_even(value: f64) -> f64 {
    format!("{:.2}", value).parse().unwrap_or(value)
}
