//! Flux query construction
//!
//! Builders are pure: they only render query text from validated parameters
//! and never touch the store.

use std::fmt;
use vigil_influx::flux::{string_literal, trailing_minutes};

use crate::params::{CriticalAlertsParams, DeviceHealthParams, TemperatureAnomalyParams};

pub const EVENTS_MEASUREMENT: &str = "events";
pub const METRICS_MEASUREMENT: &str = "device_metrics";
pub const TEMPERATURE_METRIC: &str = "temperature";
pub const HEALTH_WINDOW_MINUTES: u32 = 5;

/// Columns kept for critical alert rows
pub const EVENT_COLUMNS: [&str; 5] = [
    "_time",
    "event_id",
    "event_type",
    "source_device",
    "criticality_level",
];

/// A rendered Flux query, scoped to one bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FluxQuery {
    text: String,
}

impl FluxQuery {
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for FluxQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Events at or above the criticality floor, newest first.
///
/// `criticality_level` is stored as a tag, so it is converted before the
/// comparison. Tables are merged so the ordering holds across series.
pub fn critical_alerts(bucket: &str, params: &CriticalAlertsParams) -> FluxQuery {
    let keep = EVENT_COLUMNS
        .iter()
        .map(|c| string_literal(c))
        .collect::<Vec<_>>()
        .join(", ");

    FluxQuery {
        text: format!(
            r#"from(bucket: {bucket})
  |> range(start: {start})
  |> filter(fn: (r) => r._measurement == {measurement})
  |> filter(fn: (r) => int(v: r.criticality_level) >= {min})
  |> group()
  |> sort(columns: ["_time"], desc: true)
  |> keep(columns: [{keep}])"#,
            bucket = string_literal(bucket),
            start = trailing_minutes(params.since_minutes),
            measurement = string_literal(EVENTS_MEASUREMENT),
            min = params.min_criticality,
            keep = keep,
        ),
    }
}

/// Latest metric row of one device within the health window
pub fn device_health(bucket: &str, params: &DeviceHealthParams) -> FluxQuery {
    FluxQuery {
        text: format!(
            r#"from(bucket: {bucket})
  |> range(start: {start})
  |> filter(fn: (r) => r._measurement == {measurement})
  |> filter(fn: (r) => r.source_device == {device})
  |> last()"#,
            bucket = string_literal(bucket),
            start = trailing_minutes(HEALTH_WINDOW_MINUTES),
            measurement = string_literal(METRICS_MEASUREMENT),
            device = string_literal(&params.source_device),
        ),
    }
}

/// Temperature samples of one device, oldest first
pub fn temperature_series(bucket: &str, params: &TemperatureAnomalyParams) -> FluxQuery {
    FluxQuery {
        text: format!(
            r#"from(bucket: {bucket})
  |> range(start: {start})
  |> filter(fn: (r) => r._measurement == {measurement})
  |> filter(fn: (r) => r.source_device == {device} and r.metric_type == {metric})
  |> sort(columns: ["_time"], desc: false)"#,
            bucket = string_literal(bucket),
            start = trailing_minutes(params.window_minutes),
            measurement = string_literal(METRICS_MEASUREMENT),
            device = string_literal(&params.source_device),
            metric = string_literal(TEMPERATURE_METRIC),
        ),
    }
}
