//! Row projection
//!
//! Flattens the tables returned by the store into plain [`Record`]s and then
//! into the typed rows each pipeline derives from. Tables are walked in the
//! order the store returned them, records in table order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use vigil_influx::{FluxTable, FluxValue, TIME_COLUMN, VALUE_COLUMN};

use crate::error::{QueryError, Result};

/// Field name carrying metric samples
pub const VALUE_FIELD: &str = "value";

/// One sample at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub time: DateTime<Utc>,
    pub fields: BTreeMap<String, FluxValue>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&FluxValue> {
        self.fields.get(column)
    }

    /// Text of a cell; null cells stay null
    fn text(&self, column: &str) -> Option<String> {
        self.get(column).filter(|v| !v.is_null()).map(ToString::to_string)
    }
}

/// Project every row into a [`Record`] holding `columns`.
///
/// With `field` set, rows of any other `_field` are skipped. A row without a
/// timestamp or without one of the requested columns is malformed.
pub fn project(tables: &[FluxTable], field: Option<&str>, columns: &[&str]) -> Result<Vec<Record>> {
    let mut records = Vec::new();

    for table in tables {
        for row in &table.records {
            if let Some(expected) = field {
                if row.field() != Some(expected) {
                    continue;
                }
            }

            let time = row.time().ok_or_else(|| {
                QueryError::MalformedRow(format!("table {} has a row without {}", table.index, TIME_COLUMN))
            })?;

            let mut fields = BTreeMap::new();
            for column in columns {
                let value = row.values.get(*column).ok_or_else(|| {
                    QueryError::MalformedRow(format!("row at {} has no column {}", iso8601(&time), column))
                })?;
                fields.insert(column.to_string(), value.clone());
            }

            records.push(Record { time, fields });
        }
    }

    Ok(records)
}

/// Critical event row, serialized as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub time: String,
    pub event_id: Option<String>,
    pub source_device: Option<String>,
    pub event_type: Option<String>,
    pub criticality: i64,
}

impl EventRecord {
    /// `None` when the criticality is not an integer
    pub fn from_record(record: &Record) -> Option<Self> {
        let criticality = record.get("criticality_level").and_then(integer)?;
        Some(Self {
            time: iso8601(&record.time),
            event_id: record.text("event_id"),
            source_device: record.text("source_device"),
            event_type: record.text("event_type"),
            criticality,
        })
    }
}

/// Latest known metric value for a device
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSample {
    pub device: String,
    pub value: f64,
}

impl HealthSample {
    pub fn from_record(device: &str, record: &Record) -> Option<Self> {
        let value = record.get(VALUE_COLUMN)?.as_f64()?;
        Some(Self {
            device: device.to_string(),
            value,
        })
    }
}

/// One point of a temperature series
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureSample {
    pub time: DateTime<Utc>,
    pub value: f64,
}

impl TemperatureSample {
    pub fn from_record(record: &Record) -> Option<Self> {
        let value = record.get(VALUE_COLUMN)?.as_f64()?;
        Some(Self {
            time: record.time,
            value,
        })
    }
}

/// ISO-8601 with an explicit UTC offset.
///
/// Sub-second precision is microseconds, written only when non-zero;
/// nanoseconds are truncated.
pub fn iso8601(time: &DateTime<Utc>) -> String {
    let seconds = time.format("%Y-%m-%dT%H:%M:%S");
    match time.timestamp_subsec_micros() {
        0 => format!("{}+00:00", seconds),
        micros => format!("{}.{:06}+00:00", seconds, micros),
    }
}

/// Integer view of a cell; tags hold integers as strings
fn integer(value: &FluxValue) -> Option<i64> {
    match value {
        FluxValue::Long(v) => Some(*v),
        FluxValue::UnsignedLong(v) => i64::try_from(*v).ok(),
        FluxValue::Double(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
        FluxValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vigil_influx::{FluxRecord, FIELD_COLUMN};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap()
    }

    fn row(minute: u32, cells: &[(&str, FluxValue)]) -> FluxRecord {
        let mut record = FluxRecord::default();
        record.values.insert(TIME_COLUMN.into(), FluxValue::Time(at(minute)));
        for (name, value) in cells {
            record.values.insert(name.to_string(), value.clone());
        }
        record
    }

    fn table(index: i64, records: Vec<FluxRecord>) -> FluxTable {
        FluxTable {
            index,
            columns: vec![],
            records,
        }
    }

    fn value_row(minute: u32, field: &str, value: FluxValue) -> FluxRecord {
        row(
            minute,
            &[(FIELD_COLUMN, FluxValue::String(field.into())), (VALUE_COLUMN, value)],
        )
    }

    #[test]
    fn test_tables_then_records_order() {
        let tables = vec![
            table(0, vec![value_row(2, "value", FluxValue::Double(1.0)), value_row(3, "value", FluxValue::Double(2.0))]),
            table(1, vec![value_row(1, "value", FluxValue::Double(3.0))]),
        ];
        let records = project(&tables, Some(VALUE_FIELD), &[VALUE_COLUMN]).unwrap();
        let values: Vec<f64> = records.iter().filter_map(|r| r.get(VALUE_COLUMN)?.as_f64()).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_other_fields_are_skipped() {
        let tables = vec![table(
            0,
            vec![
                value_row(1, "event_message", FluxValue::String("disk failing".into())),
                value_row(2, "value", FluxValue::Long(42)),
            ],
        )];
        let records = project(&tables, Some(VALUE_FIELD), &[VALUE_COLUMN]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].time, at(2));
    }

    #[test]
    fn test_missing_column_is_malformed() {
        let tables = vec![table(0, vec![row(1, &[("event_id", FluxValue::String("e1".into()))])])];
        let err = project(&tables, None, &["event_id", "criticality_level"]).unwrap_err();
        assert_eq!(err.to_string(), "malformed row: row at 2024-05-01T10:01:00+00:00 has no column criticality_level");
    }

    #[test]
    fn test_missing_time_is_malformed() {
        let mut record = FluxRecord::default();
        record.values.insert(VALUE_COLUMN.into(), FluxValue::Double(1.0));
        let err = project(&[table(3, vec![record])], None, &[VALUE_COLUMN]).unwrap_err();
        assert!(matches!(err, QueryError::MalformedRow(_)));
    }

    #[test]
    fn test_event_record_parses_tag_criticality() {
        let tables = vec![table(
            0,
            vec![
                row(
                    5,
                    &[
                        ("event_id", FluxValue::String("e1".into())),
                        ("event_type", FluxValue::String("DriveFailure".into())),
                        ("source_device", FluxValue::String("DiskUnit".into())),
                        ("criticality_level", FluxValue::String("9".into())),
                    ],
                ),
                row(
                    4,
                    &[
                        ("event_id", FluxValue::String("e2".into())),
                        ("event_type", FluxValue::String("DataCorruption".into())),
                        ("source_device", FluxValue::String("DiskUnit".into())),
                        ("criticality_level", FluxValue::String("high".into())),
                    ],
                ),
            ],
        )];
        let records = project(&tables, None, &crate::query::EVENT_COLUMNS[1..]).unwrap();
        let events: Vec<EventRecord> = records.iter().filter_map(EventRecord::from_record).collect();

        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            EventRecord {
                time: "2024-05-01T10:05:00+00:00".into(),
                event_id: Some("e1".into()),
                source_device: Some("DiskUnit".into()),
                event_type: Some("DriveFailure".into()),
                criticality: 9,
            }
        );
    }

    #[test]
    fn test_iso8601_precision() {
        assert_eq!(iso8601(&at(5)), "2024-05-01T10:05:00+00:00");

        let half = at(5) + chrono::Duration::milliseconds(500);
        assert_eq!(iso8601(&half), "2024-05-01T10:05:00.500000+00:00");

        let nanos = at(5) + chrono::Duration::nanoseconds(123_456_789);
        assert_eq!(iso8601(&nanos), "2024-05-01T10:05:00.123456+00:00");

        let below_micro = at(5) + chrono::Duration::nanoseconds(999);
        assert_eq!(iso8601(&below_micro), "2024-05-01T10:05:00+00:00");
    }

    #[test]
    fn test_null_tags_stay_null() {
        let tables = vec![table(
            0,
            vec![row(
                6,
                &[
                    ("event_id", FluxValue::String("e7".into())),
                    ("event_type", FluxValue::Null),
                    ("source_device", FluxValue::Null),
                    ("criticality_level", FluxValue::String("9".into())),
                ],
            )],
        )];
        let records = project(&tables, None, &crate::query::EVENT_COLUMNS[1..]).unwrap();
        let event = EventRecord::from_record(&records[0]).unwrap();

        assert_eq!(event.source_device, None);
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({
                "time": "2024-05-01T10:06:00+00:00",
                "event_id": "e7",
                "source_device": null,
                "event_type": null,
                "criticality": 9
            })
        );
    }

    #[test]
    fn test_non_numeric_samples_are_skipped() {
        let tables = vec![table(
            0,
            vec![
                value_row(1, "value", FluxValue::String("n/a".into())),
                value_row(2, "value", FluxValue::Null),
                value_row(3, "value", FluxValue::Long(75)),
            ],
        )];
        let records = project(&tables, Some(VALUE_FIELD), &[VALUE_COLUMN]).unwrap();
        let samples: Vec<HealthSample> = records
            .iter()
            .filter_map(|r| HealthSample::from_record("sensor-1", r))
            .collect();
        assert_eq!(samples, vec![HealthSample { device: "sensor-1".into(), value: 75.0 }]);

        let temps: Vec<TemperatureSample> = records.iter().filter_map(TemperatureSample::from_record).collect();
        assert_eq!(temps.len(), 1);
        assert_eq!(temps[0].time, at(3));
    }
}
