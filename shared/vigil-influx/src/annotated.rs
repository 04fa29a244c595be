//! Annotated CSV decoding
//!
//! The Flux query endpoint streams results as annotated CSV: each table
//! schema is introduced by `#datatype`, `#group` and `#default` rows followed
//! by a header row, then data rows whose `table` column identifies the table.
//! A schema change starts a fresh annotation block.

use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, StringRecord};

use crate::types::{FluxColumn, FluxRecord, FluxTable, FluxValue};
use crate::{InfluxError, Result};

const TABLE_COLUMN: &str = "table";
const ERROR_COLUMN: &str = "error";

#[derive(Default)]
struct Schema {
    data_types: Vec<String>,
    groups: Vec<bool>,
    defaults: Vec<String>,
    header: Option<Vec<String>>,
}

impl Schema {
    fn is_error_table(&self) -> bool {
        self.header
            .as_ref()
            .map(|h| h.iter().skip(1).any(|c| c == ERROR_COLUMN))
            .unwrap_or(false)
    }

    fn columns(&self) -> Vec<FluxColumn> {
        let header = self.header.as_deref().unwrap_or_default();
        header
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, name)| !name.is_empty())
            .map(|(i, name)| FluxColumn {
                name: name.clone(),
                data_type: self.data_types.get(i).cloned().unwrap_or_default(),
                group: self.groups.get(i).copied().unwrap_or(false),
                default_value: self.defaults.get(i).filter(|d| !d.is_empty()).cloned(),
            })
            .collect()
    }
}

/// Decode an annotated CSV body into tables, in stream order.
///
/// An `error` table in the stream is returned as [`InfluxError::Query`].
pub fn parse_annotated_csv(body: &str) -> Result<Vec<FluxTable>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut tables: Vec<FluxTable> = Vec::new();
    let mut schema = Schema::default();
    let mut schema_changed = true;

    for row in reader.records() {
        let row = row?;
        if row.iter().all(str::is_empty) {
            continue;
        }

        let first = row.get(0).unwrap_or_default();
        if first.starts_with('#') {
            if schema.header.is_some() {
                schema = Schema::default();
                schema_changed = true;
            }
            let rest = || row.iter().map(str::to_string).collect::<Vec<_>>();
            match first {
                "#datatype" => schema.data_types = rest(),
                "#group" => schema.groups = row.iter().map(|c| c == "true").collect(),
                "#default" => schema.defaults = rest(),
                _ => {}
            }
            continue;
        }

        if schema.header.is_none() {
            schema.header = Some(row.iter().map(str::to_string).collect());
            continue;
        }

        if schema.is_error_table() {
            return Err(InfluxError::Query(error_message(&schema, &row)));
        }

        let record = decode_record(&schema, &row)?;
        let starts_table = schema_changed
            || tables.last().map(|t| t.index != record.table).unwrap_or(true);
        if starts_table {
            tables.push(FluxTable {
                index: record.table,
                columns: schema.columns(),
                records: Vec::new(),
            });
            schema_changed = false;
        }
        if let Some(table) = tables.last_mut() {
            table.records.push(record);
        }
    }

    Ok(tables)
}

fn error_message(schema: &Schema, row: &StringRecord) -> String {
    let header = schema.header.as_deref().unwrap_or_default();
    header
        .iter()
        .position(|c| c == ERROR_COLUMN)
        .and_then(|i| row.get(i))
        .filter(|m| !m.is_empty())
        .unwrap_or("unknown query error")
        .to_string()
}

fn decode_record(schema: &Schema, row: &StringRecord) -> Result<FluxRecord> {
    let header = schema.header.as_deref().unwrap_or_default();
    let mut record = FluxRecord::default();

    for (i, name) in header.iter().enumerate().skip(1) {
        if name.is_empty() {
            continue;
        }
        let raw = row.get(i).unwrap_or_default();
        let raw = if raw.is_empty() {
            schema.defaults.get(i).map(String::as_str).unwrap_or_default()
        } else {
            raw
        };
        let data_type = schema.data_types.get(i).map(String::as_str).unwrap_or("string");
        let value = decode_value(name, data_type, raw)?;

        if name == TABLE_COLUMN {
            if let FluxValue::Long(index) = value {
                record.table = index;
            }
        }
        record.values.insert(name.clone(), value);
    }

    Ok(record)
}

fn decode_value(column: &str, data_type: &str, raw: &str) -> Result<FluxValue> {
    if raw.is_empty() {
        return Ok(FluxValue::Null);
    }

    let invalid = || {
        InfluxError::Parse(format!(
            "column {}: invalid {} value {:?}",
            column, data_type, raw
        ))
    };

    let value = match data_type {
        "long" => FluxValue::Long(raw.parse().map_err(|_| invalid())?),
        "unsignedLong" => FluxValue::UnsignedLong(raw.parse().map_err(|_| invalid())?),
        "double" => FluxValue::Double(match raw {
            "+Inf" => f64::INFINITY,
            "-Inf" => f64::NEG_INFINITY,
            _ => raw.parse().map_err(|_| invalid())?,
        }),
        "boolean" => match raw {
            "true" => FluxValue::Boolean(true),
            "false" => FluxValue::Boolean(false),
            _ => return Err(invalid()),
        },
        t if t.starts_with("dateTime") => FluxValue::Time(
            DateTime::parse_from_rfc3339(raw)
                .map_err(|_| invalid())?
                .with_timezone(&Utc),
        ),
        // string, duration, base64Binary and unannotated columns
        _ => FluxValue::String(raw.to_string()),
    };

    Ok(value)
}
