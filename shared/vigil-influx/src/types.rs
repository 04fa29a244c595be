//! Flux result types

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Column carrying the sample timestamp
pub const TIME_COLUMN: &str = "_time";
/// Column carrying the field name of a sample
pub const FIELD_COLUMN: &str = "_field";
/// Column carrying the field value of a sample
pub const VALUE_COLUMN: &str = "_value";

/// A single cell decoded according to its `#datatype` annotation
#[derive(Debug, Clone, PartialEq)]
pub enum FluxValue {
    Null,
    String(String),
    Long(i64),
    UnsignedLong(u64),
    Double(f64),
    Boolean(bool),
    Time(DateTime<Utc>),
}

impl FluxValue {
    /// Numeric view of the value; strings and times are not numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Long(v) => Some(*v as f64),
            Self::UnsignedLong(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for FluxValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::String(s) => f.write_str(s),
            Self::Long(v) => write!(f, "{}", v),
            Self::UnsignedLong(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::Boolean(v) => write!(f, "{}", v),
            Self::Time(t) => f.write_str(&t.to_rfc3339()),
        }
    }
}

/// Column metadata from the annotation rows
#[derive(Debug, Clone, PartialEq)]
pub struct FluxColumn {
    pub name: String,
    pub data_type: String,
    pub group: bool,
    pub default_value: Option<String>,
}

/// One row of a result table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FluxRecord {
    pub table: i64,
    pub values: BTreeMap<String, FluxValue>,
}

impl FluxRecord {
    pub fn get(&self, column: &str) -> Option<&FluxValue> {
        self.values.get(column).filter(|v| !v.is_null())
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.get(TIME_COLUMN).and_then(FluxValue::as_time)
    }

    pub fn field(&self) -> Option<&str> {
        self.get(FIELD_COLUMN).and_then(FluxValue::as_str)
    }

    pub fn value(&self) -> Option<&FluxValue> {
        self.get(VALUE_COLUMN)
    }
}

/// A result table; records keep the order the server streamed them in
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FluxTable {
    pub index: i64,
    pub columns: Vec<FluxColumn>,
    pub records: Vec<FluxRecord>,
}
