//! Request and response envelopes exchanged over the message bus

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::QueryError;

/// Untyped request parameters as received on the wire
pub type Params = Map<String, Value>;

/// Closed set of supported query pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    CriticalAlerts,
    DeviceHealth,
    TemperatureAnomaly,
}

impl QueryKind {
    pub const ALL: [QueryKind; 3] = [
        QueryKind::CriticalAlerts,
        QueryKind::DeviceHealth,
        QueryKind::TemperatureAnomaly,
    ];

    /// Wire name used in `query_type`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CriticalAlerts => "alerts_critical",
            Self::DeviceHealth => "device_health",
            Self::TemperatureAnomaly => "anomaly_temperature",
        }
    }
}

impl FromStr for QueryKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| QueryError::UnknownQueryType(s.to_string()))
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound request body: `{query_type, params}`.
///
/// Both members stay untyped here; the dispatcher turns them into a
/// [`QueryKind`] and per-pipeline parameter structs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_type: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(query_type: impl Into<String>, params: Value) -> Self {
        Self {
            query_type: Some(Value::String(query_type.into())),
            params: Some(params),
        }
    }

    /// Resolve `query_type` against the supported pipelines
    pub fn kind(&self) -> Result<QueryKind, QueryError> {
        match &self.query_type {
            Some(Value::String(name)) => name.parse(),
            other => Err(QueryError::UnknownQueryType(match other {
                None | Some(Value::Null) => "None".to_string(),
                Some(value) => value.to_string(),
            })),
        }
    }

    /// Parameters as a map; absent or null parameters are empty
    pub fn params(&self) -> Result<Params, QueryError> {
        match &self.params {
            None | Some(Value::Null) => Ok(Params::new()),
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(other) => Err(QueryError::InvalidRequest(format!(
                "params must be an object, got {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Outbound envelope; absent members are omitted from the JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    pub fn success(data: Value) -> Self {
        Self {
            status: Status::Success,
            data: Some(data),
            summary: None,
            message: None,
        }
    }

    pub fn with_summary(mut self, summary: Value) -> Self {
        self.summary = Some(summary);
        self
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            data: None,
            summary: None,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// UTF-8 JSON body for the reply
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|e| {
            format!(
                r#"{{"status":"error","message":{}}}"#,
                Value::String(format!("failed to encode response: {}", e))
            )
            .into_bytes()
        })
    }
}
