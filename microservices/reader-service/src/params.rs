//! Typed parameters for each pipeline
//!
//! Every pipeline parses its own subset of the request's `params` with
//! explicit defaults. Numbers may arrive as JSON numbers or numeric strings;
//! anything else is a coercion error. A `null` member counts as absent.

use serde_json::Value;

use crate::error::{QueryError, Result};
use crate::request::Params;

pub const SOURCE_DEVICE: &str = "source_device";

/// Parameters of `alerts_critical`
#[derive(Debug, Clone, PartialEq)]
pub struct CriticalAlertsParams {
    pub since_minutes: u32,
    pub min_criticality: i64,
}

impl CriticalAlertsParams {
    pub const DEFAULT_SINCE_MINUTES: u32 = 15;
    pub const DEFAULT_MIN_CRITICALITY: i64 = 8;

    pub fn parse(params: &Params) -> Result<Self> {
        Ok(Self {
            since_minutes: window_param(params, "since_minutes", Self::DEFAULT_SINCE_MINUTES)?,
            min_criticality: int_param(params, "min_criticality", Self::DEFAULT_MIN_CRITICALITY)?,
        })
    }
}

impl Default for CriticalAlertsParams {
    fn default() -> Self {
        Self {
            since_minutes: Self::DEFAULT_SINCE_MINUTES,
            min_criticality: Self::DEFAULT_MIN_CRITICALITY,
        }
    }
}

/// Parameters of `device_health`
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceHealthParams {
    pub source_device: String,
}

impl DeviceHealthParams {
    pub fn parse(params: &Params) -> Result<Self> {
        Ok(Self {
            source_device: required_device(params)?,
        })
    }
}

/// Parameters of `anomaly_temperature`
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureAnomalyParams {
    pub source_device: String,
    pub threshold: f64,
    pub window_minutes: u32,
}

impl TemperatureAnomalyParams {
    pub const DEFAULT_THRESHOLD: f64 = 1.3;
    pub const DEFAULT_WINDOW_MINUTES: u32 = 20;

    pub fn parse(params: &Params) -> Result<Self> {
        Ok(Self {
            source_device: required_device(params)?,
            threshold: float_param(params, "threshold", Self::DEFAULT_THRESHOLD)?,
            window_minutes: window_param(params, "window_minutes", Self::DEFAULT_WINDOW_MINUTES)?,
        })
    }
}

fn lookup<'a>(params: &'a Params, name: &str) -> Option<&'a Value> {
    params.get(name).filter(|v| !v.is_null())
}

/// Integer parameter; fractional numbers truncate toward zero
fn int_param(params: &Params, name: &'static str, default: i64) -> Result<i64> {
    let Some(value) = lookup(params, name) else {
        return Ok(default);
    };

    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    parsed.ok_or_else(|| QueryError::invalid(name, format!("expected an integer, got {}", value)))
}

/// Trailing window length in minutes; must be at least one minute
fn window_param(params: &Params, name: &'static str, default: u32) -> Result<u32> {
    let minutes = int_param(params, name, i64::from(default))?;
    u32::try_from(minutes)
        .ok()
        .filter(|m| *m > 0)
        .ok_or_else(|| QueryError::invalid(name, format!("expected a positive number of minutes, got {}", minutes)))
}

fn float_param(params: &Params, name: &'static str, default: f64) -> Result<f64> {
    let Some(value) = lookup(params, name) else {
        return Ok(default);
    };

    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed.ok_or_else(|| QueryError::invalid(name, format!("expected a number, got {}", value)))
}

fn required_device(params: &Params) -> Result<String> {
    match lookup(params, SOURCE_DEVICE) {
        None => Err(QueryError::MissingParam(SOURCE_DEVICE)),
        Some(Value::String(s)) if s.is_empty() => Err(QueryError::MissingParam(SOURCE_DEVICE)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(QueryError::invalid(
            SOURCE_DEVICE,
            format!("expected a string, got {}", other),
        )),
    }
}
