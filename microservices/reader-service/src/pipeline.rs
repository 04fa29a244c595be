//! Query pipelines
//!
//! Each pipeline parses its parameters, renders one query, runs it against
//! the store, projects the rows and derives the answer. Parameter errors are
//! raised before the store is contacted.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use vigil_influx::VALUE_COLUMN;

use crate::derivation::{
    aggregate_critical_events, classify_device_health, detect_temperature_anomaly, CriticalAlerts, DeviceHealth,
    TemperatureAnomaly, NOT_ENOUGH_DATA,
};
use crate::error::Result;
use crate::params::{CriticalAlertsParams, DeviceHealthParams, TemperatureAnomalyParams};
use crate::projector::{project, EventRecord, HealthSample, TemperatureSample, VALUE_FIELD};
use crate::query::{self, EVENT_COLUMNS};
use crate::request::{Params, QueryKind, Response};
use crate::store::QueryStore;

/// What a request runs against
#[derive(Clone, Copy)]
pub struct QueryContext<'a> {
    pub store: &'a dyn QueryStore,
    pub bucket: &'a str,
}

/// Derived answer of one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    CriticalAlerts(CriticalAlerts),
    DeviceHealth(DeviceHealth),
    TemperatureAnomaly(TemperatureAnomaly),
}

impl Answer {
    pub fn into_response(self) -> Result<Response> {
        let response = match self {
            Self::CriticalAlerts(alerts) => Response::success(serde_json::to_value(&alerts.events)?)
                .with_summary(serde_json::to_value(&alerts.summary)?),
            Self::DeviceHealth(health) => Response::success(serde_json::to_value(&health)?),
            Self::TemperatureAnomaly(TemperatureAnomaly::NotEnoughData) => {
                Response::success(Value::String(NOT_ENOUGH_DATA.to_string()))
            }
            Self::TemperatureAnomaly(TemperatureAnomaly::Measured(ratio)) => {
                Response::success(serde_json::to_value(&ratio)?)
            }
        };
        Ok(response)
    }
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    fn kind(&self) -> QueryKind;
    async fn run(&self, ctx: QueryContext<'_>, params: &Params) -> Result<Answer>;
}

/// One pipeline per [`QueryKind`]
pub fn builtin() -> Vec<Box<dyn Pipeline>> {
    vec![
        Box::new(CriticalAlertsPipeline),
        Box::new(DeviceHealthPipeline),
        Box::new(TemperatureAnomalyPipeline),
    ]
}

pub struct CriticalAlertsPipeline;

#[async_trait]
impl Pipeline for CriticalAlertsPipeline {
    fn kind(&self) -> QueryKind {
        QueryKind::CriticalAlerts
    }

    async fn run(&self, ctx: QueryContext<'_>, params: &Params) -> Result<Answer> {
        let params = CriticalAlertsParams::parse(params)?;
        let query = query::critical_alerts(ctx.bucket, &params);
        let tables = ctx.store.execute(&query).await?;

        // _time is carried on Record itself
        let records = project(&tables, None, &EVENT_COLUMNS[1..])?;
        let events: Vec<EventRecord> = records.iter().filter_map(EventRecord::from_record).collect();
        debug!(rows = records.len(), events = events.len(), "Projected critical events");

        Ok(Answer::CriticalAlerts(aggregate_critical_events(events)))
    }
}

pub struct DeviceHealthPipeline;

#[async_trait]
impl Pipeline for DeviceHealthPipeline {
    fn kind(&self) -> QueryKind {
        QueryKind::DeviceHealth
    }

    async fn run(&self, ctx: QueryContext<'_>, params: &Params) -> Result<Answer> {
        let params = DeviceHealthParams::parse(params)?;
        let query = query::device_health(ctx.bucket, &params);
        let tables = ctx.store.execute(&query).await?;

        let records = project(&tables, Some(VALUE_FIELD), &[VALUE_COLUMN])?;
        let device = params.source_device.as_str();
        let samples = records.iter().filter_map(|r| HealthSample::from_record(device, r));

        Ok(Answer::DeviceHealth(classify_device_health(device, samples)))
    }
}

pub struct TemperatureAnomalyPipeline;

#[async_trait]
impl Pipeline for TemperatureAnomalyPipeline {
    fn kind(&self) -> QueryKind {
        QueryKind::TemperatureAnomaly
    }

    async fn run(&self, ctx: QueryContext<'_>, params: &Params) -> Result<Answer> {
        let params = TemperatureAnomalyParams::parse(params)?;
        let query = query::temperature_series(ctx.bucket, &params);
        let tables = ctx.store.execute(&query).await?;

        let records = project(&tables, Some(VALUE_FIELD), &[VALUE_COLUMN])?;
        let values: Vec<f64> = records
            .iter()
            .filter_map(TemperatureSample::from_record)
            .map(|sample| sample.value)
            .collect();

        Ok(Answer::TemperatureAnomaly(detect_temperature_anomaly(
            &params.source_device,
            &values,
            params.threshold,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::{DeviceEventCount, Health, TemperatureRatio};
    use serde_json::json;

    #[test]
    fn test_alerts_response_carries_summary() {
        let answer = Answer::CriticalAlerts(CriticalAlerts {
            events: vec![],
            summary: vec![DeviceEventCount {
                source_device: "A".into(),
                critical_event_count: 2,
            }],
        });
        let response = answer.into_response().unwrap();
        assert_eq!(response.data, Some(json!([])));
        assert_eq!(
            response.summary,
            Some(json!([{"source_device": "A", "critical_event_count": 2}]))
        );
    }

    #[test]
    fn test_not_enough_data_is_a_string() {
        let response = Answer::TemperatureAnomaly(TemperatureAnomaly::NotEnoughData)
            .into_response()
            .unwrap();
        assert!(response.is_success());
        assert_eq!(response.data, Some(json!("not enough data")));
        assert_eq!(response.summary, None);
    }

    #[test]
    fn test_answer_member_names() {
        let health = Answer::DeviceHealth(DeviceHealth {
            device: "sensor-1".into(),
            health: Health::Warning,
        })
        .into_response()
        .unwrap();
        assert_eq!(health.data, Some(json!({"device": "sensor-1", "health": "warning"})));

        let ratio = Answer::TemperatureAnomaly(TemperatureAnomaly::Measured(TemperatureRatio {
            device: "sensor-1".into(),
            initial_temp: 20.0,
            latest_temp: 30.0,
            ratio: 1.5,
            anomaly: true,
        }))
        .into_response()
        .unwrap();
        assert_eq!(
            ratio.data,
            Some(json!({
                "device": "sensor-1",
                "initial_temp": 20.0,
                "latest_temp": 30.0,
                "ratio": 1.5,
                "anomaly": true
            }))
        );
    }

    #[test]
    fn test_builtin_covers_every_kind() {
        let kinds: Vec<QueryKind> = builtin().iter().map(|p| p.kind()).collect();
        assert_eq!(kinds, QueryKind::ALL.to_vec());
    }
}
