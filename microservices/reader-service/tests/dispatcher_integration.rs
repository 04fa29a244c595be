//! End-to-end dispatcher tests against an in-memory store

use async_trait::async_trait;
use parking_lot::Mutex;
use reader_service::query::FluxQuery;
use reader_service::{Dispatcher, QueryStore, Request, Response, Status};
use serde_json::{json, Value};
use std::sync::Arc;
use vigil_influx::{parse_annotated_csv, FluxTable, InfluxError};

/// Serves a fixed annotated CSV body and records every query it receives
struct CannedStore {
    body: &'static str,
    queries: Mutex<Vec<String>>,
}

impl CannedStore {
    fn new(body: &'static str) -> Arc<Self> {
        Arc::new(Self {
            body,
            queries: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.queries.lock().len()
    }

    fn last_query(&self) -> String {
        self.queries.lock().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl QueryStore for CannedStore {
    async fn execute(&self, query: &FluxQuery) -> vigil_influx::Result<Vec<FluxTable>> {
        self.queries.lock().push(query.to_string());
        parse_annotated_csv(self.body)
    }
}

struct FailingStore;

#[async_trait]
impl QueryStore for FailingStore {
    async fn execute(&self, _query: &FluxQuery) -> vigil_influx::Result<Vec<FluxTable>> {
        Err(InfluxError::Api {
            status: 500,
            message: "internal error".into(),
        })
    }
}

const CRITICAL_EVENTS: &str = "\
#datatype,string,long,dateTime:RFC3339,string,string,string,string
#group,false,false,false,false,false,false,false
#default,_result,,,,,,
,result,table,_time,event_id,event_type,source_device,criticality_level
,,0,2024-05-01T10:03:00Z,e3,DriveFailure,A,10
,,0,2024-05-01T10:02:00Z,e2,PowerLoss,B,8
,,0,2024-05-01T10:01:00Z,e1,DriveFailure,A,9

";

const LATEST_METRICS: &str = "\
#datatype,string,long,dateTime:RFC3339,double,string,string,string,string
#group,false,false,false,false,true,true,true,true
#default,_result,,,,,,,
,result,table,_time,_value,_field,_measurement,metric_type,source_device
,,0,2024-05-01T10:04:00Z,95,value,device_metrics,cpu,sensor-1
,,1,2024-05-01T10:04:10Z,75,value,device_metrics,temperature,sensor-1

";

const TEMPERATURES: &str = "\
#datatype,string,long,dateTime:RFC3339,double,string,string,string,string
#group,false,false,false,false,true,true,true,true
#default,_result,,,,,,,
,result,table,_time,_value,_field,_measurement,metric_type,source_device
,,0,2024-05-01T10:00:00Z,20,value,device_metrics,temperature,sensor-1
,,0,2024-05-01T10:05:00Z,25,value,device_metrics,temperature,sensor-1
,,0,2024-05-01T10:10:00Z,30,value,device_metrics,temperature,sensor-1

";

const SINGLE_TEMPERATURE: &str = "\
#datatype,string,long,dateTime:RFC3339,double,string,string,string,string
#group,false,false,false,false,true,true,true,true
#default,_result,,,,,,,
,result,table,_time,_value,_field,_measurement,metric_type,source_device
,,0,2024-05-01T10:00:00Z,20,value,device_metrics,temperature,sensor-1

";

fn dispatcher(store: Arc<dyn QueryStore>) -> Dispatcher {
    Dispatcher::new(store, "telemetry")
}

fn body(response: &Response) -> Value {
    serde_json::from_slice(&response.to_bytes()).unwrap()
}

#[tokio::test]
async fn test_unknown_query_type() {
    let store = CannedStore::new("");
    let response = dispatcher(store.clone())
        .handle_payload(br#"{"query_type": "cpu_report", "params": {}}"#)
        .await;

    assert_eq!(
        body(&response),
        json!({"status": "error", "message": "Unknown query_type: cpu_report"})
    );
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn test_missing_query_type() {
    let store = CannedStore::new("");
    let response = dispatcher(store.clone()).handle_payload(br#"{"params": {}}"#).await;

    assert_eq!(
        body(&response),
        json!({"status": "error", "message": "Unknown query_type: None"})
    );
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn test_critical_alerts_with_summary() {
    let store = CannedStore::new(CRITICAL_EVENTS);
    let response = dispatcher(store.clone())
        .handle(Request::new(
            "alerts_critical",
            json!({"since_minutes": 15, "min_criticality": 8}),
        ))
        .await;

    assert_eq!(response.status, Status::Success);
    let body = body(&response);
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["e3", "e2", "e1"]);
    assert_eq!(body["data"][0]["time"], json!("2024-05-01T10:03:00+00:00"));
    assert_eq!(body["data"][0]["criticality"], json!(10));
    assert_eq!(
        body["summary"],
        json!([
            {"source_device": "A", "critical_event_count": 2},
            {"source_device": "B", "critical_event_count": 1}
        ])
    );
    assert!(store.last_query().contains("int(v: r.criticality_level) >= 8"));
}

#[tokio::test]
async fn test_critical_alerts_without_events() {
    let store = CannedStore::new("");
    let response = dispatcher(store).handle(Request::new("alerts_critical", Value::Null)).await;

    assert_eq!(
        body(&response),
        json!({"status": "success", "data": [], "summary": []})
    );
}

#[tokio::test]
async fn test_device_health_keeps_last_sample() {
    let store = CannedStore::new(LATEST_METRICS);
    let response = dispatcher(store.clone())
        .handle(Request::new("device_health", json!({"source_device": "sensor-1"})))
        .await;

    assert_eq!(
        body(&response),
        json!({"status": "success", "data": {"device": "sensor-1", "health": "warning"}})
    );
    assert!(store.last_query().contains(r#"r.source_device == "sensor-1""#));
}

#[tokio::test]
async fn test_device_health_unknown_without_samples() {
    let store = CannedStore::new("");
    let response = dispatcher(store)
        .handle(Request::new("device_health", json!({"source_device": "sensor-9"})))
        .await;

    assert_eq!(response.data, Some(json!({"device": "sensor-9", "health": "unknown"})));
}

#[tokio::test]
async fn test_temperature_anomaly_detected() {
    let store = CannedStore::new(TEMPERATURES);
    let response = dispatcher(store.clone())
        .handle(Request::new(
            "anomaly_temperature",
            json!({"source_device": "sensor-1", "threshold": 1.3, "window_minutes": 20}),
        ))
        .await;

    assert_eq!(
        body(&response),
        json!({
            "status": "success",
            "data": {
                "device": "sensor-1",
                "initial_temp": 20.0,
                "latest_temp": 30.0,
                "ratio": 1.5,
                "anomaly": true
            }
        })
    );
    assert!(store.last_query().contains("range(start: -20m)"));
}

#[tokio::test]
async fn test_temperature_not_enough_data() {
    let store = CannedStore::new(SINGLE_TEMPERATURE);
    let response = dispatcher(store)
        .handle(Request::new("anomaly_temperature", json!({"source_device": "sensor-1"})))
        .await;

    assert_eq!(
        body(&response),
        json!({"status": "success", "data": "not enough data"})
    );
}

#[tokio::test]
async fn test_missing_device_never_reaches_store() {
    let store = CannedStore::new(LATEST_METRICS);
    let dispatcher = dispatcher(store.clone());

    for query_type in ["device_health", "anomaly_temperature"] {
        let response = dispatcher.handle(Request::new(query_type, json!({}))).await;
        assert_eq!(
            body(&response),
            json!({"status": "error", "message": "source_device is required"})
        );
    }
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn test_coercion_error_is_in_band() {
    let store = CannedStore::new(CRITICAL_EVENTS);
    let response = dispatcher(store.clone())
        .handle(Request::new("alerts_critical", json!({"since_minutes": "soon"})))
        .await;

    assert_eq!(response.status, Status::Error);
    assert!(response.message.unwrap().starts_with("invalid since_minutes: "));
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn test_store_failure_keeps_serving() {
    let dispatcher = dispatcher(Arc::new(FailingStore));
    let request = Request::new("device_health", json!({"source_device": "sensor-1"}));

    let first = dispatcher.handle(request.clone()).await;
    let second = dispatcher.handle(request).await;

    assert_eq!(first.status, Status::Error);
    assert_eq!(first, second);
    assert_eq!(dispatcher.metrics().snapshot().failures, 2);
}

#[tokio::test]
async fn test_identical_requests_get_identical_replies() {
    let store = CannedStore::new(CRITICAL_EVENTS);
    let dispatcher = dispatcher(store);
    let payload = br#"{"query_type": "alerts_critical", "params": {"min_criticality": 8}}"#;

    let first = dispatcher.handle_payload(payload).await.to_bytes();
    let second = dispatcher.handle_payload(payload).await.to_bytes();

    assert_eq!(first, second);
}
