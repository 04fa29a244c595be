//! Request dispatcher
//!
//! Maps `query_type` to its pipeline and folds every outcome into exactly
//! one response envelope. Nothing a caller sends can make `handle` fail.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info_span, warn, Instrument};
use vigil_telemetry::{Counter, Gauge, Histogram, HistogramSnapshot};

use crate::error::{QueryError, Result};
use crate::pipeline::{self, Pipeline, QueryContext};
use crate::request::{QueryKind, Request, Response};
use crate::store::QueryStore;

/// Request counters shared with the status endpoint
#[derive(Clone)]
pub struct DispatchMetrics {
    requests: Counter,
    failures: Counter,
    in_flight: Gauge,
    latency_ms: Histogram,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub failures: u64,
    pub in_flight: u64,
    pub latency_ms: HistogramSnapshot,
}

impl DispatchMetrics {
    fn new() -> Self {
        Self {
            requests: Counter::new("reader_requests_total"),
            failures: Counter::new("reader_failures_total"),
            in_flight: Gauge::new("reader_requests_in_flight"),
            latency_ms: Histogram::with_capacity("reader_request_latency_ms", 4096),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.get(),
            failures: self.failures.get(),
            in_flight: self.in_flight.get(),
            latency_ms: self.latency_ms.snapshot(),
        }
    }
}

pub struct Dispatcher {
    store: Arc<dyn QueryStore>,
    bucket: String,
    pipelines: HashMap<QueryKind, Box<dyn Pipeline>>,
    metrics: DispatchMetrics,
}

impl Dispatcher {
    /// Dispatcher over the built-in pipelines
    pub fn new(store: Arc<dyn QueryStore>, bucket: impl Into<String>) -> Self {
        Self::with_pipelines(store, bucket, pipeline::builtin())
    }

    /// Later pipelines replace earlier ones of the same kind
    pub fn with_pipelines(
        store: Arc<dyn QueryStore>,
        bucket: impl Into<String>,
        pipelines: Vec<Box<dyn Pipeline>>,
    ) -> Self {
        let pipelines = pipelines.into_iter().map(|p| (p.kind(), p)).collect();
        Self {
            store,
            bucket: bucket.into(),
            pipelines,
            metrics: DispatchMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    /// Handle a raw message body
    pub async fn handle_payload(&self, payload: &[u8]) -> Response {
        match serde_json::from_slice::<Request>(payload) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                self.metrics.requests.inc();
                self.metrics.failures.inc();
                let error = QueryError::InvalidRequest(e.to_string());
                warn!(error = %error, error_kind = error.kind(), "Rejected request body");
                Response::error(error.to_string())
            }
        }
    }

    pub async fn handle(&self, request: Request) -> Response {
        let started = Instant::now();
        self.metrics.requests.inc();
        self.metrics.in_flight.inc();

        let response = match self.dispatch(&request).await {
            Ok(response) => response,
            Err(error) => {
                self.metrics.failures.inc();
                warn!(error = %error, error_kind = error.kind(), "Query failed");
                Response::error(error.to_string())
            }
        };

        self.metrics.in_flight.dec();
        self.metrics
            .latency_ms
            .record(started.elapsed().as_secs_f64() * 1000.0);
        response
    }

    async fn dispatch(&self, request: &Request) -> Result<Response> {
        let kind = request.kind()?;
        let params = request.params()?;
        let pipeline = self
            .pipelines
            .get(&kind)
            .ok_or_else(|| QueryError::UnknownQueryType(kind.to_string()))?;

        let ctx = QueryContext {
            store: self.store.as_ref(),
            bucket: &self.bucket,
        };

        let span = info_span!("query", query_type = %kind);
        async move {
            let answer = pipeline.run(ctx, &params).await?;
            debug!("Answer derived");
            answer.into_response()
        }
        .instrument(span)
        .await
    }
}
