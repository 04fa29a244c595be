//! Reader service lifecycle
//!
//! Startup checks the store and the bus before anything is served; either
//! being unreachable is fatal. Shutdown stops the request loop, waits for it
//! to drain and then closes the store client.

use async_nats::connection::State as NatsState;
use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};
use vigil_core::{DependencyStatus, HealthStatus, ReadinessStatus, Result, VigilError, VigilService};
use vigil_influx::InfluxClient;

use crate::config::ReaderConfig;
use crate::dispatcher::{DispatchMetrics, Dispatcher};
use crate::store::QueryStore;
use crate::transport::{self, RequestLoop};

pub const SERVICE_ID: &str = "reader-service";

/// Grace period on top of the store timeout for the loop to drain
const DRAIN_GRACE_SECS: u64 = 5;

/// Dependency checks shared by the service trait and the `/ready` route
#[derive(Clone)]
struct ReadinessProbe {
    influx: Arc<InfluxClient>,
    nats: async_nats::Client,
}

impl ReadinessProbe {
    async fn check(&self) -> ReadinessStatus {
        let started = Instant::now();
        let influx_ok = match self.influx.health().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "InfluxDB readiness check failed");
                false
            }
        };
        let influx_latency = started.elapsed().as_millis() as u64;
        let nats_ok = self.nats.connection_state() == NatsState::Connected;

        ReadinessStatus {
            ready: influx_ok && nats_ok,
            dependencies: vec![
                DependencyStatus {
                    name: "influxdb".to_string(),
                    available: influx_ok,
                    latency_ms: Some(influx_latency),
                },
                DependencyStatus {
                    name: "nats".to_string(),
                    available: nats_ok,
                    latency_ms: None,
                },
            ],
        }
    }
}

#[derive(Clone)]
struct HttpState {
    probe: ReadinessProbe,
    metrics: DispatchMetrics,
    subject: String,
    start_time: Instant,
}

pub struct ReaderService {
    config: ReaderConfig,
    influx: Arc<InfluxClient>,
    nats: async_nats::Client,
    dispatcher: Arc<Dispatcher>,
    probe: ReadinessProbe,
    shutdown_tx: watch::Sender<bool>,
    done_tx: watch::Sender<bool>,
    start_time: Instant,
}

impl ReaderService {
    pub async fn new() -> Result<Self> {
        Self::connect(ReaderConfig::from_env()?).await
    }

    /// Build the store client and connect to the bus, failing fast
    pub async fn connect(config: ReaderConfig) -> Result<Self> {
        let influx = InfluxClient::new(config.influx()).map_err(|e| VigilError::Database(e.to_string()))?;
        influx.health().await.map_err(|e| {
            VigilError::Database(format!("InfluxDB at {} is unreachable: {}", config.influx_url, e))
        })?;
        info!(url = %config.influx_url, org = influx.org(), bucket = %config.influx_bucket, "Connected to InfluxDB");

        let nats = async_nats::connect(config.nats_url.as_str())
            .await
            .map_err(|e| VigilError::Network(format!("Failed to connect to NATS at {}: {}", config.nats_url, e)))?;
        info!(url = %config.nats_url, "Connected to NATS");

        let influx = Arc::new(influx);
        let store: Arc<dyn QueryStore> = influx.clone();
        let dispatcher = Arc::new(Dispatcher::new(store, config.influx_bucket.clone()));
        let probe = ReadinessProbe {
            influx: influx.clone(),
            nats: nats.clone(),
        };

        Ok(Self {
            config,
            influx,
            nats,
            dispatcher,
            probe,
            shutdown_tx: watch::channel(false).0,
            done_tx: watch::channel(false).0,
            start_time: Instant::now(),
        })
    }

    fn health_status(&self) -> HealthStatus {
        HealthStatus {
            healthy: !self.influx.is_closed(),
            service_id: self.service_id().to_string(),
            version: self.version().to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    fn router(&self) -> Router {
        let state = HttpState {
            probe: self.probe.clone(),
            metrics: self.dispatcher.metrics().clone(),
            subject: self.config.request_subject.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/health", get(health))
            .route("/ready", get(ready))
            .route("/status", get(status))
            .with_state(state)
    }

    async fn serve(&self) -> Result<()> {
        let subscriber = transport::subscribe(
            &self.nats,
            &self.config.request_subject,
            self.config.queue_group.as_deref(),
        )
        .await?;

        let listener = tokio::net::TcpListener::bind(&self.config.http_bind).await?;
        info!(http = %self.config.http_bind, "HTTP endpoints listening");

        let mut http_shutdown = self.shutdown_tx.subscribe();
        let http = async {
            axum::serve(listener, self.router())
                .with_graceful_shutdown(async move {
                    let _ = http_shutdown.wait_for(|stop| *stop).await;
                })
                .await
                .map_err(VigilError::from)
        };

        let requests = RequestLoop::new(Arc::new(self.nats.clone()), self.dispatcher.clone(), self.config.max_in_flight);
        let bus = async {
            let outcome = requests.run(subscriber, self.shutdown_tx.subscribe()).await;
            // HTTP endpoints follow the request loop down
            self.shutdown_tx.send_replace(true);
            outcome
        };

        tokio::try_join!(http, bus)?;
        Ok(())
    }
}

async fn health(State(state): State<HttpState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        healthy: !state.probe.influx.is_closed(),
        service_id: SERVICE_ID.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

async fn ready(State(state): State<HttpState>) -> (StatusCode, Json<ReadinessStatus>) {
    let status = state.probe.check().await;
    let code = if status.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

async fn status(State(state): State<HttpState>) -> Json<Value> {
    Json(json!({
        "service_id": SERVICE_ID,
        "version": env!("CARGO_PKG_VERSION"),
        "subject": state.subject,
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "requests": state.metrics.snapshot(),
    }))
}

#[async_trait]
impl VigilService for ReaderService {
    fn service_id(&self) -> &'static str {
        SERVICE_ID
    }

    async fn health(&self) -> HealthStatus {
        self.health_status()
    }

    async fn ready(&self) -> ReadinessStatus {
        self.probe.check().await
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Shutting down reader service");
        self.shutdown_tx.send_replace(true);

        let grace = Duration::from_secs(self.config.influx_timeout_secs + DRAIN_GRACE_SECS);
        let mut done = self.done_tx.subscribe();
        if tokio::time::timeout(grace, done.wait_for(|finished| *finished)).await.is_err() {
            warn!(grace_secs = grace.as_secs(), "Request loop did not drain in time");
        }

        self.influx.close();
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        info!(
            subject = %self.config.request_subject,
            max_in_flight = self.config.max_in_flight,
            "Starting reader service"
        );

        let outcome = self.serve().await;
        self.done_tx.send_replace(true);
        outcome
    }
}
