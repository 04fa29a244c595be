//! InfluxDB HTTP client

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

use crate::annotated::parse_annotated_csv;
use crate::types::FluxTable;
use crate::{InfluxError, Result};

/// Connection settings for an InfluxDB 2.x server
#[derive(Debug, Clone)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub timeout_secs: u64,
}

/// InfluxDB client.
///
/// The underlying HTTP client pools connections and is safe to share across
/// tasks for concurrent read-only queries.
pub struct InfluxClient {
    client: Client,
    base_url: String,
    token: String,
    org: String,
    closed: AtomicBool,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    dialect: Dialect,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Dialect {
    header: bool,
    delimiter: &'static str,
    annotations: [&'static str; 3],
    comment_prefix: &'static str,
    date_time_format: &'static str,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            header: true,
            delimiter: ",",
            annotations: ["datatype", "group", "default"],
            comment_prefix: "#",
            date_time_format: "RFC3339",
        }
    }
}

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl InfluxClient {
    /// Create a new client; no request is made until the first call
    pub fn new(config: InfluxConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| InfluxError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token,
            org: config.org,
            closed: AtomicBool::new(false),
        })
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    /// Check the server's `/health` endpoint
    pub async fn health(&self) -> Result<()> {
        self.ensure_open()?;
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();

        let health: HealthResponse = response
            .json()
            .await
            .map_err(|e| InfluxError::Connection(format!("unreadable health response ({}): {}", status, e)))?;

        if health.status == "pass" {
            debug!(url = %self.base_url, "InfluxDB is healthy");
            Ok(())
        } else {
            Err(InfluxError::Connection(format!(
                "InfluxDB health check reported {}: {}",
                health.status, health.message
            )))
        }
    }

    /// Execute a Flux query and decode every result table
    #[instrument(skip(self, flux), fields(org = %self.org))]
    pub async fn query(&self, flux: &str) -> Result<Vec<FluxTable>> {
        self.ensure_open()?;
        let started = Instant::now();
        let url = format!("{}/api/v2/query", self.base_url);

        let request = QueryRequest {
            query: flux,
            kind: "flux",
            dialect: Dialect::default(),
        };

        let response = self
            .client
            .post(&url)
            .query(&[("org", self.org.as_str())])
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/csv")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(InfluxError::Unauthorized(api_message(&body)));
        }
        if !status.is_success() {
            return Err(InfluxError::Api {
                status: status.as_u16(),
                message: api_message(&body),
            });
        }

        let tables = parse_annotated_csv(&body)?;
        debug!(
            tables = tables.len(),
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Flux query complete"
        );
        Ok(tables)
    }

    /// Close the client; later calls fail with [`InfluxError::Closed`]
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(url = %self.base_url, "InfluxDB client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(InfluxError::Closed)
        } else {
            Ok(())
        }
    }
}

/// InfluxDB reports failures as `{"code": ..., "message": ...}`
fn api_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().to_string())
}
