//! Query Client
//!
//! Sends query requests to the reader service over NATS and prints each
//! reply. Without arguments the three sample queries are sent one second
//! apart.

use anyhow::{bail, Context, Result};
use clap::Parser;
use reader_service::{Request, Response};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "query-client", version, about, long_about = None)]
struct Cli {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://nats:4222")]
    nats_url: String,

    /// Subject the reader service listens on
    #[arg(long, env = "NATS_SUBJECT_REQUEST", default_value = "reader.query")]
    subject: String,

    /// Seconds to wait for each reply
    #[arg(long, env = "QUERY_TIMEOUT_SECS", default_value_t = 10)]
    timeout_secs: u64,

    /// Also append every reply to this file
    #[arg(long, env = "CLIENT_OUTPUT")]
    output: Option<PathBuf>,

    /// Query type to send; omit to send the sample queries
    query_type: Option<String>,

    /// Parameters as a JSON object
    #[arg(requires = "query_type")]
    params: Option<String>,
}

fn sample_requests() -> Vec<Request> {
    vec![
        Request::new("alerts_critical", json!({"since_minutes": 15, "min_criticality": 8})),
        Request::new("device_health", json!({"source_device": "sensor-1"})),
        Request::new(
            "anomaly_temperature",
            json!({"source_device": "sensor-1", "threshold": 1.3, "window_minutes": 20}),
        ),
    ]
}

fn requests_from(cli: &Cli) -> Result<Vec<Request>> {
    let Some(query_type) = &cli.query_type else {
        return Ok(sample_requests());
    };

    let params = match &cli.params {
        Some(raw) => serde_json::from_str::<Value>(raw).context("params must be valid JSON")?,
        None => json!({}),
    };
    if !params.is_object() {
        bail!("params must be a JSON object, got {}", params);
    }
    Ok(vec![Request::new(query_type.clone(), params)])
}

fn query_type_of(request: &Request) -> String {
    match &request.query_type {
        Some(Value::String(name)) => name.clone(),
        Some(other) => other.to_string(),
        None => "None".to_string(),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("Error formatting JSON: {}", e))
}

/// Human-readable rendering of one reply
fn render(query_type: &str, response: &Response) -> String {
    if !response.is_success() {
        return format!(
            "QueryType: {}\nError: {}\n",
            query_type,
            response.message.as_deref().unwrap_or_default()
        );
    }

    let mut out = format!(
        "QueryType: {}\n{}\n",
        query_type,
        pretty(response.data.as_ref().unwrap_or(&Value::Null))
    );
    if let Some(summary) = &response.summary {
        out.push_str(&format!("Summary:\n{}\n", pretty(summary)));
    }
    out
}

async fn send(client: &async_nats::Client, subject: &str, request: &Request) -> Result<Response> {
    let payload = serde_json::to_vec(request)?;
    let reply = client
        .request(subject.to_string(), payload.into())
        .await
        .context("request failed")?;
    serde_json::from_slice(&reply.payload).context("failed to decode response")
}

async fn append(path: &Path, text: &str) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(text.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.flush().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = vigil_telemetry::init("query-client")?;
    let cli = Cli::parse();
    let requests = requests_from(&cli)?;

    let client = async_nats::ConnectOptions::new()
        .request_timeout(Some(Duration::from_secs(cli.timeout_secs)))
        .connect(cli.nats_url.as_str())
        .await
        .with_context(|| format!("failed to connect to NATS at {}", cli.nats_url))?;
    info!(url = %cli.nats_url, subject = %cli.subject, "Client started");

    for (i, request) in requests.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        let query_type = query_type_of(request);
        let rendered = match send(&client, &cli.subject, request).await {
            Ok(response) => {
                let rendered = render(&query_type, &response);
                println!("{}", rendered);
                rendered
            }
            Err(e) => {
                warn!(query_type = %query_type, error = %format!("{:#}", e), "Query failed");
                format!("Request failed: {:#}", e)
            }
        };

        if let Some(path) = &cli.output {
            if let Err(e) = append(path, &rendered).await {
                warn!(error = %format!("{:#}", e), "Failed to write reply");
            }
        }
    }

    Ok(())
}
