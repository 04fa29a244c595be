//! Reader service configuration

use vigil_core::config::EnvSource;
use vigil_core::{Result, VigilError};
use vigil_influx::InfluxConfig;

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub http_bind: String,
    pub nats_url: String,
    pub request_subject: String,
    pub queue_group: Option<String>,
    pub influx_url: String,
    pub influx_token: String,
    pub influx_org: String,
    pub influx_bucket: String,
    pub influx_timeout_secs: u64,
    pub max_in_flight: usize,
}

impl ReaderConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_source(&EnvSource::process())
    }

    pub fn from_source<F>(env: &EnvSource<F>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let [influx_token, influx_org, influx_bucket] =
            env.require_all(["INFLUXDB_TOKEN", "INFLUXDB_ORG", "INFLUXDB_BUCKET"])?;

        let max_in_flight = env.parse_or("MAX_IN_FLIGHT", 64usize)?;
        if max_in_flight == 0 {
            return Err(VigilError::Config("Invalid MAX_IN_FLIGHT: must be at least 1".into()));
        }

        Ok(Self {
            http_bind: env.var_or("HTTP_BIND", "0.0.0.0:8080"),
            nats_url: env.var_or("NATS_URL", "nats://nats:4222"),
            request_subject: env.var_or("NATS_SUBJECT_REQUEST", "reader.query"),
            queue_group: env.get("NATS_QUEUE_GROUP"),
            influx_url: env.var_or("INFLUXDB_HOST", "http://influxdb:8086"),
            influx_token,
            influx_org,
            influx_bucket,
            influx_timeout_secs: env.parse_or("INFLUXDB_TIMEOUT_SECS", 30u64)?,
            max_in_flight,
        })
    }

    pub fn influx(&self) -> InfluxConfig {
        InfluxConfig {
            url: self.influx_url.clone(),
            token: self.influx_token.clone(),
            org: self.influx_org.clone(),
            timeout_secs: self.influx_timeout_secs,
        }
    }
}
