//! Store seam between the pipelines and InfluxDB

use async_trait::async_trait;
use vigil_influx::{FluxTable, InfluxClient};

use crate::query::FluxQuery;

/// Executes rendered queries; shared read-only by concurrent requests
#[async_trait]
pub trait QueryStore: Send + Sync {
    async fn execute(&self, query: &FluxQuery) -> vigil_influx::Result<Vec<FluxTable>>;
}

#[async_trait]
impl QueryStore for InfluxClient {
    async fn execute(&self, query: &FluxQuery) -> vigil_influx::Result<Vec<FluxTable>> {
        self.query(query.as_str()).await
    }
}
