//! Reader service entry point

use reader_service::ReaderService;
use std::sync::Arc;
use tracing::{error, info};
use vigil_core::{MicroserviceRuntime, Result, VigilError};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = vigil_telemetry::init(reader_service::service::SERVICE_ID)
        .map_err(|e| VigilError::Config(e.to_string()))?;

    info!("Starting Reader Service");

    let service = match ReaderService::new().await {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!(error = %e, error_code = e.error_code(), "Reader service failed to start");
            return Err(e);
        }
    };

    MicroserviceRuntime::run(service).await
}
