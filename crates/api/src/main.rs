//! Sky Camera Server - Main Entry Point

use anyhow::Context;
use api::{init_logging, run_server, AppState, CameraDriver, ServerConfig};
use camera_capture::SimulatedCamera;
use exposure_control::ExposureController;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1);
    let config = ServerConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.log)?;

    info!("=== Sky Camera Server v{} ===", env!("CARGO_PKG_VERSION"));

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    exposure_control::metrics::describe();

    let controller = open_controller(&config).await?;
    let state = AppState::new(controller).with_metrics(metrics);

    run_server(&config.bind_addr, Arc::new(state)).await
}

async fn open_controller(config: &ServerConfig) -> anyhow::Result<ExposureController> {
    let timing = config.exposure.controller_config()?;

    match config.camera.driver {
        CameraDriver::Simulated => {
            info!("Using simulated camera");
            let (camera, _control) = SimulatedCamera::new(config.camera.simulated.clone());
            Ok(ExposureController::open(camera, timing).await?)
        }
        #[cfg(feature = "asi-sdk")]
        CameraDriver::Asi => {
            info!("Using ZWO ASI camera {:?}", config.camera.identifier);
            let camera = camera_capture::AsiCamera::find(&config.camera.identifier)?;
            Ok(ExposureController::open(camera, timing).await?)
        }
        #[cfg(not(feature = "asi-sdk"))]
        CameraDriver::Asi => {
            anyhow::bail!("camera.driver = \"asi\" requires building with the asi-sdk feature")
        }
    }
}
