//! Stream monitor binary.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vigil_media::{
    FfmpegSourceFactory, FfmpegWriterFactory, LuminanceClassifier, ThresholdDetector,
};
use vigil_monitor::{load_config, Monitor};
use vigil_pipeline::PipelineDeps;

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("vigil=info".parse().unwrap()))
        .init();

    info!("Starting vigil-monitor");

    let config_path = std::env::args().nth(1);
    let cfg = match load_config(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if cfg.channels.iter().filter(|c| c.enable).count() == 0 {
        error!("No enabled channels configured");
        std::process::exit(1);
    }

    if let Err(e) = vigil_media::check_ffmpeg() {
        warn!("{}; stream decode and clip encode will fail", e);
    }

    let deps = PipelineDeps {
        detector: Arc::new(ThresholdDetector::default()),
        classifier: Arc::new(LuminanceClassifier::default()),
        writer_factory: Arc::new(FfmpegWriterFactory),
    };
    let monitor = Monitor::new(cfg, deps, Arc::new(FfmpegSourceFactory));

    if let Err(e) = monitor.run().await {
        error!("Monitor error: {}", e);
        std::process::exit(1);
    }

    info!("Monitor shutdown complete");
}
