//! # Social Pulse Worker
//!
//! Loads configuration, starts the job queue with the product's handlers,
//! and runs until Ctrl+C or SIGTERM.

use pulse_config::ConfigLoader;
use pulse_core::{init_telemetry, PulseResult};
use pulse_jobs::register_metrics;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Telemetry may not be up yet.
        eprintln!("Application error: {}", e);
        error!("Application error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> PulseResult<()> {
    let config_loader = ConfigLoader::from_default_location()?;
    let config = config_loader.get().await;

    init_telemetry(&config.telemetry)?;
    register_metrics();

    info!(
        service = %config.telemetry.service_name,
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.app.environment,
        "Starting Social Pulse worker"
    );

    let queue = pulse_worker::build_queue(&config)?;

    shutdown_signal().await;

    queue.shutdown();
    let stats = queue.get_stats();
    if stats.processing > 0 || stats.pending > 0 {
        warn!(
            pending = stats.pending,
            processing = stats.processing,
            retrying = stats.retrying,
            "Unfinished jobs are dropped on shutdown"
        );
    }

    info!("Worker shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
