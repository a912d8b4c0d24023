//! palisade-projections: projection host
//!
//! Opens the configured storage, replays the event log into the
//! materialized views and keeps them current until Ctrl-C.
//!
//! ## Configuration
//! - PALISADE_CONFIG: path to a YAML config file (optional)
//! - PALISADE__*: overrides, e.g. PALISADE__STORAGE__SQLITE__PATH
//! - PALISADE_LOG: log filter (default: info)

use tracing::{error, info};

use palisade::config::Config;
use palisade::utils::bootstrap::{init_tracing, shutdown_signal};
use palisade::utils::metrics::TracingMetricsSink;
use palisade::Palisade;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(None).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        instance_id = %config.instance_id,
        storage = ?config.storage.storage_type,
        "Starting palisade-projections"
    );

    let palisade = Palisade::builder(config)
        .with_metrics(TracingMetricsSink)
        .build()
        .await?;
    palisade.catch_up().await?;

    let workers = palisade.start_projections();
    shutdown_signal().await;

    info!("Stopping projection workers");
    workers.stop().await;
    Ok(())
}
