//! Pilot controller - main entry point.

use anyhow::Result;
use pilot_common::logging::init_logging;
use pilot_common::Config;
use pilot_gateway::PilotService;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Pilot controller v{}", env!("CARGO_PKG_VERSION"));

    // Start the controller service
    PilotService::new(config).start().await
}
