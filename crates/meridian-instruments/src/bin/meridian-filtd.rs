//! Filter wheel daemon binary.

use clap::Parser;
use tracing::info;

use meridian_core::DaemonRegistry;
use meridian_daemon::DaemonRuntime;
use meridian_instruments::boot::{init_tracing, DaemonArgs};
use meridian_instruments::filterwheel::{FilterWheelProgram, FilterWheelValidator};
use meridian_instruments::sim::SimFilterWheel;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = DaemonArgs::parse();
    init_tracing("info");
    let config = args.load_config()?;
    let registry = DaemonRegistry::from_config(&config);

    let hw = SimFilterWheel::new(&config.units, config.filters.clone());
    let program = FilterWheelProgram::new(hw, &config);
    let validator = FilterWheelValidator::new(&config);

    info!(units = ?config.units, filters = ?config.filters, "filter wheel daemon starting");
    DaemonRuntime::new(program, validator, &registry, &config)?
        .run()
        .await?;
    Ok(())
}
