//! Mirror cover daemon binary.

use clap::Parser;
use tracing::info;

use meridian_core::DaemonRegistry;
use meridian_daemon::DaemonRuntime;
use meridian_instruments::boot::{init_tracing, DaemonArgs};
use meridian_instruments::covers::{CoversProgram, CoversValidator};
use meridian_instruments::sim::SimCovers;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = DaemonArgs::parse();
    init_tracing("info");
    let config = args.load_config()?;
    let registry = DaemonRegistry::from_config(&config);

    let hw = SimCovers::new(&config.units);
    let program = CoversProgram::new(hw, &config);
    let validator = CoversValidator::new(&config);

    info!(units = ?config.units, "cover daemon starting");
    DaemonRuntime::new(program, validator, &registry, &config)?
        .run()
        .await?;
    Ok(())
}
