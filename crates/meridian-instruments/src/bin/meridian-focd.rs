//! Focuser daemon binary.

use clap::Parser;
use tracing::info;

use meridian_core::DaemonRegistry;
use meridian_daemon::DaemonRuntime;
use meridian_instruments::boot::{init_tracing, DaemonArgs};
use meridian_instruments::focuser::{FocuserProgram, FocuserValidator};
use meridian_instruments::sim::SimFocuser;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = DaemonArgs::parse();
    init_tracing("info");
    let config = args.load_config()?;
    let registry = DaemonRegistry::from_config(&config);

    let hw = SimFocuser::new(&config.units, config.focuser.max_position);
    let program = FocuserProgram::new(hw, &config);
    let validator = FocuserValidator::new(&config);

    info!(units = ?config.units, "focuser daemon starting");
    DaemonRuntime::new(program, validator, &registry, &config)?
        .run()
        .await?;
    Ok(())
}
