//! Power daemon binary.

use clap::Parser;
use tracing::info;

use meridian_core::DaemonRegistry;
use meridian_daemon::DaemonRuntime;
use meridian_instruments::boot::{init_tracing, DaemonArgs};
use meridian_instruments::power::{PowerProgram, PowerValidator};
use meridian_instruments::sim::SimPower;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = DaemonArgs::parse();
    init_tracing("info");
    let config = args.load_config()?;
    let registry = DaemonRegistry::from_config(&config);

    let hw = SimPower::new(&config.outlets);
    let program = PowerProgram::new(hw);
    let validator = PowerValidator::new(&config);

    info!(outlets = ?config.outlets, "power daemon starting");
    DaemonRuntime::new(program, validator, &registry, &config)?
        .run()
        .await?;
    Ok(())
}
