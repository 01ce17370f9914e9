//! Camera daemon binary.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use meridian_core::DaemonRegistry;
use meridian_daemon::DaemonRuntime;
use meridian_instruments::boot::{init_tracing, DaemonArgs};
use meridian_instruments::camera::{CameraProgram, CameraValidator};
use meridian_instruments::sim::SimCamera;
use meridian_store::{FileRunCounter, FsImageStore, JsonlLedger};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = DaemonArgs::parse();
    init_tracing("info");
    let config = args.load_config()?;
    let registry = DaemonRegistry::from_config(&config);

    let counter = Arc::new(FileRunCounter::open(config.data_dir.join("run_counter"))?);
    let ledger = Arc::new(JsonlLedger::new(config.data_dir.join("exposures.jsonl")));
    let images = FsImageStore::new(config.data_dir.join("images"));

    let hw = SimCamera::new(&config.units, config.camera.warm_temperature);
    let program = CameraProgram::new(hw, &config, counter, ledger, images);
    let validator = CameraValidator::new(&config, program.latest());

    info!(units = ?config.units, "camera daemon starting");
    DaemonRuntime::new(program, validator, &registry, &config)?
        .run()
        .await?;
    Ok(())
}
