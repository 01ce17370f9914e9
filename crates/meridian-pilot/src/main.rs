//! The pilot binary.
//!
//! Spawns one watch task per hardware daemon, the emergency listener,
//! the covers watchdog and the status API, then serves until killed.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use meridian_core::config::{MonitorConfig, ObservatoryConfig};
use meridian_core::DaemonRegistry;
use meridian_monitor::{
    ActionExecutor, CameraStrategy, CoversStrategy, FilterWheelStrategy, FocuserStrategy, Monitor,
    MonitorStrategy, PowerStrategy, SiteExecutor,
};
use meridian_supervisor::{RpcProbe, Supervisor};

use meridian_pilot::{
    emergency_listener, serve, ApiState, EmergencyRequest, LogNotifier, ModeCommands,
    MonitorStates, Notifier, Observer, RpcObserver, SafetyController, ScriptRunner, WatchTask,
};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the observatory TOML config. Environment variables prefixed
    /// with MERIDIAN_ override it.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

struct WatchParts {
    observer: Arc<dyn Observer>,
    executor: Arc<dyn ActionExecutor>,
    notifier: Arc<dyn Notifier>,
    states: MonitorStates,
    modes: ModeCommands,
    config: MonitorConfig,
    emergency: mpsc::Sender<EmergencyRequest>,
}

fn spawn_watch<S>(strategy: S, outlets: Vec<String>, registry: &DaemonRegistry, parts: &WatchParts)
where
    S: MonitorStrategy + 'static,
{
    let daemon = strategy.daemon_id();
    let Some(spec) = registry.get(daemon) else {
        error!(%daemon, "daemon missing from registry");
        return;
    };
    let task = WatchTask::new(
        Monitor::new(strategy).with_power_outlets(outlets),
        spec,
        Arc::clone(&parts.observer),
        Arc::clone(&parts.executor),
        Arc::clone(&parts.notifier),
        parts.states.clone(),
        parts.modes.clone(),
        parts.config.clone(),
        parts.emergency.clone(),
    );
    tokio::spawn(task.run());
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ObservatoryConfig::load(args.config.as_deref())?;
    info!(site = %config.site_name, "pilot starting");

    let registry = Arc::new(DaemonRegistry::from_config(&config));
    let supervisor = Supervisor::new(
        Arc::clone(&registry),
        RpcProbe::new(config.rpc.clone()),
        config.supervisor.clone(),
        config.rpc.clone(),
    );
    let executor: Arc<dyn ActionExecutor> = Arc::new(SiteExecutor::new(
        supervisor,
        Arc::clone(&registry),
        config.rpc.clone(),
    ));
    let observer: Arc<dyn Observer> =
        Arc::new(RpcObserver::new(Arc::clone(&registry), config.rpc.clone()));
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

    let states: MonitorStates = Arc::new(DashMap::new());
    let modes: ModeCommands = Arc::new(DashMap::new());
    let (emergency_tx, emergency_rx) = mpsc::channel(16);
    let script = ScriptRunner::new(config.script_dir.clone());

    let parts = WatchParts {
        observer,
        executor,
        notifier: Arc::clone(&notifier),
        states: states.clone(),
        modes: modes.clone(),
        config: config.monitor.clone(),
        emergency: emergency_tx,
    };
    let units = config.units.clone();
    let outlets = config.outlets.clone();
    // The power daemon drives the outlets; powering them on cannot be a
    // rung of its own recovery.
    spawn_watch(PowerStrategy, Vec::new(), &registry, &parts);
    spawn_watch(
        CameraStrategy::new(
            units.clone(),
            config.camera.cool_temperature,
            config.camera.temperature_margin,
        ),
        outlets.clone(),
        &registry,
        &parts,
    );
    spawn_watch(
        FocuserStrategy::new(units.clone()),
        outlets.clone(),
        &registry,
        &parts,
    );
    spawn_watch(
        FilterWheelStrategy::new(units.clone()),
        outlets.clone(),
        &registry,
        &parts,
    );
    spawn_watch(CoversStrategy::new(units), outlets, &registry, &parts);

    let controller = Arc::new(SafetyController::new(
        Arc::clone(&registry),
        config.rpc.clone(),
        config.units.clone(),
        config.camera.warm_temperature,
        script.clone(),
        modes.clone(),
        states.clone(),
        notifier,
    ));
    tokio::spawn(emergency_listener(Arc::clone(&controller), emergency_rx));
    tokio::spawn(Arc::clone(&controller).covers_watchdog(config.monitor.good_interval));

    serve(
        config.pilot.api_listen_addr,
        ApiState {
            monitors: states,
            modes,
            script,
        },
    )
    .await?;
    Ok(())
}
