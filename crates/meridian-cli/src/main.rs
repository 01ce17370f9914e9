//! Command line control of the observatory daemons.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use meridian_core::ObservatoryConfig;

use commands::cam::CamCmd;
use commands::covers::CoversCmd;
use commands::filt::FiltCmd;
use commands::foc::FocCmd;
use commands::lifecycle::LifecycleCmd;
use commands::power::PowerCmd;
use commands::Context;

#[derive(Parser)]
#[command(name = "meridian")]
#[command(about = "Control the observatory daemons")]
#[command(version)]
struct Cli {
    /// Path to the observatory TOML config. Environment variables prefixed
    /// with MERIDIAN_ override it.
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Status of one daemon, or every daemon when omitted.
    Status { daemon: Option<meridian_proto::DaemonId> },

    #[command(flatten)]
    Lifecycle(LifecycleCmd),

    /// Camera daemon.
    Cam {
        #[command(subcommand)]
        cmd: CamCmd,
    },
    /// Focuser daemon.
    Foc {
        #[command(subcommand)]
        cmd: FocCmd,
    },
    /// Filter wheel daemon.
    Filt {
        #[command(subcommand)]
        cmd: FiltCmd,
    },
    /// Mirror cover daemon.
    Covers {
        #[command(subcommand)]
        cmd: CoversCmd,
    },
    /// Power distribution daemon.
    Power {
        #[command(subcommand)]
        cmd: PowerCmd,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = run(cli).await;
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ObservatoryConfig::load(cli.config.as_deref())?;
    let ctx = Context::new(config);

    match cli.command {
        Command::Status { daemon } => commands::lifecycle::status(&ctx, daemon).await,
        Command::Lifecycle(cmd) => commands::lifecycle::run(&ctx, cmd).await,
        Command::Cam { cmd } => commands::cam::run(&ctx, cmd).await,
        Command::Foc { cmd } => commands::foc::run(&ctx, cmd).await,
        Command::Filt { cmd } => commands::filt::run(&ctx, cmd).await,
        Command::Covers { cmd } => commands::covers::run(&ctx, cmd).await,
        Command::Power { cmd } => commands::power::run(&ctx, cmd).await,
    }
}
