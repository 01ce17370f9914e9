//! Daemon lifecycle and status commands.

use clap::Subcommand;

use meridian_proto::DaemonId;
use meridian_supervisor::{RpcProbe, Supervisor};

use super::Context;

#[derive(Subcommand, Debug)]
pub enum LifecycleCmd {
    /// Start a daemon and wait for it to come up.
    Start { daemon: DaemonId },
    /// Ask a daemon to exit gracefully.
    Stop { daemon: DaemonId },
    /// Stop and start a daemon.
    Restart { daemon: DaemonId },
    /// SIGKILL a daemon that will not die.
    Kill { daemon: DaemonId },
    /// Latest snapshot of one daemon, as JSON.
    Info {
        daemon: DaemonId,
        /// Make the daemon re-poll its hardware first.
        #[arg(short, long)]
        force: bool,
    },
    /// Wake a daemon's control loop for an immediate tick.
    Prod { daemon: DaemonId },
}

fn supervisor(ctx: &Context) -> Supervisor<RpcProbe> {
    Supervisor::new(
        ctx.registry.clone(),
        RpcProbe::new(ctx.config.rpc.clone()),
        ctx.config.supervisor.clone(),
        ctx.config.rpc.clone(),
    )
}

/// Prints daemon status: one daemon, or all of them in startup order.
pub async fn status(ctx: &Context, daemon: Option<DaemonId>) -> anyhow::Result<()> {
    let supervisor = supervisor(ctx);
    let daemons = daemon.map_or_else(|| DaemonId::ALL.to_vec(), |d| vec![d]);
    for daemon in daemons {
        let status = supervisor.status(daemon).await?;
        println!("{:<8} {status}", daemon.as_str());
    }
    Ok(())
}

pub async fn run(ctx: &Context, cmd: LifecycleCmd) -> anyhow::Result<()> {
    match cmd {
        LifecycleCmd::Start { daemon } => {
            let status = supervisor(ctx).start(daemon).await?;
            println!("{daemon}: {status}");
        }
        LifecycleCmd::Stop { daemon } => {
            supervisor(ctx).shutdown(daemon).await?;
            println!("{daemon}: stopped");
        }
        LifecycleCmd::Restart { daemon } => {
            let status = supervisor(ctx).restart(daemon).await?;
            println!("{daemon}: {status}");
        }
        LifecycleCmd::Kill { daemon } => {
            supervisor(ctx).kill(daemon).await?;
            println!("{daemon}: killed");
        }
        LifecycleCmd::Info { daemon, force } => {
            let snapshot = ctx.client(daemon)?.get_info(force).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        LifecycleCmd::Prod { daemon } => {
            ctx.client(daemon)?.prod().await?;
            println!("{daemon}: prodded");
        }
    }
    Ok(())
}
