//! Power distribution commands.

use clap::Subcommand;

use meridian_proto::{DaemonId, Request};

use super::{send, Context};

#[derive(Subcommand, Debug)]
pub enum PowerCmd {
    /// Switch outlets on.
    On {
        #[arg(required = true)]
        outlets: Vec<String>,
    },
    /// Switch outlets off.
    Off {
        #[arg(required = true)]
        outlets: Vec<String>,
    },
    /// Power-cycle outlets.
    Reboot {
        #[arg(required = true)]
        outlets: Vec<String>,
    },
}

pub async fn run(ctx: &Context, cmd: PowerCmd) -> anyhow::Result<()> {
    let request = match cmd {
        PowerCmd::On { outlets } => Request::PowerOn { outlets },
        PowerCmd::Off { outlets } => Request::PowerOff { outlets },
        PowerCmd::Reboot { outlets } => Request::Reboot { outlets },
    };
    send(ctx, DaemonId::Power, request).await
}
