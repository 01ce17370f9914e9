//! Mirror cover commands.

use clap::Subcommand;

use meridian_proto::{DaemonId, Request, UnitId};

use super::{send, Context};

#[derive(Subcommand, Debug)]
pub enum CoversCmd {
    Open {
        #[arg(short, long)]
        units: Vec<UnitId>,
    },
    Close {
        #[arg(short, long)]
        units: Vec<UnitId>,
    },
    /// Halt mid-travel.
    Stop {
        #[arg(short, long)]
        units: Vec<UnitId>,
    },
}

pub async fn run(ctx: &Context, cmd: CoversCmd) -> anyhow::Result<()> {
    let request = match cmd {
        CoversCmd::Open { units } => Request::OpenCovers {
            units: ctx.units_or_all(units),
        },
        CoversCmd::Close { units } => Request::CloseCovers {
            units: ctx.units_or_all(units),
        },
        CoversCmd::Stop { units } => Request::StopCovers {
            units: ctx.units_or_all(units),
        },
    };
    send(ctx, DaemonId::Covers, request).await
}
