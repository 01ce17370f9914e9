//! Focuser commands.

use clap::Subcommand;

use meridian_proto::{DaemonId, FocuserTarget, Request, UnitId};

use super::{send, Context};

#[derive(Subcommand, Debug)]
pub enum FocCmd {
    /// Move by a signed offset.
    Move {
        offset: i32,
        #[arg(short, long)]
        units: Vec<UnitId>,
    },
    /// Move to an absolute position.
    Set {
        position: u32,
        #[arg(short, long)]
        units: Vec<UnitId>,
    },
    /// Home to the zero stop.
    Home {
        #[arg(short, long)]
        units: Vec<UnitId>,
    },
    /// Halt any motion.
    Stop {
        #[arg(short, long)]
        units: Vec<UnitId>,
    },
    /// Redefine the current position without moving.
    Sync {
        position: u32,
        #[arg(short, long)]
        units: Vec<UnitId>,
    },
}

fn targets(units: Vec<UnitId>, position: u32) -> Vec<FocuserTarget> {
    units
        .into_iter()
        .map(|unit| FocuserTarget { unit, position })
        .collect()
}

pub async fn run(ctx: &Context, cmd: FocCmd) -> anyhow::Result<()> {
    let request = match cmd {
        FocCmd::Move { offset, units } => Request::MoveFocusers {
            offsets: ctx
                .units_or_all(units)
                .into_iter()
                .map(|unit| (unit, offset))
                .collect(),
        },
        FocCmd::Set { position, units } => Request::SetFocusers {
            targets: targets(ctx.units_or_all(units), position),
        },
        FocCmd::Home { units } => Request::HomeFocusers {
            units: ctx.units_or_all(units),
        },
        FocCmd::Stop { units } => Request::StopFocusers {
            units: ctx.units_or_all(units),
        },
        FocCmd::Sync { position, units } => Request::SyncFocusers {
            targets: targets(ctx.units_or_all(units), position),
        },
    };
    send(ctx, DaemonId::Foc, request).await
}
