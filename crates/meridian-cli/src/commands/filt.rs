//! Filter wheel commands.

use clap::Subcommand;

use meridian_proto::{DaemonId, FilterAssignment, Request, UnitId};

use super::{send, Context};

#[derive(Subcommand, Debug)]
pub enum FiltCmd {
    /// Select a filter by name.
    Set {
        filter: String,
        #[arg(short, long)]
        units: Vec<UnitId>,
    },
    /// Home the wheels.
    Home {
        #[arg(short, long)]
        units: Vec<UnitId>,
    },
}

pub async fn run(ctx: &Context, cmd: FiltCmd) -> anyhow::Result<()> {
    let request = match cmd {
        FiltCmd::Set { filter, units } => Request::SetFilters {
            assignments: ctx
                .units_or_all(units)
                .into_iter()
                .map(|unit| FilterAssignment {
                    unit,
                    filter: filter.clone(),
                })
                .collect(),
        },
        FiltCmd::Home { units } => Request::HomeFilters {
            units: ctx.units_or_all(units),
        },
    };
    send(ctx, DaemonId::Filt, request).await
}
