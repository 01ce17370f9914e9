//! Camera commands.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Subcommand, ValueEnum};

use meridian_proto::{
    DaemonId, ExposureRequest, FrameType, ImageType, Request, Response, UnitId, Window,
};

use super::{send, Context};

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ImageTypeArg {
    Bias,
    Dark,
    Flat,
    Focus,
    Science,
}

impl From<ImageTypeArg> for ImageType {
    fn from(arg: ImageTypeArg) -> Self {
        match arg {
            ImageTypeArg::Bias => Self::Bias,
            ImageTypeArg::Dark => Self::Dark,
            ImageTypeArg::Flat => Self::Flat,
            ImageTypeArg::Focus => Self::Focus,
            ImageTypeArg::Science => Self::Science,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum CamCmd {
    /// Start an exposure.
    Expose {
        /// Integration time in seconds.
        exptime: f64,
        #[arg(short, long, default_value_t = 1)]
        binning: u8,
        #[arg(long, value_enum, default_value_t = ImageTypeArg::Science)]
        image_type: ImageTypeArg,
        /// Keep the shutter closed.
        #[arg(long)]
        dark: bool,
        /// Quick-look frame: no run number, overwritten in place.
        #[arg(long)]
        glance: bool,
        /// Target name for the headers.
        #[arg(long)]
        target: Option<String>,
        /// Units to expose; all configured units when omitted.
        #[arg(short, long)]
        units: Vec<UnitId>,
    },
    /// Abort the exposure in flight.
    Abort {
        #[arg(short, long)]
        units: Vec<UnitId>,
    },
    /// Set the sensor temperature setpoint.
    Temp {
        target: f64,
        #[arg(short, long)]
        units: Vec<UnitId>,
    },
    /// Set a readout window, or clear it back to full frame.
    Window {
        #[arg(long, requires_all = ["y", "width", "height"])]
        x: Option<u32>,
        #[arg(long)]
        y: Option<u32>,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        /// Clear the window.
        #[arg(long, conflicts_with_all = ["x", "y", "width", "height"])]
        full: bool,
        #[arg(short, long)]
        units: Vec<UnitId>,
    },
    /// Header cards of the most recent frames.
    Headers,
    /// Save one unit's most recent frame as raw 16-bit pixels.
    Image {
        unit: UnitId,
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
}

pub async fn run(ctx: &Context, cmd: CamCmd) -> anyhow::Result<()> {
    match cmd {
        CamCmd::Expose {
            exptime,
            binning,
            image_type,
            dark,
            glance,
            target,
            units,
        } => {
            let request = ExposureRequest {
                units: ctx.units_or_all(units),
                exptime_ms: (exptime * 1000.0).round() as u64,
                binning,
                frame_type: if dark { FrameType::Dark } else { FrameType::Normal },
                image_type: image_type.into(),
                target,
                glance,
                set_num: 1,
                set_pos: 1,
                set_tot: 1,
                pointing_id: None,
            };
            send(ctx, DaemonId::Cam, Request::TakeExposure(request)).await
        }
        CamCmd::Abort { units } => {
            // An empty list aborts whatever is active.
            send(ctx, DaemonId::Cam, Request::AbortExposure { units }).await
        }
        CamCmd::Temp { target, units } => {
            send(
                ctx,
                DaemonId::Cam,
                Request::SetTemperature {
                    units: ctx.units_or_all(units),
                    target,
                },
            )
            .await
        }
        CamCmd::Window {
            x,
            y,
            width,
            height,
            full: _,
            units,
        } => {
            let window = match (x, y, width, height) {
                (Some(x), Some(y), Some(width), Some(height)) => Some(Window {
                    x,
                    y,
                    width,
                    height,
                }),
                _ => None,
            };
            send(
                ctx,
                DaemonId::Cam,
                Request::SetWindow {
                    units: ctx.units_or_all(units),
                    window,
                },
            )
            .await
        }
        CamCmd::Headers => {
            let response = ctx
                .client(DaemonId::Cam)?
                .request(Request::GetLatestHeaders)
                .await?;
            let Response::Headers(headers) = response else {
                anyhow::bail!("camd sent an unexpected response");
            };
            for unit in headers {
                println!("unit {}", unit.unit);
                for (key, value) in unit.cards {
                    println!("  {key:<8} = {value}");
                }
            }
            Ok(())
        }
        CamCmd::Image { unit, output } => {
            let response = ctx
                .client(DaemonId::Cam)?
                .request(Request::GetLatestImage { unit })
                .await?;
            let Response::Image(frame) = response else {
                anyhow::bail!("camd sent an unexpected response");
            };
            let mut bytes = Vec::with_capacity(frame.data.len() * 2);
            for pixel in &frame.data {
                bytes.extend_from_slice(&pixel.to_le_bytes());
            }
            std::fs::write(&output, bytes)
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "unit {}: {}x{} bin {} -> {}",
                frame.unit,
                frame.width,
                frame.height,
                frame.binning,
                output.display()
            );
            Ok(())
        }
    }
}
