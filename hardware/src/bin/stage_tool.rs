//! Command-line tool for the Aerotech Ensemble split-beam stage.
//!
//! Subcommands:
//! - `home`: Home the X axis
//! - `move`: Move to an absolute position or by a relative distance
//! - `position`: Read the X position feedback
//! - `raw`: Send a raw ASCII command and print the ACK payload
//! - `center`: Solve a crystal rotation center from three edge scans
//! - `compensate`: Move the stage to follow a crystal angle change

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hardware::aerotech::{Ensemble, EnsembleArgs};
use hardware::compensation::compensate_scan;
use hardware::logging::{init_tracing, LogArgs};
use optics_math::{rotation_center, EdgeMeasurement, Optic, RotationCenter};
use tracing::info;

/// Parse an edge scan given as `split,displacement,angle`.
fn parse_measurement(s: &str) -> Result<(f64, f64, f64), String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid number in '{s}': {e}"))?;
    match values.as_slice() {
        [split, displacement, angle] => Ok((*split, *displacement, *angle)),
        _ => Err(format!(
            "expected split,displacement,angle but got {} values",
            values.len()
        )),
    }
}

/// Aerotech Ensemble stage control tool
#[derive(Parser, Debug)]
#[command(name = "stage_tool")]
#[command(about = "Control tool for the Aerotech Ensemble split-beam stage")]
#[command(version)]
struct Args {
    #[command(flatten)]
    stage: EnsembleArgs,

    #[command(flatten)]
    log: LogArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Home the X axis
    Home,

    /// Move the X axis
    Move {
        /// Absolute position to move to
        #[arg(short, long, conflicts_with = "relative", allow_negative_numbers = true)]
        position: Option<f64>,

        /// Relative distance to move
        #[arg(short, long, allow_negative_numbers = true)]
        relative: Option<f64>,
    },

    /// Read the current X position
    Position,

    /// Send a raw ASCII command (e.g. "PFBK X")
    Raw {
        /// Command text; the newline terminator is added automatically
        command: String,
    },

    /// Solve the rotation center of a splitting crystal from three edge scans
    Center {
        /// Which optic the scans belong to (T1 or T6)
        #[arg(long)]
        optic: Optic,

        /// Edge scan as split,displacement,angle (give exactly three)
        #[arg(short, long = "measurement", value_parser = parse_measurement, allow_hyphen_values = true)]
        measurements: Vec<(f64, f64, f64)>,

        /// Angles are in degrees instead of radians
        #[arg(long)]
        degrees: bool,
    },

    /// Move the stage to follow a crystal angle change
    Compensate {
        /// Which optic the rotation center belongs to (T1 or T6)
        #[arg(long)]
        optic: Optic,

        /// Rotation center x relative to the edge tip
        #[arg(long, allow_negative_numbers = true)]
        center_x: f64,

        /// Rotation center y relative to the edge tip
        #[arg(long, allow_negative_numbers = true)]
        center_y: f64,

        /// Crystal angles of the scan, in order (at least two)
        #[arg(long, num_args = 2.., required = true, allow_negative_numbers = true)]
        angles: Vec<f64>,

        /// Angles are in degrees instead of radians
        #[arg(long)]
        degrees: bool,

        /// Compute and log the moves without sending them
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = init_tracing(&args.log.to_config())? {
        eprintln!("Logging to {}", path.display());
    }

    match args.command {
        Command::Center {
            optic,
            measurements,
            degrees,
        } => cmd_center(optic, &measurements, degrees),
        command => {
            let config = args
                .stage
                .to_config()
                .context("Invalid stage configuration")?;
            let stage = Ensemble::new(config);
            run_stage_command(stage, command)
        }
    }
}

fn run_stage_command(stage: Ensemble, command: Command) -> Result<()> {
    match command {
        Command::Home => {
            stage.home()?;
            println!("Homed");
        }
        Command::Move { position, relative } => match (position, relative) {
            (Some(position), None) => {
                stage.move_absolute(position)?;
                println!("Moved to {position:.6}");
            }
            (None, Some(distance)) => {
                stage.move_relative(distance)?;
                println!("Moved by {distance:.6}");
            }
            _ => bail!("Specify exactly one of --position or --relative"),
        },
        Command::Position => {
            let position = stage.get_position()?;
            println!("{position:.6}");
        }
        Command::Raw { command } => {
            let payload = stage.run(&command)?;
            println!("{payload}");
        }
        Command::Compensate {
            optic,
            center_x,
            center_y,
            angles,
            degrees,
            dry_run,
        } => cmd_compensate(
            stage,
            RotationCenter::new(center_x, center_y, optic),
            &angles,
            degrees,
            dry_run,
        )?,
        Command::Center {
            optic,
            measurements,
            degrees,
        } => cmd_center(optic, &measurements, degrees)?,
    }
    Ok(())
}

fn cmd_center(optic: Optic, measurements: &[(f64, f64, f64)], degrees: bool) -> Result<()> {
    let scans: [EdgeMeasurement; 3] = match measurements {
        [a, b, c] => [a, b, c].map(|&(split, displacement, angle)| {
            if degrees {
                EdgeMeasurement::from_degrees(split, displacement, angle)
            } else {
                EdgeMeasurement::new(split, displacement, angle)
            }
        }),
        _ => bail!(
            "Exactly three --measurement values are required, got {}",
            measurements.len()
        ),
    };

    let center = rotation_center(optic, scans)?;
    info!(
        "{optic} rotation center: x={:.6} y={:.6} offset={:.6}",
        center.x, center.y, center.offset
    );
    println!("x={:.9} y={:.9} offset={:.9}", center.x, center.y, center.offset);
    Ok(())
}

fn cmd_compensate(
    mut stage: Ensemble,
    center: RotationCenter,
    angles: &[f64],
    degrees: bool,
    dry_run: bool,
) -> Result<()> {
    let angles: Vec<f64> = if degrees {
        angles.iter().map(|a| a.to_radians()).collect()
    } else {
        angles.to_vec()
    };

    let steps = compensate_scan(&mut stage, &center, &angles, dry_run)?;
    for (i, step) in steps.iter().enumerate() {
        match step.position_after {
            Some(position) => println!(
                "step {}: moved {:.6}, now at {:.6}",
                i + 1,
                step.delta,
                position
            ),
            None => println!("step {}: move {:.6} (not sent)", i + 1, step.delta),
        }
    }
    Ok(())
}
