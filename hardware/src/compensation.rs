//! Split-ratio compensation during energy scans.
//!
//! When the splitting crystal rotates to follow a new photon energy, its
//! edge moves across the beam. The translation stage is moved by
//! [`delta_position`] to put the edge back, keeping the split ratio fixed.
//!
//! Moves go out with the controller's position resolution
//! ([`POSITION_RESOLUTION`]). A scan is planned against cumulative targets
//! so steps below that resolution still add up instead of being lost.

use optics_math::{compensation_plan, delta_position, RotationCenter};
use tracing::{debug, info};

use crate::aerotech::ascii::POSITION_RESOLUTION;
use crate::aerotech::EnsembleResult;
use crate::StageInterface;

/// Moves below this size encode as zero and are not sent.
const MIN_MOVE: f64 = POSITION_RESOLUTION / 2.0;

/// Outcome of one compensation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compensation {
    /// Relative stage move for the angle change
    pub delta: f64,
    /// Stage position read back after moving; `None` on dry runs and
    /// skipped moves
    pub position_after: Option<f64>,
}

impl Compensation {
    pub fn was_moved(&self) -> bool {
        self.position_after.is_some()
    }
}

/// Compensate the stage for a single crystal angle change.
///
/// Computes the translation, and unless `dry_run` is set or the move is
/// below the stage resolution, issues the relative move and reads the
/// position back.
pub fn compensate<S: StageInterface + ?Sized>(
    stage: &mut S,
    center: &RotationCenter,
    theta_old: f64,
    theta_new: f64,
    dry_run: bool,
) -> EnsembleResult<Compensation> {
    let delta = delta_position(theta_old, theta_new, center);
    info!(
        "{} angle {:.6} -> {:.6} rad: compensating move {:.6}",
        center.optic, theta_old, theta_new, delta
    );
    apply(stage, delta, dry_run)
}

/// Compensate along a whole angle scan, one relative move per step.
///
/// Steps are taken from [`compensation_plan`] at the stage resolution;
/// sub-resolution steps are skipped and carried into later ones. Stops at
/// the first stage error.
pub fn compensate_scan<S: StageInterface + ?Sized>(
    stage: &mut S,
    center: &RotationCenter,
    angles: &[f64],
    dry_run: bool,
) -> EnsembleResult<Vec<Compensation>> {
    let plan = compensation_plan(angles, center, POSITION_RESOLUTION);
    info!(
        "{} scan over {} angles: {:.6} total",
        center.optic,
        angles.len(),
        plan.iter().sum::<f64>()
    );
    plan.into_iter()
        .map(|delta| apply(stage, delta, dry_run))
        .collect()
}

fn apply<S: StageInterface + ?Sized>(
    stage: &mut S,
    delta: f64,
    dry_run: bool,
) -> EnsembleResult<Compensation> {
    let skipped = Compensation {
        delta,
        position_after: None,
    };
    if delta.abs() < MIN_MOVE {
        debug!("Move {delta:e} below stage resolution, not sent");
        return Ok(skipped);
    }
    if dry_run {
        return Ok(skipped);
    }

    stage.move_relative(delta)?;
    let position = stage.get_position()?;
    info!("Stage at {position:.6} after compensation");

    Ok(Compensation {
        delta,
        position_after: Some(position),
    })
}
