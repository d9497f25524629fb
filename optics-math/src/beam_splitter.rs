//! Rotation center and compensating translation for a splitting crystal.
//!
//! The splitting crystal sits on a rotation stage carried by a linear
//! translation stage. Rotating the crystal by θ about a center at `(x, y)`
//! (measured from the tip of the splitting edge) shifts the edge across the
//! beam; the translation stage displacement `d` shifts it back. The split
//! position `s` of the edge observed on the beam is modelled as:
//!
//! ```text
//! T1:  s = d + k + x·cos θ − y·sin θ
//! T6:  s = d + k + x·cos θ + y·sin θ
//! ```
//!
//! where `k` is an unknown constant offset. Subtracting the first of three
//! measurements from the other two eliminates `k` and leaves a 2x2 linear
//! system in `(x, y)`.
//!
//! All angles are in radians.

use std::fmt;

use nalgebra::{Matrix2, Vector2};
use thiserror::Error;

/// Threshold for considering the coefficient determinant as zero
const DETERMINANT_EPSILON: f64 = 1e-10;

/// Error when the three measurements cannot determine a rotation center
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DegenerateInputError {
    /// Coincident (or otherwise dependent) angles give a singular system
    #[error("degenerate configuration: singular coefficient matrix (determinant={determinant:.6e})")]
    SingularMatrix { determinant: f64 },

    /// A measurement contains NaN or infinity
    #[error("degenerate configuration: measurement {index} is not finite")]
    NonFinite { index: usize },
}

/// Which splitting crystal the geometry refers to.
///
/// T6 is mounted mirrored relative to T1, which flips the sign of the
/// `sin θ` term in the edge model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Optic {
    T1,
    T6,
}

impl Optic {
    /// Sign applied to the `y·sin θ` term.
    fn sine_sign(self) -> f64 {
        match self {
            Optic::T1 => -1.0,
            Optic::T6 => 1.0,
        }
    }
}

impl fmt::Display for Optic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Optic::T1 => write!(f, "T1"),
            Optic::T6 => write!(f, "T6"),
        }
    }
}

impl std::str::FromStr for Optic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "t1" => Ok(Optic::T1),
            "t6" => Ok(Optic::T6),
            _ => Err(format!("unknown optic '{s}', expected T1 or T6")),
        }
    }
}

/// One edge scan: where the edge split the beam, at which stage
/// displacement, and at which crystal angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeMeasurement {
    /// Split position of the edge on the beam
    pub split: f64,
    /// Translation stage displacement
    pub displacement: f64,
    /// Crystal angle in radians
    pub angle: f64,
}

impl EdgeMeasurement {
    pub fn new(split: f64, displacement: f64, angle: f64) -> Self {
        Self {
            split,
            displacement,
            angle,
        }
    }

    /// Build a measurement with the angle given in degrees.
    pub fn from_degrees(split: f64, displacement: f64, angle_deg: f64) -> Self {
        Self::new(split, displacement, angle_deg.to_radians())
    }

    fn is_finite(&self) -> bool {
        self.split.is_finite() && self.displacement.is_finite() && self.angle.is_finite()
    }

    /// Left-hand side of the edge model with the displacement removed.
    fn residual(&self) -> f64 {
        self.split - self.displacement
    }
}

/// Solved rotation center of a splitting crystal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationCenter {
    /// Center position along the beam, relative to the edge tip
    pub x: f64,
    /// Center position across the beam, relative to the edge tip
    pub y: f64,
    /// Constant split offset `k` of the edge model
    pub offset: f64,
    /// Optic this center belongs to (selects the sign convention)
    pub optic: Optic,
}

impl RotationCenter {
    pub fn new(x: f64, y: f64, optic: Optic) -> Self {
        Self {
            x,
            y,
            offset: 0.0,
            optic,
        }
    }

    /// Predicted split position for a stage displacement and crystal angle.
    pub fn split_at(&self, displacement: f64, angle: f64) -> f64 {
        displacement
            + self.offset
            + self.x * angle.cos()
            + self.optic.sine_sign() * self.y * angle.sin()
    }
}

/// Solve for the rotation center from three edge measurements.
///
/// # Returns
/// * `Ok(RotationCenter)` - Center relative to the edge tip
/// * `Err(DegenerateInputError)` - If the angles do not determine the system
pub fn rotation_center(
    optic: Optic,
    measurements: [EdgeMeasurement; 3],
) -> Result<RotationCenter, DegenerateInputError> {
    if let Some(index) = measurements.iter().position(|m| !m.is_finite()) {
        return Err(DegenerateInputError::NonFinite { index });
    }

    let [m1, m2, m3] = measurements;
    let sign = optic.sine_sign();

    let coefficients = Matrix2::new(
        m2.angle.cos() - m1.angle.cos(),
        sign * (m2.angle.sin() - m1.angle.sin()),
        m3.angle.cos() - m1.angle.cos(),
        sign * (m3.angle.sin() - m1.angle.sin()),
    );
    let rhs = Vector2::new(m2.residual() - m1.residual(), m3.residual() - m1.residual());

    let determinant = coefficients.determinant();
    if determinant.abs() < DETERMINANT_EPSILON {
        return Err(DegenerateInputError::SingularMatrix { determinant });
    }
    let inverse = coefficients
        .try_inverse()
        .ok_or(DegenerateInputError::SingularMatrix { determinant })?;

    let solution = inverse * rhs;
    let (x, y) = (solution.x, solution.y);
    let offset = m1.residual() - x * m1.angle.cos() - sign * y * m1.angle.sin();

    Ok(RotationCenter {
        x,
        y,
        offset,
        optic,
    })
}

/// Rotation center of T1 from three `(split, displacement, angle)` scans.
#[allow(clippy::too_many_arguments)]
pub fn t1_rotation_center(
    s1: f64,
    d1: f64,
    theta1: f64,
    s2: f64,
    d2: f64,
    theta2: f64,
    s3: f64,
    d3: f64,
    theta3: f64,
) -> Result<RotationCenter, DegenerateInputError> {
    rotation_center(
        Optic::T1,
        [
            EdgeMeasurement::new(s1, d1, theta1),
            EdgeMeasurement::new(s2, d2, theta2),
            EdgeMeasurement::new(s3, d3, theta3),
        ],
    )
}

/// Rotation center of T6 from three `(split, displacement, angle)` scans.
#[allow(clippy::too_many_arguments)]
pub fn t6_rotation_center(
    s1: f64,
    d1: f64,
    theta1: f64,
    s2: f64,
    d2: f64,
    theta2: f64,
    s3: f64,
    d3: f64,
    theta3: f64,
) -> Result<RotationCenter, DegenerateInputError> {
    rotation_center(
        Optic::T6,
        [
            EdgeMeasurement::new(s1, d1, theta1),
            EdgeMeasurement::new(s2, d2, theta2),
            EdgeMeasurement::new(s3, d3, theta3),
        ],
    )
}

/// Stage translation that keeps the split position fixed when the crystal
/// angle changes from `theta_old` to `theta_new`.
///
/// Antisymmetric in the angle order:
/// `delta_position(a, b, c) == -delta_position(b, a, c)`.
pub fn delta_position(theta_old: f64, theta_new: f64, center: &RotationCenter) -> f64 {
    let d_cos = theta_new.cos() - theta_old.cos();
    let d_sin = theta_new.sin() - theta_old.sin();
    -(center.x * d_cos + center.optic.sine_sign() * center.y * d_sin)
}

/// Relative stage moves for each step of an angle scan.
///
/// Each move is the difference between consecutive cumulative targets
/// measured from the first angle and rounded to the stage `resolution`, so
/// rounding never accumulates: the plan sums to the total move rounded to
/// `resolution`. A step smaller than the resolution comes out as exactly
/// zero and its remainder is carried into later steps. A non-positive
/// `resolution` disables rounding.
///
/// Returns one move per consecutive pair of angles; fewer than two angles
/// produce an empty plan.
pub fn compensation_plan(angles: &[f64], center: &RotationCenter, resolution: f64) -> Vec<f64> {
    let Some((&start, rest)) = angles.split_first() else {
        return Vec::new();
    };
    let quantize = |target: f64| {
        if resolution > 0.0 {
            (target / resolution).round() * resolution
        } else {
            target
        }
    };

    let mut reached = 0.0;
    rest.iter()
        .map(|&theta| {
            let target = quantize(delta_position(start, theta, center));
            let step = quantize(target - reached);
            reached = target;
            step
        })
        .collect()
}

/// Compensating moves for T1 and T6 when both crystals follow the same
/// angle change. Returns `(t1_delta, t6_delta)`.
pub fn move_together(
    theta_old: f64,
    theta_new: f64,
    t1: &RotationCenter,
    t6: &RotationCenter,
) -> (f64, f64) {
    (
        delta_position(theta_old, theta_new, t1),
        delta_position(theta_old, theta_new, t6),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn synthetic_scans(center: &RotationCenter) -> [EdgeMeasurement; 3] {
        let poses = [(0.0, 0.2), (0.2, 0.7), (-0.1, 1.2)];
        poses.map(|(d, theta)| EdgeMeasurement::new(center.split_at(d, theta), d, theta))
    }

    #[test]
    fn test_t1_recovers_known_center() {
        let truth = RotationCenter {
            x: 1.5,
            y: -0.7,
            offset: 0.3,
            optic: Optic::T1,
        };
        let center = rotation_center(Optic::T1, synthetic_scans(&truth)).unwrap();

        assert_relative_eq!(center.x, 1.5, epsilon = 1e-9);
        assert_relative_eq!(center.y, -0.7, epsilon = 1e-9);
        assert_relative_eq!(center.offset, 0.3, epsilon = 1e-9);
        assert_eq!(center.optic, Optic::T1);
    }

    #[test]
    fn test_t6_recovers_known_center() {
        let truth = RotationCenter {
            x: -2.25,
            y: 4.0,
            offset: -1.0,
            optic: Optic::T6,
        };
        let center = rotation_center(Optic::T6, synthetic_scans(&truth)).unwrap();

        assert_relative_eq!(center.x, -2.25, epsilon = 1e-9);
        assert_relative_eq!(center.y, 4.0, epsilon = 1e-9);
        assert_eq!(center.optic, Optic::T6);
    }

    #[test]
    fn test_mirrored_optics_flip_y() {
        // Same scans interpreted for the mirrored optic give the mirrored center
        let truth = RotationCenter {
            x: 0.8,
            y: 0.35,
            offset: 0.0,
            optic: Optic::T1,
        };
        let scans = synthetic_scans(&truth);

        let t1 = rotation_center(Optic::T1, scans).unwrap();
        let t6 = rotation_center(Optic::T6, scans).unwrap();

        assert_relative_eq!(t1.x, t6.x, epsilon = 1e-9);
        assert_relative_eq!(t1.y, -t6.y, epsilon = 1e-9);
    }

    #[test]
    fn test_positional_wrappers_match() {
        let truth = RotationCenter::new(1.0, 2.0, Optic::T1);
        let [a, b, c] = synthetic_scans(&truth);

        let center = t1_rotation_center(
            a.split,
            a.displacement,
            a.angle,
            b.split,
            b.displacement,
            b.angle,
            c.split,
            c.displacement,
            c.angle,
        )
        .unwrap();
        assert_relative_eq!(center.x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(center.y, 2.0, epsilon = 1e-9);

        let truth = RotationCenter::new(1.0, 2.0, Optic::T6);
        let [a, b, c] = synthetic_scans(&truth);
        let center = t6_rotation_center(
            a.split,
            a.displacement,
            a.angle,
            b.split,
            b.displacement,
            b.angle,
            c.split,
            c.displacement,
            c.angle,
        )
        .unwrap();
        assert_relative_eq!(center.y, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_identical_angles_are_degenerate() {
        let scans = [
            EdgeMeasurement::new(1.0, 0.0, 0.5),
            EdgeMeasurement::new(1.2, 0.1, 0.5),
            EdgeMeasurement::new(0.9, -0.3, 0.5),
        ];

        for optic in [Optic::T1, Optic::T6] {
            let err = rotation_center(optic, scans).unwrap_err();
            assert!(matches!(err, DegenerateInputError::SingularMatrix { .. }));
        }
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let scans = [
            EdgeMeasurement::new(1.0, 0.0, 0.1),
            EdgeMeasurement::new(f64::NAN, 0.1, 0.5),
            EdgeMeasurement::new(0.9, -0.3, 0.9),
        ];

        let err = rotation_center(Optic::T1, scans).unwrap_err();
        assert_eq!(err, DegenerateInputError::NonFinite { index: 1 });
    }

    #[test]
    fn test_delta_position_antisymmetric() {
        let center = RotationCenter::new(1.3, -0.4, Optic::T1);
        for (a, b) in [(0.1, 0.4), (0.9, 0.2), (-0.3, 1.1)] {
            assert_relative_eq!(
                delta_position(a, b, &center),
                -delta_position(b, a, &center),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_delta_position_keeps_split_fixed() {
        let center = RotationCenter {
            x: 2.0,
            y: 0.5,
            offset: 0.1,
            optic: Optic::T6,
        };
        let (d_old, theta_old, theta_new) = (0.25, 0.3, 0.45);

        let d_new = d_old + delta_position(theta_old, theta_new, &center);

        assert_relative_eq!(
            center.split_at(d_old, theta_old),
            center.split_at(d_new, theta_new),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_delta_position_zero_for_same_angle() {
        let center = RotationCenter::new(3.0, 1.0, Optic::T1);
        assert_eq!(delta_position(0.6, 0.6, &center), 0.0);
    }

    #[test]
    fn test_compensation_plan_sums_to_total_move() {
        let center = RotationCenter::new(1.1, 0.9, Optic::T1);
        let angles = [0.20, 0.25, 0.31, 0.40];

        let plan = compensation_plan(&angles, &center, 0.0);

        assert_eq!(plan.len(), 3);
        assert_relative_eq!(plan[0], delta_position(0.20, 0.25, &center), epsilon = 1e-12);
        let total: f64 = plan.iter().sum();
        assert_relative_eq!(total, delta_position(0.20, 0.40, &center), epsilon = 1e-12);
        assert!(compensation_plan(&[0.2], &center, 1e-6).is_empty());
        assert!(compensation_plan(&[], &center, 1e-6).is_empty());
    }

    #[test]
    fn test_compensation_plan_carries_sub_resolution_steps() {
        let resolution = 1e-6;
        let center = RotationCenter::new(1.0, 1.0, Optic::T1);
        // Every step is about a third of the resolution
        let angles: Vec<f64> = (0..=30).map(|i| i as f64 * 3e-7).collect();

        let plan = compensation_plan(&angles, &center, resolution);

        let total = delta_position(angles[0], angles[30], &center);
        let planned: f64 = plan.iter().sum();
        assert!((planned - total).abs() <= resolution / 2.0 + 1e-15);
        assert!(plan.iter().any(|&step| step == 0.0));
        assert!(plan.iter().any(|&step| step != 0.0));
        for step in &plan {
            let ticks = step / resolution;
            assert_relative_eq!(ticks, ticks.round(), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_move_together_uses_each_convention() {
        let t1 = RotationCenter::new(1.0, 1.0, Optic::T1);
        let t6 = RotationCenter::new(1.0, 1.0, Optic::T6);

        let (d1, d6) = move_together(0.0, 0.5, &t1, &t6);

        // The cosine parts agree; the sine parts have opposite sign
        let cos_part = -(0.5_f64.cos() - 1.0);
        let sin_part = 0.5_f64.sin();
        assert_relative_eq!(d1, cos_part + sin_part, epsilon = 1e-12);
        assert_relative_eq!(d6, cos_part - sin_part, epsilon = 1e-12);
    }

    #[test]
    fn test_optic_from_str() {
        assert_eq!("T1".parse::<Optic>().unwrap(), Optic::T1);
        assert_eq!("t6".parse::<Optic>().unwrap(), Optic::T6);
        let err = "T3".parse::<Optic>().unwrap_err();
        assert!(err.contains("'T3'"), "{err}");
    }
}
