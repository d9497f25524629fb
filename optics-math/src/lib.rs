//! optics-math - Closed-form geometry for beam-splitting crystal optics
//!
//! This crate provides the small numeric helpers used while scanning the
//! photon energy of a split-beam setup:
//!
//! - **Rotation center** - locate the axis a splitting crystal rotates about,
//!   relative to the tip of its splitting edge, from three edge scans
//! - **Compensating translation** - the stage move that keeps the split ratio
//!   constant when the crystal angle changes
//!
//! Two optics are supported, T1 and T6, which are mounted mirrored with
//! respect to each other and so use opposite sign conventions.
//!
//! # Example
//!
//! ```
//! use optics_math::{delta_position, rotation_center, EdgeMeasurement, Optic};
//!
//! let scans = [
//!     EdgeMeasurement::new(1.740, 0.00, 0.20),
//!     EdgeMeasurement::new(1.765, 0.20, 0.70),
//!     EdgeMeasurement::new(0.996, -0.10, 1.20),
//! ];
//! let center = rotation_center(Optic::T1, scans).unwrap();
//! let dx = delta_position(0.70, 0.75, &center);
//! assert!(dx.is_finite());
//! ```

pub mod beam_splitter;

pub use beam_splitter::{
    compensation_plan, delta_position, move_together, rotation_center, t1_rotation_center,
    t6_rotation_center, DegenerateInputError, EdgeMeasurement, Optic, RotationCenter,
};
