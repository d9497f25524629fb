//! Stage control hardware drivers.
//!
//! - [`aerotech`]: Aerotech Ensemble single-axis stage over the ASCII interface
//! - [`compensation`]: keeps a splitting crystal's split ratio fixed during scans
//! - [`logging`]: process-wide tracing setup for the binaries

pub mod aerotech;
pub mod compensation;
pub mod logging;

use aerotech::EnsembleResult;

/// Common interface for a single-axis positioning stage.
///
/// Implemented by [`aerotech::Ensemble`]; the scan logic only depends on this
/// trait so it can be driven against a simulated stage.
pub trait StageInterface {
    /// Home the axis.
    fn home(&mut self) -> EnsembleResult<()>;

    /// Move to an absolute position.
    fn move_absolute(&mut self, position: f64) -> EnsembleResult<()>;

    /// Move by a relative distance.
    fn move_relative(&mut self, distance: f64) -> EnsembleResult<()>;

    /// Read the current position.
    fn get_position(&mut self) -> EnsembleResult<f64>;
}
