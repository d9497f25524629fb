//! Aerotech Ensemble motion controller driver
//!
//! This module drives a single-axis Aerotech Ensemble stage through the
//! controller's ASCII command interface over TCP.
//!
//! # Overview
//!
//! - **Motion**: [`home`](Ensemble::home), [`move_absolute`](Ensemble::move_absolute),
//!   [`move_relative`](Ensemble::move_relative)
//! - **Feedback**: [`get_position`](Ensemble::get_position)
//! - **Raw commands**: [`run`](Ensemble::run), or [`connect`](Ensemble::connect) for
//!   several commands on one connection
//!
//! # Connection
//!
//! The controller's network stack does not survive idle periods reliably, so
//! each operation reconnects, exchanges a single command and disconnects.
//! Connect, send and receive are all bounded by the timeouts in
//! [`EnsembleConfig`].
//!
//! # Errors
//!
//! Every failure is returned to the caller as an [`EnsembleError`]:
//!
//! - [`TransportError`]: the controller is unreachable, the link dropped, or a
//!   socket operation timed out
//! - [`ProtocolError`]: the controller answered NAK (`!`), FAULT (`#`) or
//!   TIMEOUT (`$`) instead of ACK (`%`)
//! - [`EnsembleError::Decode`]: an ACK payload was not the expected type
//! - [`EnsembleError::Config`]: the configuration failed validation, checked
//!   before every connection attempt
//!
//! Non-ACK responses are also logged at error level. They are never retried.

pub mod ascii;
mod config;
mod ensemble;
mod errors;

pub use ascii::{Response, StatusCode};
pub use config::{
    ConfigError, EnsembleArgs, EnsembleConfig, DEFAULT_FEED_RATE, DEFAULT_PORT, DEFAULT_STAGE_IP,
};
pub use ensemble::{Connection, Ensemble};
pub use errors::{EnsembleError, EnsembleResult, Phase, ProtocolError, TransportError};
