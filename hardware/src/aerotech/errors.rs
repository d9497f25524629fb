//! Error types for the Ensemble ASCII command interface.

use std::io;

use thiserror::Error;

use super::ascii::StatusCode;
use super::config::ConfigError;

/// Phase of an exchange in which a transport failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connect,
    Send,
    Receive,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Connect => write!(f, "connect"),
            Phase::Send => write!(f, "send"),
            Phase::Receive => write!(f, "receive"),
        }
    }
}

/// The controller could not be reached or the link failed mid-exchange.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("could not resolve controller address {endpoint}: {source}")]
    Resolve {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to controller at {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out during {phase} with controller at {endpoint}")]
    TimedOut { endpoint: String, phase: Phase },

    #[error("I/O error during {phase} with controller at {endpoint}: {source}")]
    Io {
        endpoint: String,
        phase: Phase,
        #[source]
        source: io::Error,
    },

    #[error("controller at {endpoint} closed the connection without responding")]
    Closed { endpoint: String },
}

impl TransportError {
    /// Classify an I/O error, separating timeouts from other failures.
    pub(crate) fn from_io(endpoint: &str, phase: Phase, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::TimedOut {
                endpoint: endpoint.to_string(),
                phase,
            },
            _ if phase == Phase::Connect => TransportError::Connect {
                endpoint: endpoint.to_string(),
                source,
            },
            _ => TransportError::Io {
                endpoint: endpoint.to_string(),
                phase,
                source,
            },
        }
    }

    /// Returns true if the failure was a connect, send or receive timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::TimedOut { .. })
    }
}

/// The controller answered, but not with an acknowledgement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// NAK: the command was malformed or not accepted.
    #[error("controller rejected command `{command}`: {message}")]
    Rejected { command: String, message: String },

    /// FAULT: the command was accepted but the task faulted.
    #[error("controller task fault on `{command}`: {message}")]
    TaskFault { command: String, message: String },

    /// TIMEOUT: the controller did not complete the command in time.
    #[error("controller timed out executing `{command}`: {message}")]
    TaskTimeout { command: String, message: String },

    #[error("empty response from controller")]
    EmptyResponse,

    #[error("unknown status character {0:?} in response {1:?}")]
    UnknownStatus(char, String),

    #[error("response is not valid UTF-8")]
    InvalidUtf8,
}

impl ProtocolError {
    /// Controller status code behind this error, if it came from one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ProtocolError::Rejected { .. } => Some(StatusCode::Nak),
            ProtocolError::TaskFault { .. } => Some(StatusCode::Fault),
            ProtocolError::TaskTimeout { .. } => Some(StatusCode::Timeout),
            _ => None,
        }
    }
}

/// Errors returned by [`Ensemble`](super::Ensemble) operations.
#[derive(Error, Debug)]
pub enum EnsembleError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Configuration would produce invalid commands or unbounded I/O.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Argument cannot be encoded as a controller command.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Payload of an acknowledged response was not the expected type.
    #[error("could not decode response {payload:?} to `{command}`: {reason}")]
    Decode {
        command: String,
        payload: String,
        reason: String,
    },
}

impl EnsembleError {
    pub fn is_transport(&self) -> bool {
        matches!(self, EnsembleError::Transport(_))
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, EnsembleError::Protocol(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, EnsembleError::Transport(e) if e.is_timeout())
    }

    /// Controller status code, for protocol errors that carry one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            EnsembleError::Protocol(e) => e.status(),
            _ => None,
        }
    }
}

/// Result type for Ensemble operations.
pub type EnsembleResult<T> = Result<T, EnsembleError>;
