//! Reconnect-per-command client for the Ensemble controller.
//!
//! The controller's network stack drops idle connections unreliably, so
//! every semantic operation opens a fresh TCP connection, performs exactly
//! one request/response exchange and closes it again. The connection is a
//! scoped [`Connection`] value and is released by `Drop` on every exit
//! path, including failed sends and protocol errors.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};

use tracing::{debug, error, info};

use super::ascii::{
    encode_command, home_command, move_absolute_command, move_relative_command,
    parse_response, position_feedback_command, EOS_CHAR, RESPONSE_BUFFER_SIZE,
};
use super::config::EnsembleConfig;
use super::errors::{EnsembleError, EnsembleResult, Phase, TransportError};

/// Client for a single-axis Aerotech Ensemble stage.
///
/// Holds only the endpoint configuration; no socket is kept between calls.
#[derive(Debug, Clone)]
pub struct Ensemble {
    config: EnsembleConfig,
}

impl Ensemble {
    /// Create a client. Does not connect until an operation is invoked.
    ///
    /// The configuration is validated before every connection attempt, so an
    /// invalid one fails each operation with [`EnsembleError::Config`].
    pub fn new(config: EnsembleConfig) -> Self {
        info!("Ensemble instantiated for {}", config.endpoint());
        Self { config }
    }

    /// Create a client for `host:port` with default timeouts and feed rate.
    pub fn from_endpoint(host: &str, port: u16) -> Self {
        Self::new(EnsembleConfig::new(host, port))
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    pub fn endpoint(&self) -> String {
        self.config.endpoint()
    }

    /// Open a connection for explicit lifetime control.
    ///
    /// The semantic operations below manage their own connections; use this
    /// only when several raw commands must share one link. The connection
    /// closes when [`Connection::close`] is called or it goes out of scope.
    pub fn connect(&self) -> EnsembleResult<Connection> {
        Connection::open(&self.config)
    }

    /// Send one command on a fresh connection and return the ACK payload.
    pub fn run(&self, command: &str) -> EnsembleResult<String> {
        let mut connection = self.connect()?;
        connection.run(command)
    }

    /// Home the X axis.
    pub fn home(&self) -> EnsembleResult<()> {
        self.run(&home_command())?;
        info!("Homed");
        Ok(())
    }

    /// Move the X axis to an absolute position.
    pub fn move_absolute(&self, position: f64) -> EnsembleResult<()> {
        let command = move_absolute_command(check_finite("position", position)?, self.feed_rate());
        self.run(&command)?;
        info!("Command written: {command}");
        Ok(())
    }

    /// Move the X axis by a relative distance.
    pub fn move_relative(&self, distance: f64) -> EnsembleResult<()> {
        let command = move_relative_command(check_finite("distance", distance)?, self.feed_rate());
        self.run(&command)?;
        info!("Command written: {command}");
        Ok(())
    }

    /// Read the X axis position feedback.
    pub fn get_position(&self) -> EnsembleResult<f64> {
        let command = position_feedback_command();
        let payload = self.run(&command)?;
        parse_position(&command, &payload)
    }

    fn feed_rate(&self) -> f64 {
        self.config.feed_rate
    }
}

impl crate::StageInterface for Ensemble {
    fn home(&mut self) -> EnsembleResult<()> {
        Ensemble::home(self)
    }

    fn move_absolute(&mut self, position: f64) -> EnsembleResult<()> {
        Ensemble::move_absolute(self, position)
    }

    fn move_relative(&mut self, distance: f64) -> EnsembleResult<()> {
        Ensemble::move_relative(self, distance)
    }

    fn get_position(&mut self) -> EnsembleResult<f64> {
        Ensemble::get_position(self)
    }
}

fn check_finite(name: &str, value: f64) -> EnsembleResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EnsembleError::InvalidArgument(format!(
            "{name} must be finite, got {value}"
        )))
    }
}

/// Parse a position feedback payload. NaN and infinities are rejected.
fn parse_position(command: &str, payload: &str) -> EnsembleResult<f64> {
    let decode_error = |reason: String| EnsembleError::Decode {
        command: command.to_string(),
        payload: payload.to_string(),
        reason,
    };

    let value: f64 = payload
        .trim()
        .parse()
        .map_err(|e: std::num::ParseFloatError| decode_error(e.to_string()))?;
    if !value.is_finite() {
        return Err(decode_error("position is not finite".to_string()));
    }
    Ok(value)
}

/// One open TCP connection to the controller.
///
/// Closed on drop; shutdown errors are ignored since the peer may already
/// have gone away.
pub struct Connection {
    stream: TcpStream,
    endpoint: String,
    /// Bytes received past the end of the last response line
    pending: Vec<u8>,
}

impl Connection {
    fn open(config: &EnsembleConfig) -> EnsembleResult<Self> {
        let endpoint = config.endpoint();

        config.validate().map_err(|e| {
            error!("Refusing to connect to {endpoint}: {e}");
            e
        })?;

        let addrs: Vec<SocketAddr> = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|source| {
                error!("Unable to resolve {endpoint}: {source}");
                TransportError::Resolve {
                    endpoint: endpoint.clone(),
                    source,
                }
            })?
            .collect();

        let stream = Self::connect_any(&addrs, config).map_err(|source| {
            let err = TransportError::from_io(&endpoint, Phase::Connect, source);
            error!("Unable to connect: {err}");
            err
        })?;

        let io_timeout = Some(config.io_timeout());
        stream
            .set_read_timeout(io_timeout)
            .and_then(|_| stream.set_write_timeout(io_timeout))
            .and_then(|_| stream.set_nodelay(true))
            .map_err(|source| TransportError::from_io(&endpoint, Phase::Connect, source))?;

        info!("Connected to {endpoint}");
        Ok(Self {
            stream,
            endpoint,
            pending: Vec::new(),
        })
    }

    /// Try each resolved address in turn, returning the last error.
    fn connect_any(addrs: &[SocketAddr], config: &EnsembleConfig) -> io::Result<TcpStream> {
        let mut last_error = io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "host resolved to no addresses",
        );
        for addr in addrs {
            match TcpStream::connect_timeout(addr, config.connect_timeout()) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!("Connect to {addr} failed: {e}");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one command and return the ACK payload.
    ///
    /// Non-ACK responses are logged and returned as protocol errors. Replies
    /// are matched to commands in order: extra lines that arrive with one
    /// response are kept and answer the next command.
    pub fn run(&mut self, command: &str) -> EnsembleResult<String> {
        let line = encode_command(command);

        self.stream
            .write_all(line.as_bytes())
            .and_then(|_| self.stream.flush())
            .map_err(|e| TransportError::from_io(&self.endpoint, Phase::Send, e))?;
        debug!("-> {}", line.trim_end());

        let raw = self.read_response()?;
        let response = parse_response(&raw).map_err(|e| {
            error!("Error from {}: {e}", self.endpoint);
            e
        })?;
        debug!("<- {}{}", response.status.as_char(), response.payload);

        response.into_result(&line).map_err(|e| {
            error!("Error from {}: {e}", self.endpoint);
            e.into()
        })
    }

    /// Read one response line, at most [`RESPONSE_BUFFER_SIZE`] bytes.
    ///
    /// Anything after the first newline stays in `pending` for the next call.
    fn read_response(&mut self) -> EnsembleResult<Vec<u8>> {
        let mut chunk = [0u8; RESPONSE_BUFFER_SIZE];

        loop {
            if let Some(end) = self.pending.iter().position(|&b| b == EOS_CHAR as u8) {
                let rest = self.pending.split_off(end + 1);
                return Ok(std::mem::replace(&mut self.pending, rest));
            }
            if self.pending.len() >= RESPONSE_BUFFER_SIZE {
                break;
            }

            let room = RESPONSE_BUFFER_SIZE - self.pending.len();
            let n = match self.stream.read(&mut chunk[..room]) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(TransportError::from_io(&self.endpoint, Phase::Receive, e).into())
                }
            };
            if n == 0 {
                break;
            }
            self.pending.extend_from_slice(&chunk[..n]);
        }

        if self.pending.is_empty() {
            return Err(TransportError::Closed {
                endpoint: self.endpoint.clone(),
            }
            .into());
        }
        Ok(std::mem::take(&mut self.pending))
    }

    /// Close the connection.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
        info!("Connection to {} closed", self.endpoint);
    }
}
