//! Ensemble ASCII command interface codec.
//!
//! Requests are a keyword and space-separated arguments terminated by a
//! single newline. Every response line starts with a one-character status
//! code followed by the payload:
//!
//! ```text
//! -> MOVEABS X12.500000 XF10.0\n
//! <- %\n
//! -> PFBK X\n
//! <- %12.500000\n
//! ```

use std::fmt;

use super::errors::ProtocolError;

/// End of string character terminating every request and response.
pub const EOS_CHAR: char = '\n';
/// Command succeeded.
pub const ACK_CHAR: char = '%';
/// Command malformed or rejected.
pub const NAK_CHAR: char = '!';
/// Command accepted but the task faulted.
pub const FAULT_CHAR: char = '#';
/// Command did not complete in time.
pub const TIMEOUT_CHAR: char = '$';

/// Maximum number of response bytes read for one command.
pub const RESPONSE_BUFFER_SIZE: usize = 4096;

/// Smallest position step the `{:.6}` encoding can express.
pub const POSITION_RESOLUTION: f64 = 1e-6;

/// Smallest feed rate step the `{:.1}` encoding can express.
pub const FEED_RATE_RESOLUTION: f64 = 0.1;

/// The only axis wired to this controller.
pub const AXIS: &str = "X";

/// Status prefix of a controller response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ack,
    Nak,
    Fault,
    Timeout,
}

impl StatusCode {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            ACK_CHAR => Some(StatusCode::Ack),
            NAK_CHAR => Some(StatusCode::Nak),
            FAULT_CHAR => Some(StatusCode::Fault),
            TIMEOUT_CHAR => Some(StatusCode::Timeout),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            StatusCode::Ack => ACK_CHAR,
            StatusCode::Nak => NAK_CHAR,
            StatusCode::Fault => FAULT_CHAR,
            StatusCode::Timeout => TIMEOUT_CHAR,
        }
    }

    pub fn is_ack(self) -> bool {
        self == StatusCode::Ack
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Ack => "ACK",
            StatusCode::Nak => "NAK",
            StatusCode::Fault => "FAULT",
            StatusCode::Timeout => "TIMEOUT",
        };
        write!(f, "{name} ({})", self.as_char())
    }
}

/// A decoded response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub payload: String,
}

impl Response {
    /// Convert to the payload on ACK, or the matching protocol error.
    pub fn into_result(self, command: &str) -> Result<String, ProtocolError> {
        let command = command.trim_end().to_string();
        match self.status {
            StatusCode::Ack => Ok(self.payload),
            StatusCode::Nak => Err(ProtocolError::Rejected {
                command,
                message: self.payload,
            }),
            StatusCode::Fault => Err(ProtocolError::TaskFault {
                command,
                message: self.payload,
            }),
            StatusCode::Timeout => Err(ProtocolError::TaskTimeout {
                command,
                message: self.payload,
            }),
        }
    }
}

/// Terminate a command with exactly one end of string character.
///
/// Any trailing line terminators already present are collapsed, so
/// `"HOME X"`, `"HOME X\n"` and `"HOME X\r\n"` all encode to `"HOME X\n"`.
pub fn encode_command(command: &str) -> String {
    let body = command.trim_end_matches(|c: char| c == '\r' || c == EOS_CHAR);
    let mut line = String::with_capacity(body.len() + 1);
    line.push_str(body);
    line.push(EOS_CHAR);
    line
}

/// Decode raw response bytes into status code and payload.
///
/// Surrounding whitespace (including the terminating newline) is stripped
/// before the first character is taken as the status code.
pub fn parse_response(raw: &[u8]) -> Result<Response, ProtocolError> {
    let text = std::str::from_utf8(raw).map_err(|_| ProtocolError::InvalidUtf8)?;
    let line = text.trim();

    let mut chars = line.chars();
    let code = chars.next().ok_or(ProtocolError::EmptyResponse)?;
    let status = StatusCode::from_char(code)
        .ok_or_else(|| ProtocolError::UnknownStatus(code, line.to_string()))?;

    Ok(Response {
        status,
        payload: chars.as_str().to_string(),
    })
}

/// `HOME X`
pub fn home_command() -> String {
    format!("HOME {AXIS}")
}

/// `MOVEABS X<position> XF<feed_rate>`
pub fn move_absolute_command(position: f64, feed_rate: f64) -> String {
    format!("MOVEABS {AXIS}{position:.6} {AXIS}F{feed_rate:.1}")
}

/// `MOVEINC X<distance> XF<feed_rate>`
pub fn move_relative_command(distance: f64, feed_rate: f64) -> String {
    format!("MOVEINC {AXIS}{distance:.6} {AXIS}F{feed_rate:.1}")
}

/// `PFBK X` (position feedback query)
pub fn position_feedback_command() -> String {
    format!("PFBK {AXIS}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_appends_single_newline() {
        assert_eq!(encode_command("HOME X"), "HOME X\n");
        assert_eq!(encode_command("HOME X\n"), "HOME X\n");
        assert_eq!(encode_command("HOME X\r\n"), "HOME X\n");
        assert_eq!(encode_command("HOME X\n\n"), "HOME X\n");
    }

    #[test]
    fn test_encoded_commands_end_with_one_terminator() {
        for cmd in ["PFBK X", "PFBK X\n", "", "\n", "MOVEINC X1.0 XF10.0"] {
            let line = encode_command(cmd);
            assert!(line.ends_with(EOS_CHAR));
            assert!(!line[..line.len() - 1].ends_with(EOS_CHAR), "{line:?}");
        }
    }

    #[test]
    fn test_move_command_formatting() {
        assert_eq!(move_absolute_command(0.0, 10.0), "MOVEABS X0.000000 XF10.0");
        assert_eq!(
            move_absolute_command(-3.25, 10.0),
            "MOVEABS X-3.250000 XF10.0"
        );
        assert_eq!(
            move_absolute_command(0.1234567, 10.0),
            "MOVEABS X0.123457 XF10.0"
        );
        assert_eq!(move_relative_command(0.0, 10.0), "MOVEINC X0.000000 XF10.0");
        assert_eq!(
            move_relative_command(-0.005, 10.0),
            "MOVEINC X-0.005000 XF10.0"
        );
        assert_eq!(
            move_relative_command(12.5, 2.5),
            "MOVEINC X12.500000 XF2.5"
        );
    }

    #[test]
    fn test_fixed_commands() {
        assert_eq!(home_command(), "HOME X");
        assert_eq!(position_feedback_command(), "PFBK X");
    }

    #[test]
    fn test_parse_ack_with_payload() {
        let response = parse_response(b"%12.345\n").unwrap();
        assert_eq!(response.status, StatusCode::Ack);
        assert_eq!(response.payload, "12.345");
    }

    #[test]
    fn test_parse_strips_whitespace() {
        let response = parse_response(b"  %\r\n").unwrap();
        assert_eq!(response.status, StatusCode::Ack);
        assert_eq!(response.payload, "");
    }

    #[test]
    fn test_parse_each_status() {
        for (raw, status) in [
            (&b"%ok"[..], StatusCode::Ack),
            (&b"!bad command"[..], StatusCode::Nak),
            (&b"#fault"[..], StatusCode::Fault),
            (&b"$late"[..], StatusCode::Timeout),
        ] {
            assert_eq!(parse_response(raw).unwrap().status, status);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_response(b"\n"), Err(ProtocolError::EmptyResponse));
        assert_eq!(parse_response(&[0xff, 0xfe]), Err(ProtocolError::InvalidUtf8));
        assert!(matches!(
            parse_response(b"?what"),
            Err(ProtocolError::UnknownStatus('?', _))
        ));
    }

    #[test]
    fn test_into_result_maps_status() {
        let ok = parse_response(b"%1.0").unwrap().into_result("PFBK X\n");
        assert_eq!(ok, Ok("1.0".to_string()));

        let err = parse_response(b"!bad command")
            .unwrap()
            .into_result("FOO X\n")
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::Rejected {
                command: "FOO X".into(),
                message: "bad command".into(),
            }
        );

        let err = parse_response(b"#axis fault").unwrap().into_result("HOME X");
        assert!(matches!(err, Err(ProtocolError::TaskFault { .. })));

        let err = parse_response(b"$").unwrap().into_result("HOME X");
        assert!(matches!(err, Err(ProtocolError::TaskTimeout { .. })));
    }

    #[test]
    fn test_status_round_trip_chars() {
        for status in [
            StatusCode::Ack,
            StatusCode::Nak,
            StatusCode::Fault,
            StatusCode::Timeout,
        ] {
            assert_eq!(StatusCode::from_char(status.as_char()), Some(status));
        }
        assert_eq!(StatusCode::from_char('x'), None);
    }
}
