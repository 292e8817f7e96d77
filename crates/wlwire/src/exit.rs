use std::fmt;
use std::io;

use wlwire_frame::{CodecError, FrameError, SignatureError};
use wlwire_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::Receive {
            recv: Some(source),
            ancillary: None,
        } => io_error(context, source),
        TransportError::PathTooLong { .. } => CliError::usage(format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::Transport(err) => transport_error(context, err),
        FrameError::Codec(err) => codec_error(context, err),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        FrameError::Truncated { .. }
        | FrameError::InvalidSize { .. }
        | FrameError::MessageTooLarge { .. }
        | FrameError::Control(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
    }
}

pub fn codec_error(context: &str, err: CodecError) -> CliError {
    if err.is_type_contract() {
        return CliError::new(INTERNAL, format!("{context}: {err}"));
    }
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn signature_error(err: SignatureError) -> CliError {
    CliError::usage(format!("invalid signature: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_refused_is_plain_failure() {
        let err = transport_error(
            "connect failed",
            TransportError::Connect {
                path: "/tmp/missing.sock".into(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            },
        );
        assert_eq!(err.code, FAILURE);
        assert!(err.message.starts_with("connect failed: "));
    }

    #[test]
    fn malformed_input_is_data_invalid() {
        let err = frame_error("decode failed", FrameError::InvalidSize { size: 4 });
        assert_eq!(err.code, DATA_INVALID);

        let err = frame_error(
            "decode failed",
            FrameError::Codec(CodecError::MalformedString),
        );
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn type_contract_is_internal() {
        let err = codec_error(
            "encode failed",
            CodecError::TypeContract {
                expected: "int".into(),
                found: "string".into(),
            },
        );
        assert_eq!(err.code, INTERNAL);
    }

    #[test]
    fn receive_timeout_maps_to_timeout() {
        let err = frame_error(
            "receive failed",
            FrameError::Io(io::Error::from(io::ErrorKind::WouldBlock)),
        );
        assert_eq!(err.code, TIMEOUT);
    }
}
