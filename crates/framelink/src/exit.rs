use std::fmt;
use std::io;

use framelink_conn::ConnError;
use framelink_frame::FrameError;
use framelink_transport::{ConnectionErrorKind, TransportError};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

/// A failed command: what to print and which code to exit with.
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
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliError {}

fn io_code(kind: io::ErrorKind) -> i32 {
    match kind {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    }
}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(io_code(err.kind()), format!("{context}: {err}"))
}

pub fn conn_error(context: &str, err: ConnError) -> CliError {
    let code = match &err {
        ConnError::Bind { source, .. }
        | ConnError::Connect { source, .. }
        | ConnError::Accept(source)
        | ConnError::Io(source) => io_code(source.kind()),
        ConnError::PathTooLong { .. } => USAGE,
        ConnError::MessageTooLarge { .. } => DATA_INVALID,
        ConnError::Closed(_) | ConnError::CloseSent | ConnError::UnexpectedEof => FAILURE,
        ConnError::InvalidMagic | ConnError::UnknownOpcode(_) | ConnError::MalformedClose(_) => {
            TRANSPORT_ERROR
        }
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    let code = match err {
        FrameError::SeparatorInTypeTag(_) => USAGE,
        FrameError::Malformed | FrameError::NonUtf8TypeTag(_) => DATA_INVALID,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Frame(err) => frame_error(context, err),
        TransportError::Closed(err) => CliError::new(FAILURE, format!("{context}: {err}")),
        TransportError::Connection(err) => {
            let code = match err.kind {
                ConnectionErrorKind::DeadlineExceeded => TIMEOUT,
                ConnectionErrorKind::Cancelled => FAILURE,
                ConnectionErrorKind::Io
                | ConnectionErrorKind::Protocol
                | ConnectionErrorKind::PeerClosed => TRANSPORT_ERROR,
            };
            CliError::new(code, format!("{context}: {err}"))
        }
    }
}
