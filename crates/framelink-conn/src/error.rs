use std::path::PathBuf;

use crate::close::{CloseCode, CloseFrame};

/// Errors that can occur on a discrete-message connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the underlying stream.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// A record header did not start with the expected magic bytes.
    #[error("invalid record magic (expected 0x464c \"FL\")")]
    InvalidMagic,

    /// A record carried an opcode this side does not understand.
    #[error("unknown record opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    /// A message exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A close record body could not be parsed.
    #[error("malformed close record: {0}")]
    MalformedClose(&'static str),

    /// The peer sent a close record.
    #[error("peer closed the connection: {0}")]
    Closed(CloseFrame),

    /// This side already sent a close record; no further writes are allowed.
    #[error("close record already sent")]
    CloseSent,

    /// The stream ended without a close record.
    #[error("unexpected EOF (no close record received)")]
    UnexpectedEof,
}

impl ConnError {
    /// Returns true if the peer closed the connection with the given code.
    pub fn is_close_with(&self, code: CloseCode) -> bool {
        matches!(self, ConnError::Closed(frame) if frame.code == code)
    }

    /// Returns true if the peer announced it is going away.
    pub fn is_going_away(&self) -> bool {
        self.is_close_with(CloseCode::GoingAway)
    }

    /// Returns true if a write failed because the peer already shut the
    /// stream down.
    pub fn is_peer_gone(&self) -> bool {
        match self {
            ConnError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            ConnError::UnexpectedEof => true,
            _ => false,
        }
    }

    /// Returns true if the error came from an expired socket timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            ConnError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn going_away_detection() {
        let err = ConnError::Closed(CloseFrame::going_away("bye"));
        assert!(err.is_going_away());
        assert!(!ConnError::Closed(CloseFrame::normal("")).is_going_away());
        assert!(!ConnError::UnexpectedEof.is_going_away());
    }

    #[test]
    fn timeout_detection() {
        let err = ConnError::Io(std::io::Error::from(std::io::ErrorKind::WouldBlock));
        assert!(err.is_timeout());
        let err = ConnError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut));
        assert!(err.is_timeout());
        let err = ConnError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(!err.is_timeout());
    }

    #[test]
    fn peer_gone_detection() {
        for kind in [
            std::io::ErrorKind::BrokenPipe,
            std::io::ErrorKind::ConnectionReset,
        ] {
            assert!(ConnError::Io(std::io::Error::from(kind)).is_peer_gone());
        }
        assert!(ConnError::UnexpectedEof.is_peer_gone());
        assert!(!ConnError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)).is_peer_gone());
        assert!(!ConnError::CloseSent.is_peer_gone());
    }

    #[test]
    fn closed_display_includes_code_and_reason() {
        let err = ConnError::Closed(CloseFrame::going_away("bye"));
        assert_eq!(
            err.to_string(),
            "peer closed the connection: 1001 (going away): bye"
        );
    }
}
