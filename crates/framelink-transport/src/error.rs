use framelink_conn::{CloseCode, ConnError};
use framelink_frame::FrameError;

/// The operation failed because the peer or the local side shut the
/// connection down gracefully.
///
/// Only a new transport on a new connection can recover from this.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("connection closed: {message}")]
pub struct ClosedError {
    pub message: String,
}

impl ClosedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Broad cause of a [`ConnectionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Socket-level failure: reset, broken pipe, EOF without close record.
    Io,
    /// The peer violated the record protocol or exceeded size limits.
    Protocol,
    /// The peer closed with a code other than "going away".
    PeerClosed,
    /// The call's deadline expired; the connection was torn down.
    DeadlineExceeded,
    /// The call was cancelled.
    Cancelled,
}

/// Any failure of the underlying connection other than a graceful close.
///
/// The transport never retries; what to do next is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("connection error: {message}")]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
}

impl ConnectionError {
    pub fn new(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn deadline_exceeded() -> Self {
        Self::new(ConnectionErrorKind::DeadlineExceeded, "deadline exceeded")
    }

    pub fn cancelled() -> Self {
        Self::new(ConnectionErrorKind::Cancelled, "operation cancelled")
    }
}

/// Errors returned by transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Closed(#[from] ClosedError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// A single message could not be encoded or decoded. The connection is unaffected.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

impl TransportError {
    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::Closed(_))
    }

    /// The connection error kind, if this is a connection error.
    pub fn connection_kind(&self) -> Option<ConnectionErrorKind> {
        match self {
            TransportError::Connection(err) => Some(err.kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Sort a connection-layer failure into the transport's two-kind taxonomy,
/// looking only at the failure itself.
pub(crate) fn classify_fault(err: ConnError) -> TransportError {
    let kind = match &err {
        ConnError::Closed(frame) if frame.code == CloseCode::GoingAway => {
            return ClosedError::new(err.to_string()).into();
        }
        ConnError::CloseSent => return ClosedError::new(err.to_string()).into(),
        ConnError::Closed(_) => ConnectionErrorKind::PeerClosed,
        ConnError::InvalidMagic
        | ConnError::UnknownOpcode(_)
        | ConnError::MalformedClose(_)
        | ConnError::MessageTooLarge { .. } => ConnectionErrorKind::Protocol,
        _ => ConnectionErrorKind::Io,
    };
    ConnectionError::new(kind, err.to_string()).into()
}

#[cfg(test)]
mod tests {
    use framelink_conn::CloseFrame;

    use super::*;

    #[test]
    fn going_away_is_closed() {
        let err = classify_fault(ConnError::Closed(CloseFrame::going_away("bye")));
        assert!(err.is_closed());
        assert_eq!(
            err.to_string(),
            "connection closed: peer closed the connection: 1001 (going away): bye"
        );
    }

    #[test]
    fn local_close_is_closed() {
        assert!(classify_fault(ConnError::CloseSent).is_closed());
    }

    #[test]
    fn other_close_codes_are_connection_errors() {
        let err = classify_fault(ConnError::Closed(CloseFrame::new(CloseCode::Policy, "")));
        assert_eq!(err.connection_kind(), Some(ConnectionErrorKind::PeerClosed));
    }

    #[test]
    fn io_faults_are_connection_errors() {
        let err = classify_fault(ConnError::Io(std::io::Error::from(
            std::io::ErrorKind::ConnectionReset,
        )));
        assert_eq!(err.connection_kind(), Some(ConnectionErrorKind::Io));
        assert!(err.to_string().starts_with("connection error: "));

        let err = classify_fault(ConnError::UnexpectedEof);
        assert_eq!(err.connection_kind(), Some(ConnectionErrorKind::Io));
    }

    #[test]
    fn protocol_faults_are_connection_errors() {
        let err = classify_fault(ConnError::MessageTooLarge { size: 10, max: 1 });
        assert_eq!(err.connection_kind(), Some(ConnectionErrorKind::Protocol));
    }
}
