use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use framelink_conn::ConnError;

use crate::error::{classify_fault, ClosedError, ConnectionError, ConnectionErrorKind, TransportError};

/// Observable transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Sends and receives go to the connection.
    Open,
    /// `close()` was called; the close record is being sent.
    Closing,
    /// The connection has been torn down.
    Closed,
}

/// Why the connection was torn down. The first cause recorded wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Teardown {
    /// Graceful close or explicit termination.
    Closed,
    /// Forced once the stream could no longer be kept in sync.
    Aborted(ConnectionErrorKind),
}

/// Close and teardown bookkeeping shared by both paths of a transport.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    closing: AtomicBool,
    teardown: OnceLock<Teardown>,
}

impl Lifecycle {
    pub(crate) fn state(&self) -> TransportState {
        if self.teardown.get().is_some() {
            TransportState::Closed
        } else if self.closing.load(Ordering::Acquire) {
            TransportState::Closing
        } else {
            TransportState::Open
        }
    }

    /// Returns false if a close was already started.
    pub(crate) fn begin_close(&self) -> bool {
        !self.closing.swap(true, Ordering::AcqRel) && self.teardown.get().is_none()
    }

    pub(crate) fn record_teardown(&self, cause: Teardown) {
        let _ = self.teardown.set(cause);
    }

    /// Fail fast if no more messages may be sent.
    pub(crate) fn ensure_writable(&self) -> Result<(), TransportError> {
        if let Some(cause) = self.teardown.get() {
            return Err(teardown_error(*cause, "transport closed"));
        }
        if self.closing.load(Ordering::Acquire) {
            return Err(ClosedError::new("transport is closing").into());
        }
        Ok(())
    }

    /// Fail fast if nothing more can be received. Reads stay allowed while closing.
    pub(crate) fn ensure_readable(&self) -> Result<(), TransportError> {
        match self.teardown.get() {
            Some(cause) => Err(teardown_error(*cause, "transport closed")),
            None => Ok(()),
        }
    }

    /// Classify a connection failure in light of what this side has done.
    ///
    /// Once teardown or close has begun, faults caused by it are reported per
    /// the teardown cause instead of as raw I/O errors.
    pub(crate) fn classify(&self, err: ConnError) -> TransportError {
        if let Some(cause) = self.teardown.get() {
            return teardown_error(*cause, &err.to_string());
        }
        if self.closing.load(Ordering::Acquire) {
            return ClosedError::new(err.to_string()).into();
        }
        classify_fault(err)
    }
}

fn teardown_error(cause: Teardown, detail: &str) -> TransportError {
    match cause {
        Teardown::Closed => ClosedError::new(detail).into(),
        Teardown::Aborted(kind) => {
            ConnectionError::new(kind, format!("connection torn down: {detail}")).into()
        }
    }
}
