use std::time::Duration;

use bytes::Bytes;

use crate::close::CloseFrame;
use crate::error::Result;

/// The read half of a discrete-message connection.
///
/// Every successful call yields exactly one message as it was written by the
/// peer. A close record from the peer surfaces as
/// [`ConnError::Closed`](crate::ConnError::Closed).
pub trait MessageRead: Send {
    /// Block until the next message arrives.
    fn read_message(&mut self) -> Result<Bytes>;

    /// Bound subsequent reads. `None` falls back to the connection's
    /// configured read timeout, if any.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()>;

    /// A close record the peer already delivered, found without blocking and
    /// without consuming the messages queued ahead of it.
    ///
    /// Used to explain a failed write after the peer shut down.
    fn pending_close(&mut self) -> Result<Option<CloseFrame>> {
        Ok(None)
    }
}

/// The write half of a discrete-message connection.
pub trait MessageWrite: Send {
    /// Write one message as a single discrete unit.
    fn write_message(&mut self, message: &[u8]) -> Result<()>;

    /// Write the graceful-close control record.
    fn write_close(&mut self, frame: &CloseFrame) -> Result<()>;

    /// Bound subsequent writes. `None` falls back to the connection's
    /// configured write timeout, if any.
    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<()>;

    /// The close record the read half has received, if any.
    fn peer_close(&self) -> Option<CloseFrame> {
        None
    }
}

/// Out-of-band control over a connection, usable while either half is blocked.
pub trait ConnectionControl: Send + Sync {
    /// Tear the connection down in both directions.
    ///
    /// Calls blocked on either half return an error promptly. Terminating an
    /// already terminated connection succeeds.
    fn terminate(&self) -> Result<()>;
}

/// A connection that can be split into independent halves.
pub trait MessageConnection {
    type Reader: MessageRead + 'static;
    type Writer: MessageWrite + 'static;
    type Control: ConnectionControl + 'static;

    fn split(self) -> Result<(Self::Reader, Self::Writer, Self::Control)>;
}
