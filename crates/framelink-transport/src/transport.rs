use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use framelink_conn::{
    CloseFrame, ConnError, ConnectionControl, MessageConnection, MessageRead, MessageWrite,
    StreamConnection,
};
use framelink_frame::{decode, encode, Message};
use tracing::debug;

use crate::context::Context;
use crate::error::{classify_fault, ConnectionErrorKind, Result, TransportError};
use crate::lifecycle::{Lifecycle, Teardown, TransportState};

/// Reason sent with the close record.
pub const CLOSE_REASON: &str = "bye";

/// Upper bound on writing the close record, so `close()` cannot hang on a
/// peer that stopped reading.
pub const CLOSE_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a failed send waits for a busy receiver to pick up the peer's
/// close record.
pub(crate) const PEER_CLOSE_WAIT: Duration = Duration::from_millis(100);
pub(crate) const PEER_CLOSE_POLL: Duration = Duration::from_millis(5);

/// A message transport that is safe to share between threads.
///
/// `send` and `receive` each hold their own lock, so one writer and one
/// reader never wait on each other. Concurrent senders are serialized, as
/// are concurrent receivers; the order in which waiting callers get the lock
/// is unspecified. Callers that need strict ordering must funnel through a
/// single thread.
///
/// Failures are returned, never retried. A failed decode drops that one
/// message and leaves the connection usable; a record-level protocol fault
/// on the read path tears the connection down.
///
/// A send that fails because the peer already shut down is reported from
/// the peer's close record when one reached this side, so a going-away peer
/// yields [`ClosedError`](crate::ClosedError) on either path.
pub struct Transport<C: MessageConnection = StreamConnection> {
    reader: Mutex<C::Reader>,
    writer: Mutex<C::Writer>,
    control: C::Control,
    lifecycle: Lifecycle,
}

impl<C: MessageConnection> Transport<C> {
    /// Wrap an established connection. The transport owns it from here on.
    pub fn new(conn: C) -> Result<Self> {
        let (reader, writer, control) = conn.split().map_err(classify_fault)?;
        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            control,
            lifecycle: Lifecycle::default(),
        })
    }

    /// Send one message, blocking until it is written or the write fails.
    pub fn send(&self, cx: &Context, msg_type: &str, payload: &[u8]) -> Result<()> {
        let frame = encode(msg_type, payload)?;
        self.lifecycle.ensure_writable()?;
        cx.remaining()?;

        let mut writer = lock(&self.writer);
        self.lifecycle.ensure_writable()?;
        let timeout = cx.remaining()?;

        let written = writer
            .set_write_timeout(timeout)
            .and_then(|()| writer.write_message(&frame));
        written.map_err(|err| self.fail_send(&writer, err, timeout.is_some()))
    }

    /// Receive the next message, blocking until one arrives or the read fails.
    pub fn receive(&self, cx: &Context) -> Result<Message> {
        self.lifecycle.ensure_readable()?;
        cx.remaining()?;

        let bytes = {
            let mut reader = lock(&self.reader);
            self.lifecycle.ensure_readable()?;
            let timeout = cx.remaining()?;

            reader
                .set_read_timeout(timeout)
                .and_then(|()| reader.read_message())
                .map_err(|err| self.fail_receive(err, timeout.is_some()))?
        };

        Ok(decode(bytes)?)
    }

    /// Gracefully close: send a going-away close record, then tear the
    /// connection down.
    ///
    /// Calls blocked in `send` or `receive` are released with a
    /// [`ClosedError`](crate::ClosedError). If a writer is currently blocked
    /// holding the write path, the close record is skipped. Closing twice is
    /// a no-op.
    pub fn close(&self) -> Result<()> {
        if !self.lifecycle.begin_close() {
            return Ok(());
        }

        let sent = match self.writer.try_lock() {
            Ok(mut writer) => send_close(&mut *writer),
            Err(TryLockError::Poisoned(poisoned)) => send_close(&mut *poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {
                debug!("write path busy; terminating without close record");
                Ok(())
            }
        };

        let terminated = self.teardown(Teardown::Closed);
        sent.map_err(classify_fault)?;
        terminated
    }

    /// Tear the connection down immediately, without a close record.
    ///
    /// Meant for watchdogs: blocked calls return a
    /// [`ClosedError`](crate::ClosedError).
    pub fn terminate(&self) -> Result<()> {
        self.teardown(Teardown::Closed)
    }

    pub fn state(&self) -> TransportState {
        self.lifecycle.state()
    }

    fn teardown(&self, cause: Teardown) -> Result<()> {
        self.lifecycle.record_teardown(cause);
        self.control.terminate().map_err(classify_fault)
    }

    fn abort(&self, kind: ConnectionErrorKind) {
        if let Err(err) = self.teardown(Teardown::Aborted(kind)) {
            debug!(error = %err, ?kind, "terminate after abort failed");
        }
    }

    fn fail(&self, err: ConnError, deadline_armed: bool) -> TransportError {
        if !err.is_timeout() {
            return self.lifecycle.classify(err);
        }
        // A record may be half written or half read; the stream is no longer
        // in sync.
        let kind = if deadline_armed {
            ConnectionErrorKind::DeadlineExceeded
        } else {
            ConnectionErrorKind::Io
        };
        debug!(error = %err, ?kind, "timed out; tearing connection down");
        self.abort(kind);
        if deadline_armed {
            crate::ConnectionError::deadline_exceeded().into()
        } else {
            crate::ConnectionError::new(kind, err.to_string()).into()
        }
    }

    fn fail_receive(&self, err: ConnError, deadline_armed: bool) -> TransportError {
        let err = self.fail(err, deadline_armed);
        if err.connection_kind() == Some(ConnectionErrorKind::Protocol) {
            // The offending header stays buffered, so every later read would
            // stop on it.
            debug!(error = %err, "protocol fault on read; tearing connection down");
            self.abort(ConnectionErrorKind::Protocol);
        }
        err
    }

    fn fail_send(&self, writer: &C::Writer, err: ConnError, deadline_armed: bool) -> TransportError {
        if err.is_peer_gone() {
            if let Some(frame) = self.peer_close(writer) {
                debug!(error = %err, close = %frame, "write failed after peer close");
                return self.lifecycle.classify(ConnError::Closed(frame));
            }
        }
        self.fail(err, deadline_armed)
    }

    /// The close record the peer sent before shutting down, if it reached
    /// this side.
    fn peer_close(&self, writer: &C::Writer) -> Option<CloseFrame> {
        let give_up = Instant::now() + PEER_CLOSE_WAIT;
        loop {
            if let Some(frame) = writer.peer_close() {
                return Some(frame);
            }
            let mut reader = match self.reader.try_lock() {
                Ok(reader) => reader,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                // A receiver holds the read path; it records the close when it reads it.
                Err(TryLockError::WouldBlock) if Instant::now() < give_up => {
                    thread::sleep(PEER_CLOSE_POLL);
                    continue;
                }
                Err(TryLockError::WouldBlock) => return None,
            };
            return match reader.pending_close() {
                Ok(frame) => frame,
                Err(err) => {
                    debug!(error = %err, "could not look for a pending close record");
                    None
                }
            };
        }
    }
}

fn send_close<W: MessageWrite>(writer: &mut W) -> framelink_conn::Result<()> {
    writer.set_write_timeout(Some(CLOSE_WRITE_TIMEOUT))?;
    writer.write_close(&CloseFrame::going_away(CLOSE_REASON))
}

// The guarded halves hold no invariants a panic could break mid-update.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<C: MessageConnection> std::fmt::Debug for Transport<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("state", &self.state())
            .finish()
    }
}
