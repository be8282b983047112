use bytes::Bytes;
use framelink_conn::{
    AsyncStreamConnection, AsyncStreamReader, AsyncStreamWriter, CloseFrame, ConnError,
    ConnectionControl, StreamControl,
};
use framelink_frame::{decode, encode, Message};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{classify_fault, ConnectionError, ConnectionErrorKind, Result, TransportError};
use crate::lifecycle::{Lifecycle, Teardown, TransportState};
use crate::transport::{CLOSE_REASON, CLOSE_WRITE_TIMEOUT, PEER_CLOSE_POLL, PEER_CLOSE_WAIT};

/// Async counterpart of [`Transport`](crate::Transport), cancelled through a
/// [`CancellationToken`] instead of a deadline.
///
/// Cancelling a `receive` is clean: no message is lost and the connection
/// stays usable. Cancelling a `send` whose write already started tears the
/// connection down, since the peer may have seen part of the record. As with
/// the blocking transport, a protocol fault on the read path tears the
/// connection down too.
pub struct AsyncTransport {
    reader: Mutex<AsyncStreamReader>,
    writer: Mutex<AsyncStreamWriter>,
    control: StreamControl,
    lifecycle: Lifecycle,
}

impl AsyncTransport {
    /// Wrap an established connection. Must be called inside a tokio runtime.
    pub fn new(conn: AsyncStreamConnection) -> Result<Self> {
        let (reader, writer, control) = conn.split().map_err(classify_fault)?;
        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            control,
            lifecycle: Lifecycle::default(),
        })
    }

    pub async fn send(&self, cancel: &CancellationToken, msg_type: &str, payload: &[u8]) -> Result<()> {
        let frame = encode(msg_type, payload)?;
        self.lifecycle.ensure_writable()?;
        if cancel.is_cancelled() {
            return Err(ConnectionError::cancelled().into());
        }

        let mut writer = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConnectionError::cancelled().into()),
            writer = self.writer.lock() => writer,
        };
        self.lifecycle.ensure_writable()?;

        tokio::select! {
            biased;
            sent = writer.write_message(frame) => match sent {
                Ok(()) => Ok(()),
                Err(err) => Err(self.fail_send(&writer, err).await),
            },
            _ = cancel.cancelled() => {
                debug!("send cancelled mid-write; tearing connection down");
                self.abort(ConnectionErrorKind::Cancelled);
                Err(ConnectionError::cancelled().into())
            }
        }
    }

    pub async fn receive(&self, cancel: &CancellationToken) -> Result<Message> {
        self.lifecycle.ensure_readable()?;
        if cancel.is_cancelled() {
            return Err(ConnectionError::cancelled().into());
        }

        let bytes: Bytes = {
            let mut reader = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ConnectionError::cancelled().into()),
                reader = self.reader.lock() => reader,
            };
            self.lifecycle.ensure_readable()?;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ConnectionError::cancelled().into()),
                read = reader.read_message() => read.map_err(|err| self.fail_receive(err))?,
            }
        };

        Ok(decode(bytes)?)
    }

    /// Send a going-away close record, then tear the connection down.
    ///
    /// Skips the record if a send currently holds the write path. Closing
    /// twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        if !self.lifecycle.begin_close() {
            return Ok(());
        }

        let sent = match self.writer.try_lock() {
            Ok(mut writer) => {
                let close = CloseFrame::going_away(CLOSE_REASON);
                match tokio::time::timeout(CLOSE_WRITE_TIMEOUT, writer.write_close(&close)).await {
                    Ok(sent) => sent,
                    Err(_) => Err(ConnError::Io(std::io::ErrorKind::TimedOut.into())),
                }
            }
            Err(_) => {
                debug!("write path busy; terminating without close record");
                Ok(())
            }
        };

        let terminated = self.teardown(Teardown::Closed);
        sent.map_err(classify_fault)?;
        terminated
    }

    /// Tear the connection down immediately, without a close record.
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

    fn fail_receive(&self, err: ConnError) -> TransportError {
        let err = self.lifecycle.classify(err);
        if err.connection_kind() == Some(ConnectionErrorKind::Protocol) {
            // The offending header stays buffered, so every later read would
            // stop on it.
            debug!(error = %err, "protocol fault on read; tearing connection down");
            self.abort(ConnectionErrorKind::Protocol);
        }
        err
    }

    async fn fail_send(&self, writer: &AsyncStreamWriter, err: ConnError) -> TransportError {
        if err.is_peer_gone() {
            if let Some(frame) = self.peer_close(writer).await {
                debug!(error = %err, close = %frame, "write failed after peer close");
                return self.lifecycle.classify(ConnError::Closed(frame));
            }
        }
        self.lifecycle.classify(err)
    }

    /// The close record the peer sent before shutting down, if it reached
    /// this side.
    async fn peer_close(&self, writer: &AsyncStreamWriter) -> Option<CloseFrame> {
        let give_up = tokio::time::Instant::now() + PEER_CLOSE_WAIT;
        loop {
            if let Some(frame) = writer.peer_close() {
                return Some(frame);
            }
            match self.reader.try_lock() {
                Ok(mut reader) => {
                    return match reader.pending_close().await {
                        Ok(frame) => frame,
                        Err(err) => {
                            debug!(error = %err, "could not look for a pending close record");
                            None
                        }
                    };
                }
                // A receiver holds the read path; it records the close when it reads it.
                Err(_) if tokio::time::Instant::now() < give_up => {
                    tokio::time::sleep(PEER_CLOSE_POLL).await;
                }
                Err(_) => return None,
            }
        }
    }
}

impl std::fmt::Debug for AsyncTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncTransport")
            .field("state", &self.state())
            .finish()
    }
}
