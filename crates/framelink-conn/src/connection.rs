use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::close::CloseFrame;
use crate::error::{ConnError, Result};
use crate::reader::RecordReader;
use crate::record::{ConnConfig, Opcode};
use crate::socket::SocketStream;
use crate::traits::{ConnectionControl, MessageConnection, MessageRead, MessageWrite};
use crate::writer::RecordWriter;

/// Read timeout while collecting records the peer left before shutting down.
const PENDING_CLOSE_READ_TIMEOUT: Duration = Duration::from_millis(5);

/// Close bookkeeping shared by both halves of one connection.
#[derive(Debug, Default)]
pub(crate) struct CloseState {
    received: Mutex<Option<CloseFrame>>,
    sent: AtomicBool,
}

impl CloseState {
    pub(crate) fn received(&self) -> Option<CloseFrame> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn record_received(&self, frame: CloseFrame) {
        *self.received.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
    }

    pub(crate) fn sent(&self) -> bool {
        self.sent.load(Ordering::Acquire)
    }

    pub(crate) fn record_sent(&self) {
        self.sent.store(true, Ordering::Release);
    }

    /// Reject application writes once either side has started closing.
    pub(crate) fn check_writable(&self) -> Result<()> {
        if let Some(frame) = self.received() {
            return Err(ConnError::Closed(frame));
        }
        if self.sent() {
            return Err(ConnError::CloseSent);
        }
        Ok(())
    }
}

/// A discrete-message connection over a connected socket.
///
/// Messages travel as records (see [`crate::record`]), so one
/// `write_message` on one side is exactly one `read_message` on the other.
#[derive(Debug)]
pub struct StreamConnection {
    stream: SocketStream,
    config: ConnConfig,
}

impl StreamConnection {
    pub fn new(stream: impl Into<SocketStream>) -> Self {
        Self::with_config(stream, ConnConfig::default())
    }

    pub fn with_config(stream: impl Into<SocketStream>, config: ConnConfig) -> Self {
        Self {
            stream: stream.into(),
            config,
        }
    }

    /// Dial a TCP endpoint.
    pub fn connect_tcp(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<Self> {
        let stream = TcpStream::connect(&addr).map_err(|source| ConnError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        debug!(%addr, "connected to tcp endpoint");
        Ok(Self::new(stream))
    }

    /// A connected pair of in-process connections.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((Self::new(left), Self::new(right)))
    }

    pub fn config(&self) -> &ConnConfig {
        &self.config
    }

    pub fn stream(&self) -> &SocketStream {
        &self.stream
    }
}

impl MessageConnection for StreamConnection {
    type Reader = StreamReader;
    type Writer = StreamWriter;
    type Control = StreamControl;

    fn split(self) -> Result<(StreamReader, StreamWriter, StreamControl)> {
        let read_stream = self.stream.try_clone()?;
        let control_stream = self.stream.try_clone()?;
        let write_stream = self.stream;

        read_stream.set_read_timeout(self.config.read_timeout)?;
        write_stream.set_write_timeout(self.config.write_timeout)?;

        let state = Arc::new(CloseState::default());
        trace!(kind = write_stream.kind(), "split stream connection");

        Ok((
            StreamReader {
                records: RecordReader::with_max_message_size(
                    read_stream,
                    self.config.max_message_size,
                ),
                state: Arc::clone(&state),
                default_timeout: self.config.read_timeout,
            },
            StreamWriter {
                records: RecordWriter::with_max_message_size(
                    write_stream,
                    self.config.max_message_size,
                ),
                state,
                default_timeout: self.config.write_timeout,
            },
            StreamControl::new(control_stream),
        ))
    }
}

/// Read half of a [`StreamConnection`].
pub struct StreamReader {
    records: RecordReader<SocketStream>,
    state: Arc<CloseState>,
    default_timeout: Option<Duration>,
}

impl MessageRead for StreamReader {
    fn read_message(&mut self) -> Result<Bytes> {
        if let Some(frame) = self.state.received() {
            return Err(ConnError::Closed(frame));
        }

        let record = self.records.read_record()?;
        match record.opcode {
            Opcode::Message => Ok(record.body),
            Opcode::Close => {
                let frame = CloseFrame::decode(&record.body)?;
                debug!(close = %frame, "received close record");
                self.state.record_received(frame.clone());
                Err(ConnError::Closed(frame))
            }
        }
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.records
            .get_ref()
            .set_read_timeout(timeout.or(self.default_timeout))
    }

    fn pending_close(&mut self) -> Result<Option<CloseFrame>> {
        if let Some(frame) = self.state.received() {
            return Ok(Some(frame));
        }

        self.records
            .get_ref()
            .set_read_timeout(Some(PENDING_CLOSE_READ_TIMEOUT))?;
        let filled = self.records.fill_available();
        self.records
            .get_ref()
            .set_read_timeout(self.default_timeout)?;
        filled?;

        match self.records.buffered_close() {
            Some(body) => Ok(Some(CloseFrame::decode(&body)?)),
            None => Ok(None),
        }
    }
}

/// Write half of a [`StreamConnection`].
pub struct StreamWriter {
    records: RecordWriter<SocketStream>,
    state: Arc<CloseState>,
    default_timeout: Option<Duration>,
}

impl MessageWrite for StreamWriter {
    fn write_message(&mut self, message: &[u8]) -> Result<()> {
        self.state.check_writable()?;
        self.records.write_record(Opcode::Message, message)
    }

    fn write_close(&mut self, frame: &CloseFrame) -> Result<()> {
        if self.state.sent() {
            return Err(ConnError::CloseSent);
        }
        self.records.write_record(Opcode::Close, &frame.encode())?;
        self.state.record_sent();
        debug!(close = %frame, "sent close record");
        Ok(())
    }

    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.records
            .get_ref()
            .set_write_timeout(timeout.or(self.default_timeout))
    }

    fn peer_close(&self) -> Option<CloseFrame> {
        self.state.received()
    }
}

/// Termination handle of a [`StreamConnection`].
#[derive(Debug)]
pub struct StreamControl {
    stream: SocketStream,
}

impl StreamControl {
    pub(crate) fn new(stream: SocketStream) -> Self {
        Self { stream }
    }
}

impl ConnectionControl for StreamControl {
    fn terminate(&self) -> Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => {
                debug!(kind = self.stream.kind(), "terminated connection");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(ConnError::Io(err)),
        }
    }
}
