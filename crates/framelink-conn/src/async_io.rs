//! Tokio flavour of [`StreamConnection`](crate::StreamConnection).
//!
//! The wire format is identical; records are framed with
//! [`tokio_util::codec`] instead of the blocking reader/writer pair.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};
use tracing::debug;

use crate::close::CloseFrame;
use crate::connection::{CloseState, StreamControl};
use crate::error::{ConnError, Result};
use crate::record::{
    decode_record, encode_record, find_close_record, ConnConfig, Opcode, Record,
};
use crate::socket::SocketStream;

/// How long to wait for more bytes while collecting records the peer left
/// before shutting down.
const PENDING_CLOSE_WAIT: Duration = Duration::from_millis(5);

/// `tokio_util` codec for records.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    max_message_size: usize,
}

impl RecordCodec {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

impl Default for RecordCodec {
    fn default() -> Self {
        Self::new(ConnConfig::default().max_message_size)
    }
}

impl Decoder for RecordCodec {
    type Item = Record;
    type Error = ConnError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Record>> {
        decode_record(src, self.max_message_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Record>> {
        match self.decode(src)? {
            Some(record) => Ok(Some(record)),
            None if src.is_empty() => Ok(None),
            None => Err(ConnError::UnexpectedEof),
        }
    }
}

impl Encoder<Record> for RecordCodec {
    type Error = ConnError;

    fn encode(&mut self, record: Record, dst: &mut BytesMut) -> Result<()> {
        if record.opcode == Opcode::Message && record.body.len() > self.max_message_size {
            return Err(ConnError::MessageTooLarge {
                size: record.body.len(),
                max: self.max_message_size,
            });
        }
        encode_record(record.opcode, &record.body, dst)
    }
}

/// A discrete-message connection over a tokio Unix stream.
#[derive(Debug)]
pub struct AsyncStreamConnection {
    stream: UnixStream,
    config: ConnConfig,
}

impl AsyncStreamConnection {
    pub fn new(stream: UnixStream) -> Self {
        Self::with_config(stream, ConnConfig::default())
    }

    pub fn with_config(stream: UnixStream, config: ConnConfig) -> Self {
        Self { stream, config }
    }

    /// Connect to a listening Unix domain socket.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)
            .await
            .map_err(|source| ConnError::Connect {
                addr: path.display().to_string(),
                source,
            })?;
        debug!(?path, "connected to unix domain socket");
        Ok(Self::new(stream))
    }

    /// A connected in-process pair. Must be called inside a tokio runtime.
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = UnixStream::pair()?;
        Ok((Self::new(left), Self::new(right)))
    }

    /// Split into independently usable halves plus a termination handle.
    ///
    /// Must be called inside a tokio runtime.
    pub fn split(self) -> Result<(AsyncStreamReader, AsyncStreamWriter, StreamControl)> {
        let std_stream = self.stream.into_std()?;
        let control = StreamControl::new(SocketStream::from(std_stream.try_clone()?));
        let stream = UnixStream::from_std(std_stream)?;
        let (read_half, write_half) = stream.into_split();

        let codec = RecordCodec::new(self.config.max_message_size);
        let state = Arc::new(CloseState::default());

        Ok((
            AsyncStreamReader {
                inner: FramedRead::new(read_half, codec.clone()),
                state: Arc::clone(&state),
            },
            AsyncStreamWriter {
                inner: FramedWrite::new(write_half, codec),
                state,
            },
            control,
        ))
    }
}

/// Read half of an [`AsyncStreamConnection`].
pub struct AsyncStreamReader {
    inner: FramedRead<OwnedReadHalf, RecordCodec>,
    state: Arc<CloseState>,
}

impl AsyncStreamReader {
    /// Wait for the next message.
    ///
    /// Cancel-safe: dropping the future before completion loses no data.
    pub async fn read_message(&mut self) -> Result<Bytes> {
        if let Some(frame) = self.state.received() {
            return Err(ConnError::Closed(frame));
        }

        let record = match self.inner.next().await {
            Some(record) => record?,
            None => return Err(ConnError::UnexpectedEof),
        };

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

    /// A close record the peer already delivered, found without consuming
    /// the messages queued ahead of it. Waits at most briefly for bytes.
    pub async fn pending_close(&mut self) -> Result<Option<CloseFrame>> {
        if let Some(frame) = self.state.received() {
            return Ok(Some(frame));
        }

        let mut fresh = BytesMut::with_capacity(8 * 1024);
        let half = self.inner.get_ref();
        loop {
            match tokio::time::timeout(PENDING_CLOSE_WAIT, half.readable()).await {
                Err(_) => break,
                Ok(ready) => ready?,
            }
            match half.try_read_buf(&mut fresh) {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
                Err(err) if err.kind() == ErrorKind::ConnectionReset => break,
                Err(err) => return Err(ConnError::Io(err)),
            }
        }
        self.inner.read_buffer_mut().extend_from_slice(&fresh);

        match find_close_record(self.inner.read_buffer()) {
            Some(body) => Ok(Some(CloseFrame::decode(&body)?)),
            None => Ok(None),
        }
    }
}

/// Write half of an [`AsyncStreamConnection`].
pub struct AsyncStreamWriter {
    inner: FramedWrite<OwnedWriteHalf, RecordCodec>,
    state: Arc<CloseState>,
}

impl AsyncStreamWriter {
    /// Write one message. Not cancel-safe: a dropped future may leave a
    /// partial record on the wire.
    pub async fn write_message(&mut self, message: Bytes) -> Result<()> {
        self.state.check_writable()?;
        self.inner.send(Record::message(message)).await
    }

    pub async fn write_close(&mut self, frame: &CloseFrame) -> Result<()> {
        if self.state.sent() {
            return Err(ConnError::CloseSent);
        }
        self.inner
            .send(Record {
                opcode: Opcode::Close,
                body: frame.encode(),
            })
            .await?;
        self.state.record_sent();
        debug!(close = %frame, "sent close record");
        Ok(())
    }

    /// The close record the read half has received, if any.
    pub fn peer_close(&self) -> Option<CloseFrame> {
        self.state.received()
    }
}
