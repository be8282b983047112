use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};

use crate::error::{ConnError, Result};
use crate::record::{decode_record, find_close_record, Record, DEFAULT_MAX_MESSAGE};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete records from any `Read` stream.
///
/// Partial reads are buffered internally; callers only ever see whole records.
pub struct RecordReader<T> {
    inner: T,
    buf: BytesMut,
    max_message_size: usize,
}

impl<T: Read> RecordReader<T> {
    pub fn new(inner: T) -> Self {
        Self::with_max_message_size(inner, DEFAULT_MAX_MESSAGE)
    }

    pub fn with_max_message_size(inner: T, max_message_size: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_message_size,
        }
    }

    /// Read the next complete record (blocking).
    ///
    /// EOF, whether between records or inside one, is reported as
    /// [`ConnError::UnexpectedEof`]; a well-behaved peer sends a close record first.
    pub fn read_record(&mut self) -> Result<Record> {
        loop {
            if let Some(record) = decode_record(&mut self.buf, self.max_message_size)? {
                return Ok(record);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(ConnError::Io(err)),
            };

            if read == 0 {
                return Err(ConnError::UnexpectedEof);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Buffer whatever the stream yields until it ends or a read times out.
    ///
    /// Only meant for a stream the peer has shut down, with a short read
    /// timeout set; nothing buffered is consumed. A reset counts as the end.
    pub fn fill_available(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Ok(()),
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::ConnectionReset
                    ) =>
                {
                    return Ok(())
                }
                Err(err) => return Err(ConnError::Io(err)),
            }
        }
    }

    /// Body of a close record already buffered behind pending messages.
    pub fn buffered_close(&self) -> Option<Bytes> {
        find_close_record(&self.buf)
    }

    /// Bytes buffered but not yet returned as a record.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BufMut;

    use super::*;
    use crate::close::CloseFrame;
    use crate::record::{encode_record, Opcode, MAGIC};

    fn wire(records: &[(Opcode, &[u8])]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (opcode, body) in records {
            encode_record(*opcode, body, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn reads_records_in_order() {
        let bytes = wire(&[
            (Opcode::Message, b"one".as_ref()),
            (Opcode::Message, b"two".as_ref()),
        ]);
        let mut reader = RecordReader::new(Cursor::new(bytes));

        assert_eq!(reader.read_record().unwrap().body.as_ref(), b"one");
        assert_eq!(reader.read_record().unwrap().body.as_ref(), b"two");
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn large_record_spanning_many_chunks() {
        let payload = vec![0x5A; 3 * READ_CHUNK_SIZE + 17];
        let bytes = wire(&[(Opcode::Message, payload.as_slice())]);
        let mut reader = RecordReader::new(Cursor::new(bytes));

        let record = reader.read_record().unwrap();
        assert_eq!(record.body.len(), payload.len());
    }

    #[test]
    fn byte_at_a_time_stream() {
        let bytes = wire(&[(Opcode::Message, b"slow".as_ref())]);
        let mut reader = RecordReader::new(Trickle { bytes, pos: 0 });

        assert_eq!(reader.read_record().unwrap().body.as_ref(), b"slow");
    }

    #[test]
    fn eof_before_any_record() {
        let mut reader = RecordReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(matches!(
            reader.read_record().unwrap_err(),
            ConnError::UnexpectedEof
        ));
    }

    #[test]
    fn eof_inside_record() {
        let mut partial = BytesMut::new();
        partial.put_slice(&MAGIC);
        partial.put_u8(Opcode::Message as u8);
        partial.put_u32_le(32);
        partial.put_slice(b"not enough");

        let mut reader = RecordReader::new(Cursor::new(partial.to_vec()));
        assert!(matches!(
            reader.read_record().unwrap_err(),
            ConnError::UnexpectedEof
        ));
    }

    #[test]
    fn interrupted_read_is_retried() {
        let bytes = wire(&[(Opcode::Message, b"ok".as_ref())]);
        let mut reader = RecordReader::new(FailOnce {
            kind: ErrorKind::Interrupted,
            failed: false,
            inner: Cursor::new(bytes),
        });

        assert_eq!(reader.read_record().unwrap().body.as_ref(), b"ok");
    }

    #[test]
    fn would_block_surfaces_as_io_error() {
        let bytes = wire(&[(Opcode::Message, b"ok".as_ref())]);
        let mut reader = RecordReader::new(FailOnce {
            kind: ErrorKind::WouldBlock,
            failed: false,
            inner: Cursor::new(bytes),
        });

        let err = reader.read_record().unwrap_err();
        assert!(err.is_timeout());
        // The record is still readable once data flows again.
        assert_eq!(reader.read_record().unwrap().body.as_ref(), b"ok");
    }

    #[test]
    fn max_message_size_enforced() {
        let bytes = wire(&[(Opcode::Message, [0u8; 64].as_ref())]);
        let mut reader = RecordReader::with_max_message_size(Cursor::new(bytes), 16);
        assert!(matches!(
            reader.read_record().unwrap_err(),
            ConnError::MessageTooLarge { size: 64, max: 16 }
        ));
    }

    #[test]
    fn fill_available_keeps_records_queued() {
        let bytes = wire(&[
            (Opcode::Message, b"first".as_ref()),
            (Opcode::Close, CloseFrame::going_away("bye").encode().as_ref()),
        ]);
        let mut reader = RecordReader::new(FailOnce {
            kind: ErrorKind::WouldBlock,
            failed: true,
            inner: Cursor::new(bytes),
        });

        reader.fill_available().unwrap();
        let body = reader.buffered_close().expect("close record should be buffered");
        assert_eq!(CloseFrame::decode(&body).unwrap(), CloseFrame::going_away("bye"));

        assert_eq!(reader.read_record().unwrap().body.as_ref(), b"first");
        assert_eq!(reader.read_record().unwrap().opcode, Opcode::Close);
    }

    #[test]
    fn fill_available_stops_at_timeout() {
        let mut reader = RecordReader::new(FailOnce {
            kind: ErrorKind::WouldBlock,
            failed: false,
            inner: Cursor::new(Vec::new()),
        });

        reader.fill_available().unwrap();
        assert_eq!(reader.buffered(), 0);
        assert!(reader.buffered_close().is_none());
    }

    struct Trickle {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct FailOnce {
        kind: ErrorKind,
        failed: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for FailOnce {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.failed {
                self.failed = true;
                return Err(std::io::Error::from(self.kind));
            }
            self.inner.read(buf)
        }
    }
}
