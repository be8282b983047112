use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::error::{ConnError, Result};
use crate::record::{encode_record, Opcode, DEFAULT_MAX_MESSAGE};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete records to any `Write` stream.
///
/// Each record is encoded into one buffer and written in full before
/// returning, so a record is never interleaved with another on the wire as
/// long as callers serialize access to the writer.
pub struct RecordWriter<T> {
    inner: T,
    buf: BytesMut,
    max_message_size: usize,
}

impl<T: Write> RecordWriter<T> {
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

    /// Encode and write one record (blocking).
    ///
    /// `WouldBlock` is not retried: on a socket with a write timeout it means
    /// the timeout expired and the record may be partially written.
    pub fn write_record(&mut self, opcode: Opcode, body: &[u8]) -> Result<()> {
        if opcode == Opcode::Message && body.len() > self.max_message_size {
            return Err(ConnError::MessageTooLarge {
                size: body.len(),
                max: self.max_message_size,
            });
        }

        self.buf.clear();
        encode_record(opcode, body, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(ConnError::UnexpectedEof),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(ConnError::Io(err)),
            }
        }

        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(ConnError::Io(err)),
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}
