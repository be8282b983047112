use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::close::MAX_REASON_LEN;
use crate::error::{ConnError, Result};

/// Record header: magic (2) + opcode (1) + length (4) = 7 bytes.
pub const HEADER_SIZE: usize = 7;

/// Magic bytes: "FL" (0x46 0x4c).
pub const MAGIC: [u8; 2] = [0x46, 0x4c];

/// Default maximum message body size: 16 MiB.
pub const DEFAULT_MAX_MESSAGE: usize = 16 * 1024 * 1024;

/// Largest legal close body: status code plus reason.
const MAX_CLOSE_BODY: usize = 2 + MAX_REASON_LEN;

/// Record kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// One discrete application message.
    Message = 0x02,
    /// Graceful-close control record.
    Close = 0x08,
}

impl TryFrom<u8> for Opcode {
    type Error = ConnError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x02 => Ok(Opcode::Message),
            0x08 => Ok(Opcode::Close),
            other => Err(ConnError::UnknownOpcode(other)),
        }
    }
}

/// One record as it travels over a byte stream.
#[derive(Debug, Clone)]
pub struct Record {
    pub opcode: Opcode,
    pub body: Bytes,
}

impl Record {
    pub fn message(body: impl Into<Bytes>) -> Self {
        Self {
            opcode: Opcode::Message,
            body: body.into(),
        }
    }

    /// The total wire size of this record (header + body).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }
}

/// Encode a record into the wire format.
///
/// ```text
/// ┌────────────┬──────────┬────────────┬───────────────┐
/// │ Magic (2B) │ Opcode   │ Length     │ Body          │
/// │ 0x46 0x4c  │ (1B)     │ (4B LE)    │ (Length bytes)│
/// └────────────┴──────────┴────────────┴───────────────┘
/// ```
pub fn encode_record(opcode: Opcode, body: &[u8], dst: &mut BytesMut) -> Result<()> {
    if body.len() > u32::MAX as usize {
        return Err(ConnError::MessageTooLarge {
            size: body.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + body.len());
    dst.put_slice(&MAGIC);
    dst.put_u8(opcode as u8);
    dst.put_u32_le(body.len() as u32);
    dst.put_slice(body);
    Ok(())
}

/// Decode one record from the front of `src`.
///
/// Returns `Ok(None)` until a complete record is buffered, then consumes it.
/// `max_message` bounds message bodies; close bodies are bounded by the
/// close record layout.
pub fn decode_record(src: &mut BytesMut, max_message: usize) -> Result<Option<Record>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(ConnError::InvalidMagic);
    }
    let opcode = Opcode::try_from(src[2])?;
    let body_len = u32::from_le_bytes([src[3], src[4], src[5], src[6]]) as usize;

    match opcode {
        Opcode::Message if body_len > max_message => {
            return Err(ConnError::MessageTooLarge {
                size: body_len,
                max: max_message,
            });
        }
        Opcode::Close if body_len > MAX_CLOSE_BODY => {
            return Err(ConnError::MalformedClose("close body too long"));
        }
        _ => {}
    }

    if src.len() < HEADER_SIZE + body_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let body = src.split_to(body_len).freeze();
    Ok(Some(Record { opcode, body }))
}

/// Find the first complete close record among the records buffered in
/// `src`, without consuming anything.
///
/// Stops at the first incomplete or malformed header; a later read reports
/// that fault in order.
pub fn find_close_record(src: &[u8]) -> Option<Bytes> {
    let mut rest = src;
    while rest.len() >= HEADER_SIZE && rest[0..2] == MAGIC {
        let body_len = u32::from_le_bytes([rest[3], rest[4], rest[5], rest[6]]) as usize;
        let end = HEADER_SIZE.checked_add(body_len)?;
        if rest.len() < end {
            return None;
        }
        if rest[2] == Opcode::Close as u8 {
            return Some(Bytes::copy_from_slice(&rest[HEADER_SIZE..end]));
        }
        rest = &rest[end..];
    }
    None
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnConfig {
    /// Maximum message body size in bytes, enforced on read and write. Default: 16 MiB.
    pub max_message_size: usize,
    /// Read timeout used whenever no per-call timeout is set.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout used whenever no per-call timeout is set.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
