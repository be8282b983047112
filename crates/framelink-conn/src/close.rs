//! Close records: the graceful-shutdown control signal.
//!
//! A close record body is a big-endian `u16` status code followed by an
//! optional UTF-8 reason. Codes follow the WebSocket close registry so that
//! logs read the same on both sides of a bridge.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ConnError, Result};

/// Maximum reason length in bytes.
pub const MAX_REASON_LEN: usize = 123;

/// Close status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// 1000: the purpose of the connection has been fulfilled.
    Normal,
    /// 1001: the endpoint is going away.
    GoingAway,
    /// 1002: protocol error.
    Protocol,
    /// 1003: received data the endpoint cannot accept.
    Unsupported,
    /// 1005: the close record carried no status code. Never sent.
    NoStatus,
    /// 1008: policy violation.
    Policy,
    /// 1009: message too big to process.
    TooBig,
    /// 1011: unexpected internal condition.
    Error,
    /// Any other code, carried as-is.
    Other(u16),
}

impl CloseCode {
    pub fn as_u16(self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::Protocol => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::NoStatus => 1005,
            CloseCode::Policy => 1008,
            CloseCode::TooBig => 1009,
            CloseCode::Error => 1011,
            CloseCode::Other(code) => code,
        }
    }

    /// Human-readable name, used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            CloseCode::Normal => "normal",
            CloseCode::GoingAway => "going away",
            CloseCode::Protocol => "protocol error",
            CloseCode::Unsupported => "unsupported data",
            CloseCode::NoStatus => "no status",
            CloseCode::Policy => "policy violation",
            CloseCode::TooBig => "message too big",
            CloseCode::Error => "internal error",
            CloseCode::Other(_) => "other",
        }
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::Protocol,
            1003 => CloseCode::Unsupported,
            1005 => CloseCode::NoStatus,
            1008 => CloseCode::Policy,
            1009 => CloseCode::TooBig,
            1011 => CloseCode::Error,
            other => CloseCode::Other(other),
        }
    }
}

/// A parsed close record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: CloseCode,
    pub reason: String,
}

impl CloseFrame {
    /// Create a close frame. Reasons longer than [`MAX_REASON_LEN`] are
    /// truncated on a character boundary.
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        let mut reason = reason.into();
        if reason.len() > MAX_REASON_LEN {
            let mut end = MAX_REASON_LEN;
            while !reason.is_char_boundary(end) {
                end -= 1;
            }
            reason.truncate(end);
        }
        Self { code, reason }
    }

    pub fn normal(reason: impl Into<String>) -> Self {
        Self::new(CloseCode::Normal, reason)
    }

    pub fn going_away(reason: impl Into<String>) -> Self {
        Self::new(CloseCode::GoingAway, reason)
    }

    /// Encode the close record body.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + self.reason.len());
        buf.put_u16(self.code.as_u16());
        buf.put_slice(self.reason.as_bytes());
        buf.freeze()
    }

    /// Decode a close record body.
    ///
    /// An empty body is accepted and reported as [`CloseCode::NoStatus`].
    pub fn decode(body: &[u8]) -> Result<Self> {
        match body.len() {
            0 => return Ok(Self::new(CloseCode::NoStatus, String::new())),
            1 => return Err(ConnError::MalformedClose("truncated status code")),
            _ => {}
        }
        let code = u16::from_be_bytes([body[0], body[1]]);
        let reason = std::str::from_utf8(&body[2..])
            .map_err(|_| ConnError::MalformedClose("reason is not valid UTF-8"))?;
        Ok(Self {
            code: CloseCode::from(code),
            reason: reason.to_string(),
        })
    }
}

impl fmt::Display for CloseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code.as_u16(), self.code.name())?;
        if !self.reason.is_empty() {
            write!(f, ": {}", self.reason)?;
        }
        Ok(())
    }
}
