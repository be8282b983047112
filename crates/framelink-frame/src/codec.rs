use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Separates the type tag from the payload.
pub const SEPARATOR: u8 = b'\n';

/// A type-tagged message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Semantic kind of the message. Opaque to the transport.
    pub msg_type: String,
    /// Raw payload, never inspected.
    pub payload: Bytes,
}

impl Message {
    pub fn new(msg_type: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload: payload.into(),
        }
    }

    /// The size of this message once framed.
    pub fn wire_size(&self) -> usize {
        self.msg_type.len() + 1 + self.payload.len()
    }

    /// Encode this message into a frame.
    pub fn encode(&self) -> Result<Bytes> {
        encode(&self.msg_type, &self.payload)
    }
}

/// Append the frame for `(msg_type, payload)` to `dst`.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────┬─────────────────────┐
/// │ Type tag     │ 0x0A │ Payload (raw bytes) │
/// └──────────────┴──────┴─────────────────────┘
/// ```
///
/// There is no length prefix: one frame is one message of the underlying
/// connection. The payload is copied verbatim and may contain `0x0A`.
pub fn encode_message(msg_type: &str, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if msg_type.as_bytes().contains(&SEPARATOR) {
        return Err(FrameError::SeparatorInTypeTag(msg_type.to_string()));
    }
    dst.reserve(msg_type.len() + 1 + payload.len());
    dst.put_slice(msg_type.as_bytes());
    dst.put_u8(SEPARATOR);
    dst.put_slice(payload);
    Ok(())
}

/// Encode `(msg_type, payload)` into a new frame.
pub fn encode(msg_type: &str, payload: &[u8]) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    encode_message(msg_type, payload, &mut buf)?;
    Ok(buf.freeze())
}

/// Split a frame at its first separator.
///
/// The payload shares the frame's buffer. Unknown type tags are passed
/// through untouched.
pub fn decode(frame: Bytes) -> Result<Message> {
    let split = frame
        .iter()
        .position(|&b| b == SEPARATOR)
        .ok_or(FrameError::Malformed)?;

    let msg_type = std::str::from_utf8(&frame[..split])?.to_string();
    let payload = frame.slice(split + 1..);
    Ok(Message { msg_type, payload })
}

/// [`decode`] for borrowed input; copies the payload.
pub fn decode_slice(frame: &[u8]) -> Result<Message> {
    decode(Bytes::copy_from_slice(frame))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_example_encodes_exactly() {
        let frame = encode("event", b"{\"id\":1}").unwrap();
        assert_eq!(frame.as_ref(), b"event\n{\"id\":1}");

        let message = decode(frame).unwrap();
        assert_eq!(message.msg_type, "event");
        assert_eq!(message.payload.as_ref(), b"{\"id\":1}");
    }

    #[test]
    fn only_first_separator_splits() {
        let payload = b"line one\nline two\n\n";
        let message = decode(encode("log", payload).unwrap()).unwrap();

        assert_eq!(message.msg_type, "log");
        assert_eq!(message.payload.as_ref(), payload);
    }

    #[test]
    fn frame_without_separator_is_malformed() {
        assert!(matches!(
            decode(Bytes::from_static(b"no separator here")).unwrap_err(),
            FrameError::Malformed
        ));
        assert!(matches!(
            decode(Bytes::new()).unwrap_err(),
            FrameError::Malformed
        ));
    }

    #[test]
    fn empty_tag_and_empty_payload() {
        let message = decode_slice(b"\n").unwrap();
        assert_eq!(message, Message::new("", Bytes::new()));

        let message = decode_slice(b"ping\n").unwrap();
        assert_eq!(message.msg_type, "ping");
        assert!(message.payload.is_empty());
    }

    #[test]
    fn tag_with_separator_rejected() {
        let err = encode("bad\ntag", b"x").unwrap_err();
        assert!(matches!(err, FrameError::SeparatorInTypeTag(tag) if tag == "bad\ntag"));
    }

    #[test]
    fn non_utf8_tag_rejected() {
        let err = decode_slice(&[0xFF, 0xFE, SEPARATOR, b'x']).unwrap_err();
        assert!(matches!(err, FrameError::NonUtf8TypeTag(_)));
    }

    #[test]
    fn unrecognised_tags_pass_through() {
        let message = decode_slice("ünïcode.kind/v2\npayload".as_bytes()).unwrap();
        assert_eq!(message.msg_type, "ünïcode.kind/v2");
    }

    #[test]
    fn binary_payload_survives() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(1024).collect();
        let message = Message::new("blob", payload.clone());
        let frame = message.encode().unwrap();

        assert_eq!(frame.len(), message.wire_size());
        assert_eq!(decode(frame).unwrap(), message);
    }

    #[test]
    fn encode_appends_to_existing_buffer() {
        let mut buf = BytesMut::from(&b"prefix|"[..]);
        encode_message("a", b"b", &mut buf).unwrap();
        assert_eq!(buf.as_ref(), b"prefix|a\nb");
    }
}
