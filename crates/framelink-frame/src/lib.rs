//! Type-tagged message frames.
//!
//! A frame is a type tag, one `\n`, then the raw payload:
//!
//! ```
//! use framelink_frame::{decode, encode};
//!
//! let frame = encode("event", b"{\"id\":1}").unwrap();
//! assert_eq!(frame.as_ref(), b"event\n{\"id\":1}");
//!
//! let message = decode(frame).unwrap();
//! assert_eq!(message.msg_type, "event");
//! assert_eq!(message.payload.as_ref(), b"{\"id\":1}");
//! ```
//!
//! Frames carry no length; they rely on the connection underneath to keep
//! message boundaries.

pub mod codec;
pub mod error;

pub use codec::{decode, decode_slice, encode, encode_message, Message, SEPARATOR};
pub use error::{FrameError, Result};
