//! Concurrent-safe, type-tagged message transport.
//!
//! A [`Transport`] wraps one discrete-message connection and exposes
//! `send`/`receive` of type-tagged messages that any number of threads may
//! call at once. Reads and writes are guarded separately, so a receiver
//! blocked waiting for traffic never holds up a sender.
//!
//! Every failure is one of three kinds:
//!
//! - [`ClosedError`]: a graceful shutdown by either side; the transport is done.
//! - [`ConnectionError`]: anything else wrong with the connection.
//! - [`FrameError`](framelink_frame::FrameError): one message could not be
//!   encoded or decoded; the connection is unaffected.
//!
//! ```no_run
//! use framelink_conn::uds;
//! use framelink_transport::{Context, Transport};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Transport::new(uds::connect("/tmp/app.sock")?)?;
//! transport.send(&Context::background(), "event", b"{\"id\":1}")?;
//! let reply = transport.receive(&Context::background())?;
//! println!("{}: {} bytes", reply.msg_type, reply.payload.len());
//! transport.close()?;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod error;
pub mod lifecycle;
pub mod transport;

#[cfg(all(unix, feature = "async"))]
pub mod async_transport;

pub use context::Context;
pub use error::{ClosedError, ConnectionError, ConnectionErrorKind, Result, TransportError};
pub use framelink_frame::Message;
pub use lifecycle::TransportState;
pub use transport::{Transport, CLOSE_REASON, CLOSE_WRITE_TIMEOUT};

#[cfg(all(unix, feature = "async"))]
pub use async_transport::AsyncTransport;
