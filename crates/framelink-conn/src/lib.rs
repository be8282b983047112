//! Discrete-message connections.
//!
//! A byte stream has no message boundaries; this crate adds them. Every
//! message travels as one record, and a dedicated close record signals a
//! graceful shutdown, so the layers above can rely on one read returning
//! exactly one message and can tell "peer going away" apart from a fault.
//!
//! - [`StreamConnection`] over Unix domain sockets or TCP (blocking)
//! - [`UdsListener`] / [`uds::connect`] for Unix socket endpoints
//! - [`AsyncStreamConnection`] over tokio (behind the `async` feature)
//!
//! The traits in [`traits`] are the seam the transport layer is written
//! against.

pub mod close;
pub mod connection;
pub mod error;
pub mod reader;
pub mod record;
pub mod socket;
pub mod traits;
pub mod writer;

#[cfg(unix)]
pub mod uds;

#[cfg(all(unix, feature = "async"))]
pub mod async_io;

pub use close::{CloseCode, CloseFrame};
pub use connection::{StreamConnection, StreamControl, StreamReader, StreamWriter};
pub use error::{ConnError, Result};
pub use record::{ConnConfig, Opcode, Record, DEFAULT_MAX_MESSAGE};
pub use socket::SocketStream;
pub use traits::{ConnectionControl, MessageConnection, MessageRead, MessageWrite};

#[cfg(unix)]
pub use uds::UdsListener;

#[cfg(all(unix, feature = "async"))]
pub use async_io::{AsyncStreamConnection, AsyncStreamReader, AsyncStreamWriter, RecordCodec};
