//! Type-tagged message transport over discrete-message socket connections.
//!
//! Messages are a type tag plus an opaque payload. A [`transport::Transport`]
//! carries them over one connection and may be shared by any number of
//! sending and receiving threads.
//!
//! # Crate Structure
//!
//! - [`conn`]: discrete-message connections over Unix sockets and TCP
//! - [`frame`]: the `<type>\n<payload>` frame codec
//! - [`transport`]: the concurrent-safe transport and its error taxonomy

/// Re-export connection types.
pub mod conn {
    pub use framelink_conn::*;
}

/// Re-export frame types.
pub mod frame {
    pub use framelink_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use framelink_transport::*;
}
