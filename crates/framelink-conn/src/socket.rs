use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// A connected byte stream: a Unix domain socket or a TCP socket.
pub struct SocketStream {
    inner: SocketStreamInner,
}

enum SocketStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Tcp(TcpStream),
}

impl Read for SocketStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            SocketStreamInner::Unix(stream) => stream.read(buf),
            SocketStreamInner::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for SocketStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            SocketStreamInner::Unix(stream) => stream.write(buf),
            SocketStreamInner::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            SocketStreamInner::Unix(stream) => stream.flush(),
            SocketStreamInner::Tcp(stream) => stream.flush(),
        }
    }
}

#[cfg(unix)]
impl From<std::os::unix::net::UnixStream> for SocketStream {
    fn from(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: SocketStreamInner::Unix(stream),
        }
    }
}

impl From<TcpStream> for SocketStream {
    fn from(stream: TcpStream) -> Self {
        // Records are written whole; don't let Nagle hold back the tail.
        let _ = stream.set_nodelay(true);
        Self {
            inner: SocketStreamInner::Tcp(stream),
        }
    }
}

impl SocketStream {
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        let timeout = timeout.map(non_zero);
        match &self.inner {
            #[cfg(unix)]
            SocketStreamInner::Unix(stream) => stream.set_read_timeout(timeout)?,
            SocketStreamInner::Tcp(stream) => stream.set_read_timeout(timeout)?,
        }
        Ok(())
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        let timeout = timeout.map(non_zero);
        match &self.inner {
            #[cfg(unix)]
            SocketStreamInner::Unix(stream) => stream.set_write_timeout(timeout)?,
            SocketStreamInner::Tcp(stream) => stream.set_write_timeout(timeout)?,
        }
        Ok(())
    }

    /// Duplicate the handle. Both handles refer to the same socket.
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            #[cfg(unix)]
            SocketStreamInner::Unix(stream) => SocketStreamInner::Unix(stream.try_clone()?),
            SocketStreamInner::Tcp(stream) => SocketStreamInner::Tcp(stream.try_clone()?),
        };
        Ok(Self { inner })
    }

    /// Shut the socket down. Affects every cloned handle.
    pub fn shutdown(&self, how: Shutdown) -> std::io::Result<()> {
        match &self.inner {
            #[cfg(unix)]
            SocketStreamInner::Unix(stream) => stream.shutdown(how),
            SocketStreamInner::Tcp(stream) => stream.shutdown(how),
        }
    }

    /// Socket family name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            SocketStreamInner::Unix(_) => "unix",
            SocketStreamInner::Tcp(_) => "tcp",
        }
    }
}

// std rejects a zero timeout; an already-expired budget still has to fail fast.
fn non_zero(timeout: Duration) -> Duration {
    timeout.max(Duration::from_millis(1))
}

impl std::fmt::Debug for SocketStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketStream")
            .field("kind", &self.kind())
            .finish()
    }
}
