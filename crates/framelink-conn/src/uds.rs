use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::connection::StreamConnection;
use crate::error::{ConnError, Result};
use crate::record::ConnConfig;

/// Maximum socket path length (`sockaddr_un.sun_path`).
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

/// A listening Unix domain socket that yields [`StreamConnection`]s.
///
/// The socket file is removed on drop, unless something else has replaced it
/// at the same path in the meantime.
pub struct UdsListener {
    listener: UnixListener,
    path: PathBuf,
    identity: (u64, u64),
    config: ConnConfig,
}

impl UdsListener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

    /// Bind with the default socket mode.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind and listen, replacing a stale socket file at `path` if present.
    ///
    /// Regular files at `path` are never removed.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let len = path.as_os_str().len();
        if len >= MAX_PATH_LEN {
            return Err(ConnError::PathTooLong {
                path,
                len,
                max: MAX_PATH_LEN,
            });
        }

        let bind_err = |source: std::io::Error| ConnError::Bind {
            path: path.clone(),
            source,
        };

        match std::fs::symlink_metadata(&path) {
            Ok(metadata) if metadata.file_type().is_socket() => {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(bind_err)?;
            }
            Ok(_) => {
                return Err(bind_err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(bind_err(err)),
        }

        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(bind_err)?;
        let metadata = std::fs::symlink_metadata(&path).map_err(bind_err)?;

        info!(?path, "listening on unix domain socket");

        Ok(Self {
            listener,
            identity: (metadata.dev(), metadata.ino()),
            path,
            config: ConnConfig::default(),
        })
    }

    /// Configuration handed to every accepted connection.
    pub fn with_config(mut self, config: ConnConfig) -> Self {
        self.config = config;
        self
    }

    /// Accept the next connection (blocking).
    pub fn accept(&self) -> Result<StreamConnection> {
        let (stream, _addr) = self.listener.accept().map_err(ConnError::Accept)?;
        debug!(path = ?self.path, "accepted connection");
        Ok(StreamConnection::with_config(stream, self.config.clone()))
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UdsListener {
    fn drop(&mut self) {
        let Ok(metadata) = std::fs::symlink_metadata(&self.path) else {
            return;
        };
        if metadata.file_type().is_socket() && (metadata.dev(), metadata.ino()) == self.identity {
            debug!(path = ?self.path, "removing socket file");
            let _ = std::fs::remove_file(&self.path);
        } else {
            debug!(path = ?self.path, "socket path replaced; leaving it in place");
        }
    }
}

/// Connect to a listening Unix domain socket (blocking).
pub fn connect(path: impl AsRef<Path>) -> Result<StreamConnection> {
    connect_with_config(path, ConnConfig::default())
}

/// Connect with explicit connection configuration.
pub fn connect_with_config(path: impl AsRef<Path>, config: ConnConfig) -> Result<StreamConnection> {
    let path = path.as_ref();
    let stream = UnixStream::connect(path).map_err(|source| ConnError::Connect {
        addr: path.display().to_string(),
        source,
    })?;
    debug!(?path, "connected to unix domain socket");
    Ok(StreamConnection::with_config(stream, config))
}
