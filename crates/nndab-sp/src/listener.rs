use std::net::TcpListener;
#[cfg(unix)]
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
#[cfg(unix)]
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::endpoint::Endpoint;
use crate::error::{Result, SpError};
use crate::stream::SpStream;

/// Default permission mode for created socket paths. Local clients of the
/// bridge run as other users, so the socket is world-connectable.
pub const DEFAULT_SOCKET_MODE: u32 = 0o666;

/// Maximum socket path length.
/// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

/// A bound, listening endpoint.
pub enum Listener {
    #[cfg(unix)]
    Ipc(UnixListener),
    Tcp(TcpListener),
}

impl Listener {
    /// Bind `endpoint` and start listening.
    ///
    /// For `ipc://` endpoints a stale socket file at the path is removed
    /// first; any other kind of file at the path is left alone and the bind
    /// fails. The returned guard removes the socket file again on drop.
    pub fn bind(endpoint: &Endpoint) -> Result<(Self, Option<SocketPathGuard>)> {
        match endpoint {
            #[cfg(unix)]
            Endpoint::Ipc(path) => {
                let (listener, guard) = bind_unix(path, endpoint)?;
                Ok((Self::Ipc(listener), Some(guard)))
            }
            #[cfg(not(unix))]
            Endpoint::Ipc(_) => Err(SpError::Bind {
                endpoint: endpoint.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "ipc endpoints require Unix domain sockets",
                ),
            }),
            Endpoint::Tcp(addr) => {
                let listener = TcpListener::bind(addr.as_str()).map_err(|source| SpError::Bind {
                    endpoint: endpoint.to_string(),
                    source,
                })?;
                info!(%endpoint, local = ?listener.local_addr().ok(), "listening on tcp");
                Ok((Self::Tcp(listener), None))
            }
        }
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<SpStream> {
        match self {
            #[cfg(unix)]
            Listener::Ipc(listener) => {
                let (stream, _addr) = listener.accept()?;
                debug!("accepted ipc connection");
                Ok(SpStream::from_unix(stream))
            }
            Listener::Tcp(listener) => {
                let (stream, addr) = listener.accept()?;
                debug!(%addr, "accepted tcp connection");
                Ok(SpStream::from_tcp(stream))
            }
        }
    }

    /// The endpoint actually bound, with any ephemeral TCP port resolved.
    pub fn local_endpoint(&self, requested: &Endpoint) -> Endpoint {
        match self {
            #[cfg(unix)]
            Listener::Ipc(_) => requested.clone(),
            Listener::Tcp(listener) => listener
                .local_addr()
                .map(|addr| Endpoint::Tcp(addr.to_string()))
                .unwrap_or_else(|_| requested.clone()),
        }
    }
}

#[cfg(unix)]
fn bind_unix(path: &Path, endpoint: &Endpoint) -> Result<(UnixListener, SocketPathGuard)> {
    let bind_err = |source: std::io::Error| SpError::Bind {
        endpoint: endpoint.to_string(),
        source,
    };

    let path_bytes = path.as_os_str().len();
    if path_bytes >= MAX_PATH_LEN {
        return Err(SpError::PathTooLong {
            path: path.to_path_buf(),
            len: path_bytes,
            max: MAX_PATH_LEN,
        });
    }

    // Remove stale socket if it exists, but never remove non-socket files.
    if let Ok(metadata) = std::fs::symlink_metadata(path) {
        if metadata.file_type().is_socket() {
            debug!(?path, "removing stale socket");
            std::fs::remove_file(path).map_err(bind_err)?;
        } else {
            return Err(bind_err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "existing path is not a unix socket",
            )));
        }
    }

    let listener = UnixListener::bind(path).map_err(bind_err)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(DEFAULT_SOCKET_MODE))
        .map_err(bind_err)?;
    let created = std::fs::symlink_metadata(path).map_err(bind_err)?;

    info!(?path, "listening on unix domain socket");

    Ok((
        listener,
        SocketPathGuard {
            path: path.to_path_buf(),
            created_inode: (created.dev(), created.ino()),
        },
    ))
}

/// Removes a socket file created by [`Listener::bind`] when dropped, unless
/// the path has since been replaced by something else.
#[derive(Debug)]
pub struct SocketPathGuard {
    path: PathBuf,
    created_inode: (u64, u64),
}

impl SocketPathGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
impl Drop for SocketPathGuard {
    fn drop(&mut self) {
        let (expected_dev, expected_ino) = self.created_inode;
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
            }
        }
    }
}
