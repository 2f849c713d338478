use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::error::Result;

/// The transport a connection runs over. Message framing differs per transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Ipc,
    Tcp,
}

/// A connected SP stream. Implements Read + Write.
///
/// On Unix, `ipc://` endpoints use Unix domain sockets; `tcp://` endpoints
/// use TCP everywhere.
pub struct SpStream {
    inner: SpStreamInner,
}

enum SpStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Tcp(TcpStream),
}

impl Read for SpStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            SpStreamInner::Unix(stream) => stream.read(buf),
            SpStreamInner::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for SpStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            SpStreamInner::Unix(stream) => stream.write(buf),
            SpStreamInner::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            SpStreamInner::Unix(stream) => stream.flush(),
            SpStreamInner::Tcp(stream) => stream.flush(),
        }
    }
}

/// Writes through a shared handle, so replies can be written without holding
/// the lock that guards the connection map.
impl Write for &SpStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &self.inner {
            #[cfg(unix)]
            SpStreamInner::Unix(stream) => (&*stream).write(buf),
            SpStreamInner::Tcp(stream) => (&*stream).write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &self.inner {
            #[cfg(unix)]
            SpStreamInner::Unix(stream) => (&*stream).flush(),
            SpStreamInner::Tcp(stream) => (&*stream).flush(),
        }
    }
}

impl SpStream {
    #[cfg(unix)]
    pub(crate) fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: SpStreamInner::Unix(stream),
        }
    }

    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        // request/reply latency matters more than segment count
        let _ = stream.set_nodelay(true);
        Self {
            inner: SpStreamInner::Tcp(stream),
        }
    }

    /// The transport this stream runs over.
    pub fn transport(&self) -> Transport {
        match &self.inner {
            #[cfg(unix)]
            SpStreamInner::Unix(_) => Transport::Ipc,
            SpStreamInner::Tcp(_) => Transport::Tcp,
        }
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            SpStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            SpStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            SpStreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            SpStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            SpStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
            SpStreamInner::Tcp(stream) => Ok(Self::from_tcp(stream.try_clone()?)),
        }
    }

    /// Shut down both directions, unblocking any reader on a cloned handle.
    pub fn shutdown(&self) {
        match &self.inner {
            #[cfg(unix)]
            SpStreamInner::Unix(stream) => {
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }
            SpStreamInner::Tcp(stream) => {
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }
        }
    }
}

impl std::fmt::Debug for SpStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            #[cfg(unix)]
            SpStreamInner::Unix(_) => f.debug_struct("SpStream").field("type", &"ipc").finish(),
            SpStreamInner::Tcp(stream) => f
                .debug_struct("SpStream")
                .field("type", &"tcp")
                .field("peer", &stream.peer_addr().ok())
                .finish(),
        }
    }
}
