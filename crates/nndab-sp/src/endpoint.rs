use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::SpError;
use crate::stream::Transport;

/// Local endpoint the bridge listens on by default.
pub const DEFAULT_IPC_ENDPOINT: &str = "ipc:///cache/nndab";

/// Network endpoint the bridge listens on by default.
pub const DEFAULT_TCP_ENDPOINT: &str = "tcp://0.0.0.0:12000";

/// An SP endpoint address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Unix domain socket at a filesystem path.
    Ipc(PathBuf),
    /// TCP `host:port`.
    Tcp(String),
}

impl Endpoint {
    pub fn ipc(path: impl AsRef<Path>) -> Self {
        Self::Ipc(path.as_ref().to_path_buf())
    }

    pub fn tcp(addr: impl Into<String>) -> Self {
        Self::Tcp(addr.into())
    }

    pub fn transport(&self) -> Transport {
        match self {
            Endpoint::Ipc(_) => Transport::Ipc,
            Endpoint::Tcp(_) => Transport::Tcp,
        }
    }
}

impl FromStr for Endpoint {
    type Err = SpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SpError::InvalidEndpoint(s.to_string());

        if let Some(path) = s.strip_prefix("ipc://") {
            if path.is_empty() {
                return Err(invalid());
            }
            return Ok(Self::Ipc(PathBuf::from(path)));
        }

        if let Some(addr) = s.strip_prefix("tcp://") {
            let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
            port.parse::<u16>().map_err(|_| invalid())?;
            // nanomsg spells "all interfaces" as `*`
            let host = match host {
                "" => return Err(invalid()),
                "*" => "0.0.0.0",
                other => other,
            };
            return Ok(Self::Tcp(format!("{host}:{port}")));
        }

        Err(invalid())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Ipc(path) => write!(f, "ipc://{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_defaults() {
        let ipc: Endpoint = DEFAULT_IPC_ENDPOINT.parse().unwrap();
        assert_eq!(ipc, Endpoint::ipc("/cache/nndab"));
        assert_eq!(ipc.transport(), Transport::Ipc);

        let tcp: Endpoint = DEFAULT_TCP_ENDPOINT.parse().unwrap();
        assert_eq!(tcp, Endpoint::tcp("0.0.0.0:12000"));
        assert_eq!(tcp.transport(), Transport::Tcp);
    }

    #[test]
    fn wildcard_host_means_all_interfaces() {
        let tcp: Endpoint = "tcp://*:5555".parse().unwrap();
        assert_eq!(tcp, Endpoint::tcp("0.0.0.0:5555"));
    }

    #[test]
    fn display_roundtrips() {
        for input in ["ipc:///tmp/x.sock", "tcp://127.0.0.1:9"] {
            let ep: Endpoint = input.parse().unwrap();
            assert_eq!(ep.to_string(), input);
        }
    }

    #[test]
    fn rejects_malformed_endpoints() {
        for input in [
            "",
            "ipc://",
            "tcp://localhost",
            "tcp://:80",
            "tcp://host:notaport",
            "ws://host:1",
            "/tmp/x.sock",
        ] {
            let err = input.parse::<Endpoint>().unwrap_err();
            assert!(matches!(err, SpError::InvalidEndpoint(_)), "{input}");
        }
    }
}
