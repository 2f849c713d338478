use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use tracing::debug;

use crate::codec::{parse_protocol_header, protocol_header, PROTOCOL_HEADER_LEN, PROTO_REP, PROTO_REQ};
use crate::error::{Result, SpError};
use crate::stream::SpStream;

/// Protocol a socket of kind `protocol` accepts as its peer.
pub fn peer_protocol(protocol: u16) -> Option<u16> {
    match protocol {
        PROTO_REQ => Some(PROTO_REP),
        PROTO_REP => Some(PROTO_REQ),
        _ => None,
    }
}

/// Exchange protocol headers over any stream.
///
/// Both sides send their header first, then read the peer's, so the exchange
/// cannot deadlock regardless of which side connected.
pub fn exchange_headers<S: Read + Write>(stream: &mut S, local: u16) -> Result<u16> {
    stream
        .write_all(&protocol_header(local))
        .map_err(handshake_io)?;
    stream.flush().map_err(handshake_io)?;

    let mut header = [0u8; PROTOCOL_HEADER_LEN];
    stream.read_exact(&mut header).map_err(handshake_io)?;
    parse_protocol_header(&header)
}

/// Run the SP handshake on a connected stream as protocol `local`.
///
/// Fails unless the peer announces the matching protocol. `timeout` bounds
/// the header exchange and is cleared afterwards.
pub fn handshake(stream: &mut SpStream, local: u16, timeout: Duration) -> Result<()> {
    let expected = peer_protocol(local)
        .ok_or_else(|| SpError::Handshake(format!("unsupported local protocol {local:#06x}")))?;

    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;

    let peer = exchange_headers(stream, local).map_err(|err| match err {
        SpError::Io(io) if is_timeout(&io) => SpError::Timeout(timeout),
        other => other,
    })?;
    if peer != expected {
        return Err(SpError::Handshake(format!(
            "peer protocol {peer:#06x} is incompatible (expected {expected:#06x})"
        )));
    }

    stream.set_read_timeout(None)?;
    stream.set_write_timeout(None)?;
    debug!(local, peer, transport = ?stream.transport(), "sp handshake complete");
    Ok(())
}

fn handshake_io(err: std::io::Error) -> SpError {
    if err.kind() == ErrorKind::UnexpectedEof {
        return SpError::Handshake("peer closed during handshake".to_string());
    }
    SpError::Io(err)
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Stream whose reads come from a fixed script and whose writes are captured.
    struct Scripted {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Scripted {
        fn new(input: &[u8]) -> Self {
            Self {
                input: Cursor::new(input.to_vec()),
                output: Vec::new(),
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn exchange_sends_own_header_and_parses_peer() {
        let mut stream = Scripted::new(&protocol_header(PROTO_REQ));
        let peer = exchange_headers(&mut stream, PROTO_REP).unwrap();

        assert_eq!(peer, PROTO_REQ);
        assert_eq!(stream.output, protocol_header(PROTO_REP).to_vec());
    }

    #[test]
    fn peer_closing_early_is_handshake_error() {
        let mut stream = Scripted::new(&[0x00, b'S']);
        let err = exchange_headers(&mut stream, PROTO_REP).unwrap_err();
        assert!(matches!(err, SpError::Handshake(_)));
    }

    #[test]
    fn peer_protocol_pairs() {
        assert_eq!(peer_protocol(PROTO_REP), Some(PROTO_REQ));
        assert_eq!(peer_protocol(PROTO_REQ), Some(PROTO_REP));
        assert_eq!(peer_protocol(0x0010), None);
    }

    #[cfg(unix)]
    #[test]
    fn rejects_same_protocol_peer() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut left = SpStream::from_unix(left);
        let mut right = SpStream::from_unix(right);

        let other = std::thread::spawn(move || handshake(&mut right, PROTO_REP, Duration::from_secs(2)));
        let err = handshake(&mut left, PROTO_REP, Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, SpError::Handshake(_)));
        assert!(other.join().unwrap().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn silent_peer_times_out() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut left = SpStream::from_unix(left);

        let err = handshake(&mut left, PROTO_REQ, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, SpError::Timeout(_)));
    }

    #[cfg(unix)]
    #[test]
    fn req_rep_pair_completes() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut left = SpStream::from_unix(left);
        let mut right = SpStream::from_unix(right);

        let server = std::thread::spawn(move || handshake(&mut right, PROTO_REP, Duration::from_secs(2)));
        handshake(&mut left, PROTO_REQ, Duration::from_secs(2)).unwrap();
        server.join().unwrap().unwrap();
    }
}
