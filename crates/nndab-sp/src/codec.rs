use std::io::{ErrorKind, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, SpError};
use crate::stream::Transport;

/// Protocol id of a REQ socket.
pub const PROTO_REQ: u16 = 0x0030;

/// Protocol id of a REP socket.
pub const PROTO_REP: u16 = 0x0031;

/// Length of the protocol header exchanged on connect.
pub const PROTOCOL_HEADER_LEN: usize = 8;

/// Largest inbound message accepted by default: 1 MiB, nanomsg's default.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Message type byte that precedes every IPC message.
const IPC_MSG_NORMAL: u8 = 0x01;

/// Build the protocol header announcing `protocol`.
pub fn protocol_header(protocol: u16) -> [u8; PROTOCOL_HEADER_LEN] {
    let [hi, lo] = protocol.to_be_bytes();
    [0x00, b'S', b'P', 0x00, hi, lo, 0x00, 0x00]
}

/// Parse a peer's protocol header and return its protocol id.
pub fn parse_protocol_header(header: &[u8; PROTOCOL_HEADER_LEN]) -> Result<u16> {
    if header[..4] != [0x00, b'S', b'P', 0x00] || header[6..] != [0x00, 0x00] {
        return Err(SpError::Handshake(format!(
            "bad protocol header {:02x?}",
            header
        )));
    }
    Ok(u16::from_be_bytes([header[4], header[5]]))
}

/// Encode one message whose body is the concatenation of `parts`.
///
/// Wire format:
/// ```text
/// tcp: ┌───────────────┬──────────────┐
///      │ Length (8B BE)│ Body         │
///      └───────────────┴──────────────┘
/// ipc: ┌──────┬───────────────┬──────────────┐
///      │ 0x01 │ Length (8B BE)│ Body         │
///      └──────┴───────────────┴──────────────┘
/// ```
pub fn encode_message(transport: Transport, parts: &[&[u8]], dst: &mut BytesMut) {
    let body_len: usize = parts.iter().map(|p| p.len()).sum();
    dst.reserve(9 + body_len);
    if transport == Transport::Ipc {
        dst.put_u8(IPC_MSG_NORMAL);
    }
    dst.put_u64(body_len as u64);
    for part in parts {
        dst.put_slice(part);
    }
}

/// Write one message in a single `write_all`.
pub fn write_message<W: Write>(writer: &mut W, transport: Transport, parts: &[&[u8]]) -> Result<()> {
    let mut buf = BytesMut::new();
    encode_message(transport, parts, &mut buf);
    writer.write_all(&buf).map_err(map_io)?;
    writer.flush().map_err(map_io)
}

/// Read one complete message body (blocking).
///
/// Returns `Err(SpError::Disconnected)` when the peer closes the stream.
pub fn read_message<R: Read>(reader: &mut R, transport: Transport, max_size: usize) -> Result<Bytes> {
    if transport == Transport::Ipc {
        let mut kind = [0u8; 1];
        reader.read_exact(&mut kind).map_err(map_io)?;
        if kind[0] != IPC_MSG_NORMAL {
            return Err(SpError::Malformed("unknown ipc message type"));
        }
    }

    let mut len = [0u8; 8];
    reader.read_exact(&mut len).map_err(map_io)?;
    let size = u64::from_be_bytes(len);
    if size > max_size as u64 {
        return Err(SpError::MessageTooLarge {
            size,
            max: max_size,
        });
    }

    let mut body = BytesMut::zeroed(size as usize);
    reader.read_exact(&mut body).map_err(map_io)?;
    Ok(body.freeze())
}

pub(crate) fn map_io(err: std::io::Error) -> SpError {
    match err.kind() {
        ErrorKind::UnexpectedEof
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe => SpError::Disconnected,
        _ => SpError::Io(err),
    }
}
