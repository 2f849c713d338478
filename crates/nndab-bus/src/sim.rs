use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

/// Produces the response payload for a request payload written to the bus.
///
/// Returning `None` leaves the device queue untouched.
pub type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

/// A canned result for the next `read` call, bypassing the device model.
#[derive(Debug, Clone)]
pub enum ScriptedRead {
    /// Copy these bytes (truncated to the caller's buffer) and report their count.
    Bytes(Vec<u8>),
    /// Fail the read with this error kind.
    Error(ErrorKind),
}

/// Counters and captured writes for a [`SimulatedBus`].
#[derive(Debug, Default, Clone)]
pub struct BusStats {
    /// Number of `read` calls, scripted ones included.
    pub reads: usize,
    /// Reads that reported an empty queue.
    pub empty_reads: usize,
    /// Packets removed from the queue by a covering read.
    pub consumed: usize,
    /// Bytes accepted by each `write` call, in order.
    pub writes: Vec<Vec<u8>>,
}

/// In-memory model of the DAB module's packet queue.
///
/// The model reproduces the transfer semantics the bridge depends on:
/// - every read reports exactly `buf.len()` bytes
/// - an empty queue reads as zeros, i.e. a zero length header
/// - a read shorter than the head packet copies its prefix but leaves it queued
/// - a read covering the whole head packet removes it from the queue
///
/// Writes are captured and, when a responder is installed, a well-formed
/// request frame queues the responder's payload as the next packet.
pub struct SimulatedBus {
    queue: VecDeque<Bytes>,
    scripted: VecDeque<ScriptedRead>,
    busy_polls: usize,
    response_delay: usize,
    write_limit: Option<usize>,
    responder: Option<Responder>,
    stats: BusStats,
}

impl SimulatedBus {
    /// A device with an empty queue and no responder.
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            scripted: VecDeque::new(),
            busy_polls: 0,
            response_delay: 0,
            write_limit: None,
            responder: None,
            stats: BusStats::default(),
        }
    }

    /// A device that answers every request with the request payload.
    pub fn echo() -> Self {
        Self::new().with_responder(|payload| Some(payload.to_vec()))
    }

    /// Install a responder invoked for every complete request frame.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Report an empty queue for `polls` reads after each answered request.
    pub fn with_response_delay(mut self, polls: usize) -> Self {
        self.response_delay = polls;
        self
    }

    /// Accept at most `limit` bytes per write call.
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    /// Queue a well-formed packet carrying `payload`.
    pub fn push_packet(&mut self, payload: &[u8]) {
        match encode_packet(payload) {
            Some(packet) => self.queue.push_back(packet),
            None => warn!(size = payload.len(), "simulated packet too large; dropped"),
        }
    }

    /// Queue raw wire bytes as one packet, whatever their header says.
    pub fn push_raw_packet(&mut self, wire: impl Into<Bytes>) {
        self.queue.push_back(wire.into());
    }

    /// Answer the next read with `bytes` instead of consulting the queue.
    pub fn script_read(&mut self, bytes: impl Into<Vec<u8>>) {
        self.scripted.push_back(ScriptedRead::Bytes(bytes.into()));
    }

    /// Fail the next read with `kind`.
    pub fn script_error(&mut self, kind: ErrorKind) {
        self.scripted.push_back(ScriptedRead::Error(kind));
    }

    /// Number of packets still queued.
    pub fn pending_packets(&self) -> usize {
        self.queue.len()
    }

    /// Transfer statistics so far.
    pub fn stats(&self) -> &BusStats {
        &self.stats
    }

    fn answer(&mut self, frame: &[u8]) {
        let Some(responder) = self.responder.as_mut() else {
            return;
        };
        let Some(payload) = request_payload(frame) else {
            debug!(size = frame.len(), "simulated device ignoring malformed request");
            return;
        };
        if let Some(response) = responder(payload) {
            self.push_packet(&response);
            self.busy_polls = self.response_delay;
        }
    }
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for SimulatedBus {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stats.reads += 1;

        if let Some(scripted) = self.scripted.pop_front() {
            return match scripted {
                ScriptedRead::Bytes(bytes) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                ScriptedRead::Error(kind) => Err(kind.into()),
            };
        }

        buf.fill(0);
        if self.busy_polls > 0 {
            self.busy_polls -= 1;
            self.stats.empty_reads += 1;
            return Ok(buf.len());
        }

        let Some(head) = self.queue.front() else {
            self.stats.empty_reads += 1;
            return Ok(buf.len());
        };

        let n = head.len().min(buf.len());
        buf[..n].copy_from_slice(&head[..n]);
        if buf.len() >= head.len() {
            self.queue.pop_front();
            self.stats.consumed += 1;
        }
        Ok(buf.len())
    }
}

impl Write for SimulatedBus {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let accepted = self
            .write_limit
            .map_or(buf.len(), |limit| limit.min(buf.len()));
        self.stats.writes.push(buf[..accepted].to_vec());

        if accepted == buf.len() {
            self.answer(buf);
        }
        Ok(accepted)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for SimulatedBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedBus")
            .field("queued", &self.queue.len())
            .field("scripted", &self.scripted.len())
            .field("busy_polls", &self.busy_polls)
            .field("has_responder", &self.responder.is_some())
            .finish()
    }
}

fn encode_packet(payload: &[u8]) -> Option<Bytes> {
    let len = u16::try_from(payload.len()).ok()?;
    let mut packet = BytesMut::with_capacity(2 + payload.len());
    packet.put_u16(len);
    packet.put_slice(payload);
    Some(packet.freeze())
}

fn request_payload(frame: &[u8]) -> Option<&[u8]> {
    let (header, payload) = frame.split_first_chunk::<2>()?;
    (usize::from(u16::from_be_bytes(*header)) == payload.len()).then_some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_queue_reads_as_zero_header() {
        let mut bus = SimulatedBus::new();
        let mut header = [0xFFu8; 2];

        assert_eq!(bus.read(&mut header).unwrap(), 2);
        assert_eq!(header, [0, 0]);
        assert_eq!(bus.stats().empty_reads, 1);
    }

    #[test]
    fn header_peek_does_not_consume() {
        let mut bus = SimulatedBus::new();
        bus.push_packet(&[0xAA, 0xBB]);

        let mut header = [0u8; 2];
        bus.read(&mut header).unwrap();
        bus.read(&mut header).unwrap();
        assert_eq!(header, [0x00, 0x02]);
        assert_eq!(bus.pending_packets(), 1);

        let mut whole = [0u8; 4];
        assert_eq!(bus.read(&mut whole).unwrap(), 4);
        assert_eq!(whole, [0x00, 0x02, 0xAA, 0xBB]);
        assert_eq!(bus.pending_packets(), 0);
        assert_eq!(bus.stats().consumed, 1);
    }

    #[test]
    fn echo_responder_queues_response_after_delay() {
        let mut bus = SimulatedBus::echo().with_response_delay(2);
        assert_eq!(bus.write(&[0x00, 0x01, 0x7F]).unwrap(), 3);

        let mut header = [0u8; 2];
        bus.read(&mut header).unwrap();
        assert_eq!(header, [0, 0]);
        bus.read(&mut header).unwrap();
        assert_eq!(header, [0, 0]);
        bus.read(&mut header).unwrap();
        assert_eq!(header, [0x00, 0x01]);
    }

    #[test]
    fn truncated_write_is_not_answered() {
        let mut bus = SimulatedBus::echo().with_write_limit(2);
        assert_eq!(bus.write(&[0x00, 0x02, 0x01, 0x02]).unwrap(), 2);
        assert_eq!(bus.pending_packets(), 0);
        assert_eq!(bus.stats().writes, vec![vec![0x00, 0x02]]);
    }

    #[test]
    fn malformed_request_is_ignored() {
        let mut bus = SimulatedBus::echo();
        bus.write(&[0x00, 0x05, 0x01]).unwrap();
        assert_eq!(bus.pending_packets(), 0);
    }

    #[test]
    fn scripted_reads_take_precedence() {
        let mut bus = SimulatedBus::new();
        bus.push_packet(b"queued");
        bus.script_read(vec![0x01]);
        bus.script_error(ErrorKind::TimedOut);

        let mut buf = [0u8; 2];
        assert_eq!(bus.read(&mut buf).unwrap(), 1);
        let err = bus.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
        assert_eq!(bus.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [0x00, 0x06]);
    }
}
