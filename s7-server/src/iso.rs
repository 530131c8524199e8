//! ISO-on-TCP framing: TPKT (RFC 1006) around COTP (ISO 8073 class 0).

use std::io::{self, Read, Write};
use std::net::TcpStream;

use byteorder::{BigEndian, ByteOrder};

const TPKT_VERSION: u8 = 3;
const TPKT_HEADER_LEN: usize = 4;
/// TPKT length field is 16 bits; frames beyond this are a protocol error.
const MAX_FRAME: usize = 65_535;

const COTP_CONNECT_REQUEST: u8 = 0xe0;
const COTP_CONNECT_CONFIRM: u8 = 0xd0;
const COTP_DATA: u8 = 0xf0;

/// A parsed COTP TPDU.
pub enum Cotp<'a> {
    /// Connection request; `src_ref` is echoed back in the confirm.
    ConnectRequest { src_ref: u16 },
    /// Data TPDU carrying an S7 payload.
    Data { payload: &'a [u8] },
    /// Anything else; answered by dropping the connection.
    Other(u8),
}

/// Parses the COTP part of one TPKT payload.
pub fn parse_cotp(frame: &[u8]) -> Option<Cotp<'_>> {
    let header_len = *frame.first()? as usize;
    let pdu_type = *frame.get(1)?;
    if frame.len() < header_len + 1 {
        return None;
    }
    match pdu_type {
        COTP_CONNECT_REQUEST => {
            // dst-ref (2), src-ref (2), class (1) follow the type octet.
            if header_len < 6 {
                return None;
            }
            Some(Cotp::ConnectRequest {
                src_ref: BigEndian::read_u16(&frame[4..6]),
            })
        }
        COTP_DATA => Some(Cotp::Data {
            payload: &frame[header_len + 1..],
        }),
        other => Some(Cotp::Other(other)),
    }
}

fn tpkt(payload_len: usize) -> [u8; TPKT_HEADER_LEN] {
    let total = (TPKT_HEADER_LEN + payload_len) as u16;
    let mut header = [TPKT_VERSION, 0, 0, 0];
    BigEndian::write_u16(&mut header[2..4], total);
    header
}

/// Builds the connection confirm answering a connect request.
pub fn connect_confirm(src_ref: u16) -> Vec<u8> {
    let mut cotp = vec![
        6,
        COTP_CONNECT_CONFIRM,
        0,
        0, // dst-ref
        0,
        0, // src-ref (filled below)
        0, // class 0
    ];
    BigEndian::write_u16(&mut cotp[4..6], src_ref);
    let mut frame = tpkt(cotp.len()).to_vec();
    frame.extend_from_slice(&cotp);
    frame
}

/// Wraps an S7 message in a COTP data TPDU and a TPKT header.
pub fn data_frame(s7: &[u8]) -> Vec<u8> {
    let mut frame = tpkt(3 + s7.len()).to_vec();
    frame.extend_from_slice(&[2, COTP_DATA, 0x80]);
    frame.extend_from_slice(s7);
    frame
}

/// Writes one frame, honoring the socket's send timeout.
pub fn write_frame(stream: &mut TcpStream, frame: &[u8]) -> io::Result<()> {
    stream.write_all(frame)
}

/// One poll step of the receive side.
pub enum Poll {
    /// A complete TPKT payload (COTP + S7).
    Frame(Vec<u8>),
    /// Nothing complete yet; the socket read timed out.
    Pending,
    /// Peer closed the connection.
    Closed,
}

/// Accumulates socket bytes and extracts TPKT frames. Socket reads use the
/// stream's configured read timeout, so a caller polls at that cadence.
#[derive(Default)]
pub struct FrameReader {
    buf: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> FrameReader {
        FrameReader::default()
    }

    /// A frame has started arriving but is not complete yet.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }

    pub fn poll(&mut self, stream: &mut TcpStream) -> io::Result<Poll> {
        loop {
            if let Some(frame) = self.extract()? {
                return Ok(Poll::Frame(frame));
            }
            let mut scratch = [0u8; 4096];
            match stream.read(&mut scratch) {
                Ok(0) => return Ok(Poll::Closed),
                Ok(n) => self.buf.extend_from_slice(&scratch[..n]),
                Err(err)
                    if err.kind() == io::ErrorKind::WouldBlock
                        || err.kind() == io::ErrorKind::TimedOut =>
                {
                    return Ok(Poll::Pending)
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn extract(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.buf.len() < TPKT_HEADER_LEN {
            return Ok(None);
        }
        if self.buf[0] != TPKT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad TPKT version {}", self.buf[0]),
            ));
        }
        let total = BigEndian::read_u16(&self.buf[2..4]) as usize;
        if total < TPKT_HEADER_LEN + 1 || total > MAX_FRAME {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad TPKT length {total}"),
            ));
        }
        if self.buf.len() < total {
            return Ok(None);
        }
        let frame = self.buf[TPKT_HEADER_LEN..total].to_vec();
        self.buf.drain(..total);
        Ok(Some(frame))
    }
}
