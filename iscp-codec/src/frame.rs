//! eISCP frame encoding and decoding
//!
//! Wire layout of a frame:
//!
//! ```text
//! +--------+---------------+----------------+---------+----------+---------+
//! | "ISCP" | header length | payload length | version | reserved | payload |
//! | 4 B    | u32 BE (16)   | u32 BE         | 1 B (1) | 3 B (0)  | N B     |
//! +--------+---------------+----------------+---------+----------+---------+
//! ```
//!
//! The payload is `!1` + command + terminator. In raw mode the payload is sent
//! as-is without the binary header.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::command::Command;

/// Frame marker at the start of every header
pub const MAGIC: &[u8; 4] = b"ISCP";

/// Header length for protocol version 1
pub const HEADER_LEN: usize = 16;

/// Protocol version byte
pub const VERSION: u8 = 1;

/// Unit-type prefix; `1` addresses a receiver
pub const UNIT_PREFIX: &[u8; 2] = b"!1";

/// Default eISCP TCP port
pub const DEFAULT_PORT: u16 = 60128;

/// Payloads larger than this are treated as a corrupt header
const MAX_PAYLOAD_LEN: usize = 64 * 1024;

/// Line terminator appended to outgoing payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Terminator {
    /// `\r`
    #[default]
    Cr,
    /// `\r\n`
    CrLf,
}

impl Terminator {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Terminator::Cr => b"\r",
            Terminator::CrLf => b"\r\n",
        }
    }
}

/// Whether payloads travel inside the binary header or bare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Ethernet ISCP with the 16-byte header
    #[default]
    Eiscp,
    /// Bare ISCP text, as used over serial bridges
    Raw,
}

/// Parsed header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub header_len: usize,
    pub payload_len: usize,
    pub version: u8,
}

impl FrameHeader {
    /// Total frame size, or `None` if the lengths overflow
    pub fn frame_len(&self) -> Option<usize> {
        self.header_len.checked_add(self.payload_len)
    }
}

/// Result of scanning a buffer for frames
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Complete payloads, in arrival order
    pub payloads: Vec<Bytes>,
    /// Bytes at the front of the buffer that the caller may drop
    pub consumed: usize,
}

/// `!1` + command + terminator
pub fn encode_payload(command: &Command, terminator: Terminator) -> Bytes {
    let ascii = command.to_ascii();
    let term = terminator.as_bytes();
    let mut payload = BytesMut::with_capacity(UNIT_PREFIX.len() + ascii.len() + term.len());
    payload.put_slice(UNIT_PREFIX);
    payload.put_slice(&ascii);
    payload.put_slice(term);
    payload.freeze()
}

/// Header + payload for one command
pub fn encode_frame(command: &Command, terminator: Terminator) -> Bytes {
    let payload = encode_payload(command, terminator);

    let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
    frame.put_slice(MAGIC);
    frame.put_u32(HEADER_LEN as u32);
    frame.put_u32(payload.len() as u32);
    frame.put_u8(VERSION);
    frame.put_slice(&[0u8; 3]);
    frame.put_slice(&payload);

    trace!(command = %command, bytes = frame.len(), "encoded eISCP frame");
    frame.freeze()
}

/// Encode for the given framing mode
pub fn encode(command: &Command, framing: Framing, terminator: Terminator) -> Bytes {
    match framing {
        Framing::Eiscp => encode_frame(command, terminator),
        Framing::Raw => encode_payload(command, terminator),
    }
}

/// Read the header at the start of `buf`, if `buf` starts with a full header
pub fn decode_header(buf: &[u8]) -> Option<FrameHeader> {
    if buf.len() < HEADER_LEN || !buf.starts_with(MAGIC) {
        return None;
    }
    Some(FrameHeader {
        header_len: read_u32_be(&buf[4..8]) as usize,
        payload_len: read_u32_be(&buf[8..12]) as usize,
        version: buf[12],
    })
}

/// Extract every complete frame from `buf`
///
/// Scanning stops at the first frame whose header or payload is not fully
/// present; `consumed` then points at that frame's marker so the caller can
/// keep the tail for the next read. A buffer without any marker is consumed
/// entirely, except for a trailing partial marker.
pub fn decode_frames(buf: &[u8]) -> Decoded {
    let mut decoded = Decoded::default();
    let mut offset = 0;

    loop {
        let Some(start) = find_magic(buf, offset) else {
            // A marker may be split across reads
            decoded.consumed = buf.len() - partial_magic_suffix(&buf[offset.min(buf.len())..]);
            return decoded;
        };

        let Some(header) = decode_header(&buf[start..]) else {
            // Marker found but the header is still arriving
            decoded.consumed = start;
            return decoded;
        };

        let frame_len = match header.frame_len() {
            Some(len) if header.header_len >= HEADER_LEN && header.payload_len <= MAX_PAYLOAD_LEN => len,
            _ => {
                trace!(
                    header_len = header.header_len,
                    payload_len = header.payload_len,
                    "skipping corrupt eISCP header"
                );
                offset = start + MAGIC.len();
                continue;
            }
        };

        if buf.len() - start < frame_len {
            decoded.consumed = start;
            return decoded;
        }

        let payload_start = start + header.header_len;
        decoded
            .payloads
            .push(Bytes::copy_from_slice(&buf[payload_start..start + frame_len]));
        offset = start + frame_len;
    }
}

/// Incremental decoder that keeps incomplete tails between reads
#[derive(Debug, Default)]
pub struct FrameDecoder {
    framing: Framing,
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buffer: BytesMut::new(),
        }
    }

    /// Append received bytes and return the payloads completed by them
    ///
    /// Raw mode has no frame boundaries, so it only buffers; call
    /// [`FrameDecoder::finish`] once reading is done.
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(data);
        if self.framing == Framing::Raw {
            return Vec::new();
        }

        let decoded = decode_frames(&self.buffer);
        let _ = self.buffer.split_to(decoded.consumed);
        decoded.payloads
    }

    /// Flush at end of input
    ///
    /// In raw mode the whole buffer is one payload. In eISCP mode an
    /// incomplete trailing frame is dropped.
    pub fn finish(&mut self) -> Vec<Bytes> {
        let rest = self.buffer.split().freeze();
        match self.framing {
            Framing::Raw if !rest.is_empty() => vec![rest],
            Framing::Raw => Vec::new(),
            Framing::Eiscp => {
                if !rest.is_empty() {
                    trace!(bytes = rest.len(), "dropping incomplete eISCP frame");
                }
                Vec::new()
            }
        }
    }

    /// Bytes held back waiting for more data
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn find_magic(buf: &[u8], from: usize) -> Option<usize> {
    if from >= buf.len() {
        return None;
    }
    buf[from..]
        .windows(MAGIC.len())
        .position(|w| w == MAGIC)
        .map(|pos| from + pos)
}

/// Length of the longest suffix of `buf` that starts a marker
fn partial_magic_suffix(buf: &[u8]) -> usize {
    (1..MAGIC.len())
        .rev()
        .find(|&len| buf.len() >= len && buf.ends_with(&MAGIC[..len]))
        .unwrap_or(0)
}

fn read_u32_be(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
