//! eISCP codec for Onkyo/Pioneer AV receivers
//!
//! This crate contains the wire-level pieces of the Integra Serial Control
//! Protocol as spoken over TCP: the command model, the 16-byte frame header,
//! and a decoder that tolerates partial reads.
//!
//! ```rust
//! use iscp_codec::{decode_frames, encode_frame, Command, Terminator};
//!
//! let frame = encode_frame(&Command::power(true), Terminator::Cr);
//! let decoded = decode_frames(&frame);
//! assert_eq!(&decoded.payloads[0][..], b"!1PWR01\r");
//! ```

mod command;
mod error;
mod frame;

pub use command::{Command, INPUT, MUTE, POWER, QUERY, VOLUME};
pub use error::{CodecError, Result};
pub use frame::{
    decode_frames, decode_header, encode, encode_frame, encode_payload, Decoded, FrameDecoder,
    FrameHeader, Framing, Terminator, DEFAULT_PORT, HEADER_LEN, MAGIC, UNIT_PREFIX, VERSION,
};
