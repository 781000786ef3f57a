// Wire format for the command-router link: direction-tagged frames and the
// typed messages carried inside them.
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub use crate::message::{
    ClientMessage, CommandSubscription, ErrorEnvelope, InstructionKey, ProcessingInstruction,
    SerializedPayload, ServerMessage, WireCommand, WireCommandResponse,
};

mod message;

pub const MAGIC: u32 = 0x43525731;
pub const VERSION: u16 = 1;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid magic number")]
    InvalidMagic,
    #[error("unsupported version {0}")]
    UnsupportedVersion(u16),
    #[error("unknown frame direction {0:#06x}")]
    UnknownDirection(u16),
    #[error("frame too large")]
    FrameTooLarge,
    #[error("incomplete frame")]
    Incomplete,
    #[error("frame direction flag mismatch")]
    DirectionMismatch,
    #[error("malformed message body: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Which side of the link produced a frame. Every frame is tagged so a peer
/// can reject traffic echoed back on the wrong half of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToRouter,
    FromRouter,
}

impl Direction {
    pub fn flag(self) -> u16 {
        match self {
            Direction::ToRouter => 0x1,
            Direction::FromRouter => 0x2,
        }
    }

    fn from_flag(flag: u16) -> Result<Self> {
        match flag {
            0x1 => Ok(Direction::ToRouter),
            0x2 => Ok(Direction::FromRouter),
            other => Err(Error::UnknownDirection(other)),
        }
    }
}

/// One unit on the wire: a 12-byte header (magic, version, direction flag,
/// body length) followed by an opaque message body.
///
/// ```
/// use bytes::Bytes;
/// use courier_wire::{Direction, Frame};
///
/// let frame = Frame::new(Direction::ToRouter, Bytes::from_static(b"{}")).expect("frame");
/// let decoded = Frame::decode(frame.encode()).expect("decode");
/// assert_eq!(decoded.direction(), Direction::ToRouter);
/// assert_eq!(decoded.payload(), &Bytes::from_static(b"{}"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    direction: Direction,
    payload: Bytes,
}

impl Frame {
    pub const HEADER_LEN: usize = 12;

    pub fn new(direction: Direction, payload: Bytes) -> Result<Self> {
        // The body length travels as a u32.
        if payload.len() > u32::MAX as usize {
            return Err(Error::FrameTooLarge);
        }
        Ok(Self { direction, payload })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::HEADER_LEN + self.payload.len());
        buf.put_u32(MAGIC);
        buf.put_u16(VERSION);
        buf.put_u16(self.direction.flag());
        buf.put_u32(self.payload.len() as u32);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    pub fn decode(input: Bytes) -> Result<Self> {
        if input.len() < Self::HEADER_LEN {
            return Err(Error::Incomplete);
        }
        let mut header = input.slice(0..Self::HEADER_LEN);
        if header.get_u32() != MAGIC {
            return Err(Error::InvalidMagic);
        }
        let version = header.get_u16();
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let direction = Direction::from_flag(header.get_u16())?;
        let length = header.get_u32() as usize;
        if input.len() < Self::HEADER_LEN + length {
            return Err(Error::Incomplete);
        }
        Ok(Self {
            direction,
            payload: input.slice(Self::HEADER_LEN..Self::HEADER_LEN + length),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_frame(magic: u32, version: u16, flag: u16, length: u32, body: &[u8]) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u32(magic);
        buf.put_u16(version);
        buf.put_u16(flag);
        buf.put_u32(length);
        buf.extend_from_slice(body);
        buf.freeze()
    }

    #[test]
    fn round_trip_keeps_direction_and_body() {
        let frame =
            Frame::new(Direction::FromRouter, Bytes::from_static(b"{\"a\":1}")).expect("frame");
        let decoded = Frame::decode(frame.encode()).expect("decode");
        assert_eq!(decoded.direction(), Direction::FromRouter);
        assert_eq!(decoded.payload(), &Bytes::from_static(b"{\"a\":1}"));
    }

    #[test]
    fn decode_rejects_invalid_magic() {
        let raw = raw_frame(0xDEADBEEF, VERSION, 0x1, 0, b"");
        assert!(matches!(Frame::decode(raw), Err(Error::InvalidMagic)));
    }

    #[test]
    fn decode_rejects_unsupported_version() {
        let raw = raw_frame(MAGIC, 7, 0x1, 0, b"");
        assert!(matches!(Frame::decode(raw), Err(Error::UnsupportedVersion(7))));
    }

    #[test]
    fn decode_rejects_unknown_direction() {
        let raw = raw_frame(MAGIC, VERSION, 0x4, 0, b"");
        assert!(matches!(
            Frame::decode(raw),
            Err(Error::UnknownDirection(0x4))
        ));
    }

    #[test]
    fn decode_rejects_short_header() {
        assert!(matches!(
            Frame::decode(Bytes::from_static(b"short")),
            Err(Error::Incomplete)
        ));
    }

    #[test]
    fn decode_rejects_truncated_body() {
        let raw = raw_frame(MAGIC, VERSION, 0x2, 9, b"tiny");
        assert!(matches!(Frame::decode(raw), Err(Error::Incomplete)));
    }

    #[test]
    fn trailing_bytes_beyond_the_declared_length_are_ignored() {
        let raw = raw_frame(MAGIC, VERSION, 0x1, 2, b"{}extra");
        let frame = Frame::decode(raw).expect("decode");
        assert_eq!(frame.payload(), &Bytes::from_static(b"{}"));
    }
}
