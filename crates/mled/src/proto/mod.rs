//! MLED/1 wire format.
//!
//! Every datagram is a fixed 32-byte [`Header`] followed by at most one
//! fixed-size payload. All multi-byte integers are little-endian.

mod header;
mod payloads;

pub use header::{
    HEADER_SIZE, Header, HeaderFlags, MAGIC, MessageType, PROTOCOL_VERSION, TargetMode,
};
pub use payloads::{
    Ack, CueFire, CuePrepare, PATTERN_DATA_LEN, PatternConfig, PatternType, Pong, TimeResp,
    WirePayload, encode_packet,
};

pub const DEFAULT_MULTICAST_GROUP: &str = "239.255.32.6";
pub const DEFAULT_MULTICAST_PORT: u16 = 4626;

/// Sender id used by the controller in every outgoing header.
pub const CONTROLLER_SENDER_ID: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtoError {
    #[error("short buffer decoding {what}: need {need} bytes, got {got}")]
    ShortBuffer {
        what: &'static str,
        need: usize,
        got: usize,
    },
    #[error("short destination encoding {what}: need {need} bytes, got {got}")]
    ShortDestination {
        what: &'static str,
        need: usize,
        got: usize,
    },
    #[error("bad magic: {0:02X?}")]
    BadMagic([u8; 4]),
    #[error("bad version: {0}")]
    BadVersion(u8),
    #[error("bad header length: {0}")]
    BadHeaderLen(u8),
}

pub(crate) fn check_src(what: &'static str, need: usize, src: &[u8]) -> Result<(), ProtoError> {
    if src.len() < need {
        return Err(ProtoError::ShortBuffer {
            what,
            need,
            got: src.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_dst(what: &'static str, need: usize, dst: &[u8]) -> Result<(), ProtoError> {
    if dst.len() < need {
        return Err(ProtoError::ShortDestination {
            what,
            need,
            got: dst.len(),
        });
    }
    Ok(())
}

// Callers check lengths first; these index directly.
#[inline]
pub(crate) fn get_u16(src: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([src[at], src[at + 1]])
}

#[inline]
pub(crate) fn get_u32(src: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([src[at], src[at + 1], src[at + 2], src[at + 3]])
}

#[inline]
pub(crate) fn put_u16(dst: &mut [u8], at: usize, value: u16) {
    dst[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub(crate) fn put_u32(dst: &mut [u8], at: usize, value: u32) {
    dst[at..at + 4].copy_from_slice(&value.to_le_bytes());
}
