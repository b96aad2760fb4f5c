use super::{ProtoError, check_dst, check_src, get_u16, get_u32, put_u16, put_u32};

pub const MAGIC: [u8; 4] = *b"MLED";
pub const PROTOCOL_VERSION: u8 = 1;
pub const HEADER_SIZE: usize = 32;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HeaderFlags: u8 {
        const TARGET_NODE = 0x01;
        const TARGET_GROUP = 0x02;
        const ACK_REQ = 0x04;

        const _ = !0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetMode {
    All = 0,
    Node = 1,
    Group = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Beacon,
    Hello,
    TimeReq,
    TimeResp,
    CuePrepare,
    CueFire,
    CueCancel,
    Ping,
    Pong,
    Ack,
    Unknown(u8),
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            0x01 => MessageType::Beacon,
            0x02 => MessageType::Hello,
            0x03 => MessageType::TimeReq,
            0x04 => MessageType::TimeResp,
            0x10 => MessageType::CuePrepare,
            0x11 => MessageType::CueFire,
            0x12 => MessageType::CueCancel,
            0x20 => MessageType::Ping,
            0x21 => MessageType::Pong,
            0x22 => MessageType::Ack,
            other => MessageType::Unknown(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Beacon => 0x01,
            MessageType::Hello => 0x02,
            MessageType::TimeReq => 0x03,
            MessageType::TimeResp => 0x04,
            MessageType::CuePrepare => 0x10,
            MessageType::CueFire => 0x11,
            MessageType::CueCancel => 0x12,
            MessageType::Ping => 0x20,
            MessageType::Pong => 0x21,
            MessageType::Ack => 0x22,
            MessageType::Unknown(other) => other,
        }
    }
}

/// Fixed 32-byte MLED/1 header.
///
/// ```text
/// 0       4   5    6     7      8        12      16        20      24          28          30
/// | magic | v | ty | flg | hlen | epoch  | msgid | sender  | target| execute_at| payload_len| rsvd |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 4],
    pub version: u8,
    pub msg_type: MessageType,
    pub flags: HeaderFlags,
    pub header_len: u8,
    pub epoch_id: u32,
    pub msg_id: u32,
    pub sender_id: u32,
    pub target: u32,
    pub execute_at_ms: u32,
    pub payload_len: u16,
    pub reserved: u16,
}

impl Header {
    pub fn new(msg_type: MessageType) -> Self {
        Self {
            magic: MAGIC,
            version: PROTOCOL_VERSION,
            msg_type,
            flags: HeaderFlags::empty(),
            header_len: HEADER_SIZE as u8,
            epoch_id: 0,
            msg_id: 0,
            sender_id: 0,
            target: 0,
            execute_at_ms: 0,
            payload_len: 0,
            reserved: 0,
        }
    }

    /// Returns `None` when both target bits are set.
    pub fn target_mode(&self) -> Option<TargetMode> {
        match (
            self.flags.contains(HeaderFlags::TARGET_NODE),
            self.flags.contains(HeaderFlags::TARGET_GROUP),
        ) {
            (false, false) => Some(TargetMode::All),
            (true, false) => Some(TargetMode::Node),
            (false, true) => Some(TargetMode::Group),
            (true, true) => None,
        }
    }

    pub fn set_target_mode(&mut self, mode: TargetMode) {
        self.flags.set(HeaderFlags::TARGET_NODE, mode == TargetMode::Node);
        self.flags.set(HeaderFlags::TARGET_GROUP, mode == TargetMode::Group);
    }

    #[inline]
    pub fn ack_requested(&self) -> bool {
        self.flags.contains(HeaderFlags::ACK_REQ)
    }

    #[inline]
    pub fn set_ack_requested(&mut self, requested: bool) {
        self.flags.set(HeaderFlags::ACK_REQ, requested);
    }

    pub fn validate(&self) -> Result<(), ProtoError> {
        if self.magic != MAGIC {
            return Err(ProtoError::BadMagic(self.magic));
        }
        if self.version != PROTOCOL_VERSION {
            return Err(ProtoError::BadVersion(self.version));
        }
        if self.header_len as usize != HEADER_SIZE {
            return Err(ProtoError::BadHeaderLen(self.header_len));
        }
        Ok(())
    }

    /// Decodes and validates the first [`HEADER_SIZE`] bytes of `src`.
    pub fn decode(src: &[u8]) -> Result<Self, ProtoError> {
        check_src("header", HEADER_SIZE, src)?;

        let header = Self {
            magic: [src[0], src[1], src[2], src[3]],
            version: src[4],
            msg_type: MessageType::from(src[5]),
            flags: HeaderFlags::from_bits_retain(src[6]),
            header_len: src[7],
            epoch_id: get_u32(src, 8),
            msg_id: get_u32(src, 12),
            sender_id: get_u32(src, 16),
            target: get_u32(src, 20),
            execute_at_ms: get_u32(src, 24),
            payload_len: get_u16(src, 28),
            reserved: get_u16(src, 30),
        };
        header.validate()?;
        Ok(header)
    }

    pub fn encode_into(&self, dst: &mut [u8]) -> Result<(), ProtoError> {
        check_dst("header", HEADER_SIZE, dst)?;

        dst[0..4].copy_from_slice(&self.magic);
        dst[4] = self.version;
        dst[5] = u8::from(self.msg_type);
        dst[6] = self.flags.bits();
        dst[7] = self.header_len;
        put_u32(dst, 8, self.epoch_id);
        put_u32(dst, 12, self.msg_id);
        put_u32(dst, 16, self.sender_id);
        put_u32(dst, 20, self.target);
        put_u32(dst, 24, self.execute_at_ms);
        put_u16(dst, 28, self.payload_len);
        put_u16(dst, 30, self.reserved);
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        // Infallible: the destination is exactly HEADER_SIZE.
        let _ = self.encode_into(&mut out);
        out
    }
}
