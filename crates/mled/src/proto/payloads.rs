use super::header::{HEADER_SIZE, Header};
use super::{ProtoError, check_dst, check_src, get_u16, get_u32, put_u16, put_u32};

pub const PATTERN_DATA_LEN: usize = 12;

const NAME_LEN: usize = 16;
const PONG_RESERVED_LEN: usize = 5;

/// Fixed-size payload codec. Decoding never reads past `SIZE` bytes and
/// always yields an owned copy.
pub trait WirePayload: Sized {
    const SIZE: usize;
    const NAME: &'static str;

    fn encode_into(&self, dst: &mut [u8]) -> Result<(), ProtoError>;

    fn decode(src: &[u8]) -> Result<Self, ProtoError>;
}

/// Builds a complete datagram, setting `payload_len` from the payload size.
pub fn encode_packet<P: WirePayload>(header: &Header, payload: &P) -> Result<Vec<u8>, ProtoError> {
    let mut header = *header;
    header.payload_len = P::SIZE as u16;

    let mut buf = vec![0u8; HEADER_SIZE + P::SIZE];
    header.encode_into(&mut buf[..HEADER_SIZE])?;
    payload.encode_into(&mut buf[HEADER_SIZE..])?;
    Ok(buf)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PatternType {
    #[default]
    Off,
    Rainbow,
    Chase,
    Breathing,
    Sparkle,
    Unknown(u8),
}

impl PatternType {
    pub fn name(&self) -> Option<&'static str> {
        match self {
            PatternType::Off => Some("off"),
            PatternType::Rainbow => Some("rainbow"),
            PatternType::Chase => Some("chase"),
            PatternType::Breathing => Some("breathing"),
            PatternType::Sparkle => Some("sparkle"),
            PatternType::Unknown(_) => None,
        }
    }
}

impl From<u8> for PatternType {
    fn from(value: u8) -> Self {
        match value {
            0 => PatternType::Off,
            1 => PatternType::Rainbow,
            2 => PatternType::Chase,
            3 => PatternType::Breathing,
            4 => PatternType::Sparkle,
            other => PatternType::Unknown(other),
        }
    }
}

impl From<PatternType> for u8 {
    fn from(value: PatternType) -> Self {
        match value {
            PatternType::Off => 0,
            PatternType::Rainbow => 1,
            PatternType::Chase => 2,
            PatternType::Breathing => 3,
            PatternType::Sparkle => 4,
            PatternType::Unknown(other) => other,
        }
    }
}

/// 20-byte pattern description; `data` is interpreted per pattern type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatternConfig {
    pub pattern_type: PatternType,
    pub brightness_pct: u8,
    pub flags: u8,
    pub reserved: u8,
    pub seed: u32,
    pub data: [u8; PATTERN_DATA_LEN],
}

impl WirePayload for PatternConfig {
    const SIZE: usize = 20;
    const NAME: &'static str = "pattern config";

    fn encode_into(&self, dst: &mut [u8]) -> Result<(), ProtoError> {
        check_dst(Self::NAME, Self::SIZE, dst)?;
        dst[0] = u8::from(self.pattern_type);
        dst[1] = self.brightness_pct;
        dst[2] = self.flags;
        dst[3] = self.reserved;
        put_u32(dst, 4, self.seed);
        dst[8..20].copy_from_slice(&self.data);
        Ok(())
    }

    fn decode(src: &[u8]) -> Result<Self, ProtoError> {
        check_src(Self::NAME, Self::SIZE, src)?;
        let mut data = [0u8; PATTERN_DATA_LEN];
        data.copy_from_slice(&src[8..20]);
        Ok(Self {
            pattern_type: PatternType::from(src[0]),
            brightness_pct: src[1],
            flags: src[2],
            reserved: src[3],
            seed: get_u32(src, 4),
            data,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CuePrepare {
    pub cue_id: u32,
    pub fade_in_ms: u16,
    pub fade_out_ms: u16,
    pub pattern: PatternConfig,
}

impl WirePayload for CuePrepare {
    const SIZE: usize = 28;
    const NAME: &'static str = "cue prepare";

    fn encode_into(&self, dst: &mut [u8]) -> Result<(), ProtoError> {
        check_dst(Self::NAME, Self::SIZE, dst)?;
        put_u32(dst, 0, self.cue_id);
        put_u16(dst, 4, self.fade_in_ms);
        put_u16(dst, 6, self.fade_out_ms);
        self.pattern.encode_into(&mut dst[8..Self::SIZE])
    }

    fn decode(src: &[u8]) -> Result<Self, ProtoError> {
        check_src(Self::NAME, Self::SIZE, src)?;
        Ok(Self {
            cue_id: get_u32(src, 0),
            fade_in_ms: get_u16(src, 4),
            fade_out_ms: get_u16(src, 6),
            pattern: PatternConfig::decode(&src[8..Self::SIZE])?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CueFire {
    pub cue_id: u32,
}

impl WirePayload for CueFire {
    const SIZE: usize = 4;
    const NAME: &'static str = "cue fire";

    fn encode_into(&self, dst: &mut [u8]) -> Result<(), ProtoError> {
        check_dst(Self::NAME, Self::SIZE, dst)?;
        put_u32(dst, 0, self.cue_id);
        Ok(())
    }

    fn decode(src: &[u8]) -> Result<Self, ProtoError> {
        check_src(Self::NAME, Self::SIZE, src)?;
        Ok(Self {
            cue_id: get_u32(src, 0),
        })
    }
}

/// Node telemetry, sent in reply to `PING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pong {
    pub uptime_ms: u32,
    pub rssi_dbm: i8,
    pub state_flags: u8,
    pub brightness_pct: u8,
    pub pattern_type: PatternType,
    pub frame_ms: u16,
    pub active_cue_id: u32,
    pub controller_epoch: u32,
    pub show_ms: u32,
    pub name: [u8; NAME_LEN],
    pub reserved: [u8; PONG_RESERVED_LEN],
}

impl Pong {
    /// Name field up to the first NUL, lossily decoded.
    pub fn name_str(&self) -> String {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_LEN);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    /// Sets the name field, truncating to 16 bytes.
    pub fn set_name(&mut self, name: &str) {
        self.name = [0u8; NAME_LEN];
        let bytes = name.as_bytes();
        let len = bytes.len().min(NAME_LEN);
        self.name[..len].copy_from_slice(&bytes[..len]);
    }
}

impl WirePayload for Pong {
    const SIZE: usize = 43;
    const NAME: &'static str = "pong";

    fn encode_into(&self, dst: &mut [u8]) -> Result<(), ProtoError> {
        check_dst(Self::NAME, Self::SIZE, dst)?;
        put_u32(dst, 0, self.uptime_ms);
        dst[4] = self.rssi_dbm as u8;
        dst[5] = self.state_flags;
        dst[6] = self.brightness_pct;
        dst[7] = u8::from(self.pattern_type);
        put_u16(dst, 8, self.frame_ms);
        put_u32(dst, 10, self.active_cue_id);
        put_u32(dst, 14, self.controller_epoch);
        put_u32(dst, 18, self.show_ms);
        dst[22..38].copy_from_slice(&self.name);
        dst[38..43].copy_from_slice(&self.reserved);
        Ok(())
    }

    fn decode(src: &[u8]) -> Result<Self, ProtoError> {
        check_src(Self::NAME, Self::SIZE, src)?;
        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&src[22..38]);
        let mut reserved = [0u8; PONG_RESERVED_LEN];
        reserved.copy_from_slice(&src[38..43]);
        Ok(Self {
            uptime_ms: get_u32(src, 0),
            rssi_dbm: src[4] as i8,
            state_flags: src[5],
            brightness_pct: src[6],
            pattern_type: PatternType::from(src[7]),
            frame_ms: get_u16(src, 8),
            active_cue_id: get_u32(src, 10),
            controller_epoch: get_u32(src, 14),
            show_ms: get_u32(src, 18),
            name,
            reserved,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ack {
    pub ack_for_msg_id: u32,
    /// Zero means success.
    pub code: u16,
    pub reserved: u16,
}

impl WirePayload for Ack {
    const SIZE: usize = 8;
    const NAME: &'static str = "ack";

    fn encode_into(&self, dst: &mut [u8]) -> Result<(), ProtoError> {
        check_dst(Self::NAME, Self::SIZE, dst)?;
        put_u32(dst, 0, self.ack_for_msg_id);
        put_u16(dst, 4, self.code);
        put_u16(dst, 6, self.reserved);
        Ok(())
    }

    fn decode(src: &[u8]) -> Result<Self, ProtoError> {
        check_src(Self::NAME, Self::SIZE, src)?;
        Ok(Self {
            ack_for_msg_id: get_u32(src, 0),
            code: get_u16(src, 4),
            reserved: get_u16(src, 6),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeResp {
    pub req_msg_id: u32,
    pub master_rx_show_ms: u32,
    pub master_tx_show_ms: u32,
}

impl WirePayload for TimeResp {
    const SIZE: usize = 12;
    const NAME: &'static str = "time response";

    fn encode_into(&self, dst: &mut [u8]) -> Result<(), ProtoError> {
        check_dst(Self::NAME, Self::SIZE, dst)?;
        put_u32(dst, 0, self.req_msg_id);
        put_u32(dst, 4, self.master_rx_show_ms);
        put_u32(dst, 8, self.master_tx_show_ms);
        Ok(())
    }

    fn decode(src: &[u8]) -> Result<Self, ProtoError> {
        check_src(Self::NAME, Self::SIZE, src)?;
        Ok(Self {
            req_msg_id: get_u32(src, 0),
            master_rx_show_ms: get_u32(src, 4),
            master_tx_show_ms: get_u32(src, 8),
        })
    }
}
