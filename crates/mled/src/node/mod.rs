mod registry;

pub use registry::{NodeRegistry, Upsert};

use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::proto::Pong;

/// Nodes not heard from for this long are reported `weak` regardless of RSSI.
pub const WEAK_AFTER: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Weak,
    Offline,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Online => "online",
            NodeStatus::Weak => "weak",
            NodeStatus::Offline => "offline",
        }
    }
}

pub fn derive_status(
    now: Instant,
    last_seen: Instant,
    rssi_dbm: i32,
    weak_rssi_dbm: i32,
    offline_after: Duration,
) -> NodeStatus {
    let age = now.saturating_duration_since(last_seen);
    if age >= offline_after {
        NodeStatus::Offline
    } else if age >= WEAK_AFTER || rssi_dbm < weak_rssi_dbm {
        NodeStatus::Weak
    } else {
        NodeStatus::Online
    }
}

/// Canonical 8-digit uppercase hex form of a node id.
pub fn format_node_id(node_id: u32) -> String {
    format!("{node_id:08X}")
}

/// Accepts hex with or without a `0x` prefix.
pub fn parse_node_id(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub node_id: u32,
    pub addr: SocketAddr,
    pub last_seen: Instant,
    pub last_seen_wall: SystemTime,
    pub telemetry: Pong,
    /// Set by the offline sweep, cleared by the next telemetry.
    pub offline: bool,
}

impl NodeRecord {
    pub fn new(node_id: u32, addr: SocketAddr, telemetry: Pong) -> Self {
        Self {
            node_id,
            addr,
            last_seen: Instant::now(),
            last_seen_wall: SystemTime::now(),
            telemetry,
            offline: false,
        }
    }

    pub fn status(&self, now: Instant, weak_rssi_dbm: i32, offline_after: Duration) -> NodeStatus {
        derive_status(
            now,
            self.last_seen,
            i32::from(self.telemetry.rssi_dbm),
            weak_rssi_dbm,
            offline_after,
        )
    }

    pub fn display_name(&self) -> String {
        let name = self.telemetry.name_str();
        if name.is_empty() {
            format_node_id(self.node_id)
        } else {
            name
        }
    }

    pub fn to_dto(&self, now: Instant, weak_rssi_dbm: i32, offline_after: Duration) -> NodeDto {
        let last_seen = self
            .last_seen_wall
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        NodeDto {
            node_id: format_node_id(self.node_id),
            name: self.display_name(),
            ip: self.addr.ip().to_string(),
            port: self.addr.port(),
            rssi: i32::from(self.telemetry.rssi_dbm),
            uptime_ms: self.telemetry.uptime_ms,
            last_seen,
            current_pattern: CurrentPattern::from_telemetry(&self.telemetry),
            status: self.status(now, weak_rssi_dbm, offline_after),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentPattern {
    #[serde(rename = "type")]
    pub kind: String,
    pub brightness: u8,
    pub params: Map<String, Value>,
}

impl CurrentPattern {
    /// `None` when the node reports a pattern type this controller doesn't know.
    pub fn from_telemetry(pong: &Pong) -> Option<Self> {
        pong.pattern_type.name().map(|name| Self {
            kind: name.to_string(),
            brightness: pong.brightness_pct,
            params: Map::new(),
        })
    }
}

/// Display form of a node, as handed to the API layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDto {
    pub node_id: String,
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub rssi: i32,
    pub uptime_ms: u32,
    /// Unix epoch milliseconds.
    pub last_seen: i64,
    pub current_pattern: Option<CurrentPattern>,
    pub status: NodeStatus,
}
