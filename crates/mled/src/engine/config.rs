use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::EngineError;
use crate::proto::{DEFAULT_MULTICAST_GROUP, DEFAULT_MULTICAST_PORT};

pub const DEFAULT_OFFLINE_THRESHOLD: Duration = Duration::from_secs(30);

/// Persisted controller settings, in the shape the settings store writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_ip: String,
    pub multicast_group: String,
    pub multicast_port: u16,
    pub discovery_interval_ms: u64,
    pub offline_threshold_s: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_ip: "auto".to_string(),
            multicast_group: DEFAULT_MULTICAST_GROUP.to_string(),
            multicast_port: DEFAULT_MULTICAST_PORT,
            discovery_interval_ms: 1000,
            offline_threshold_s: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// `""`/`"auto"` binds the wildcard address.
    pub bind_ip: String,
    /// Explicit interface name; overrides bind-ip based selection.
    pub interface: Option<String>,
    pub multicast_group: String,
    pub multicast_port: u16,
    pub multicast_ttl: u32,
    /// Zero disables the discovery ping task.
    pub discovery_interval: Duration,
    pub offline_threshold: Duration,
    /// Zero disables the beacon task.
    pub beacon_interval: Duration,
    pub weak_rssi_dbm: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_ip: "auto".to_string(),
            interface: None,
            multicast_group: DEFAULT_MULTICAST_GROUP.to_string(),
            multicast_port: DEFAULT_MULTICAST_PORT,
            multicast_ttl: 1,
            discovery_interval: Duration::from_millis(1000),
            offline_threshold: DEFAULT_OFFLINE_THRESHOLD,
            beacon_interval: Duration::from_millis(500),
            weak_rssi_dbm: -70,
        }
    }
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            bind_ip: settings.bind_ip.clone(),
            multicast_group: settings.multicast_group.clone(),
            multicast_port: settings.multicast_port,
            discovery_interval: Duration::from_millis(settings.discovery_interval_ms),
            offline_threshold: Duration::from_secs(settings.offline_threshold_s),
            ..Self::default()
        }
    }

    pub(crate) fn normalized(mut self) -> Self {
        if self.offline_threshold.is_zero() {
            self.offline_threshold = DEFAULT_OFFLINE_THRESHOLD;
        }
        self
    }

    pub fn group_addr(&self) -> Result<Ipv4Addr, EngineError> {
        let group: Ipv4Addr = self
            .multicast_group
            .trim()
            .parse()
            .map_err(|_| EngineError::InvalidGroup(self.multicast_group.clone()))?;
        if !group.is_multicast() {
            return Err(EngineError::InvalidGroup(self.multicast_group.clone()));
        }
        Ok(group)
    }

    /// `None` means bind the wildcard address.
    pub fn bind_addr(&self) -> Result<Option<Ipv4Addr>, EngineError> {
        match normalize_bind_ip(&self.bind_ip) {
            None => Ok(None),
            Some(ip) => ip
                .parse()
                .map(Some)
                .map_err(|_| EngineError::InvalidBindIp(self.bind_ip.clone())),
        }
    }
}

/// Reduces a bind-ip setting to a bare address.
///
/// Accepts the labels the interface picker produces, such as
/// `"eth0: 192.168.1.5"` and `"eth0:192.168.1.5"`. Returns `None` for
/// `""` and `"auto"`.
pub fn normalize_bind_ip(value: &str) -> Option<&str> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("auto") {
        return None;
    }

    if let Some((_, candidate)) = value.rsplit_once(' ') {
        if candidate.parse::<IpAddr>().is_ok() {
            return Some(candidate);
        }
    }

    if value.contains(':') && value.parse::<IpAddr>().is_err() {
        let mut parts = value.split(':');
        if let (Some(_), Some(ip), None) = (parts.next(), parts.next(), parts.next()) {
            if ip.parse::<IpAddr>().is_ok() {
                return Some(ip);
            }
        }
    }

    Some(value)
}
