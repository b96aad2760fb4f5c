use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime};

use super::{NodeDto, NodeRecord, NodeStatus};
use crate::proto::Pong;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
    /// The node had been swept offline and is reporting again.
    Recovered,
}

/// Nodes known to the controller, keyed by node id.
///
/// Records are never removed; offline nodes stay listed until the engine is
/// dropped.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: HashMap<u32, NodeRecord>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records fresh telemetry from `addr`, creating the node on first sight.
    pub fn upsert(
        &mut self,
        node_id: u32,
        addr: SocketAddr,
        telemetry: Pong,
        now: Instant,
        wall: SystemTime,
    ) -> Upsert {
        match self.nodes.get_mut(&node_id) {
            Some(record) => {
                let was_offline = record.offline;
                record.addr = addr;
                record.telemetry = telemetry;
                record.last_seen = now;
                record.last_seen_wall = wall;
                record.offline = false;
                if was_offline {
                    Upsert::Recovered
                } else {
                    Upsert::Updated
                }
            }
            None => {
                let mut record = NodeRecord::new(node_id, addr, telemetry);
                record.last_seen = now;
                record.last_seen_wall = wall;
                self.nodes.insert(node_id, record);
                Upsert::Created
            }
        }
    }

    pub fn get(&self, node_id: u32) -> Option<&NodeRecord> {
        self.nodes.get(&node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }

    /// Display snapshot ordered by node id.
    pub fn snapshot(&self, now: Instant, weak_rssi_dbm: i32, offline_after: Duration) -> Vec<NodeDto> {
        let mut records: Vec<&NodeRecord> = self.nodes.values().collect();
        records.sort_by_key(|r| r.node_id);
        records
            .into_iter()
            .map(|r| r.to_dto(now, weak_rssi_dbm, offline_after))
            .collect()
    }

    /// Flags nodes silent for at least `offline_after`. Returns only the ids
    /// that transitioned on this call, in ascending order.
    pub fn sweep_offline(&mut self, now: Instant, offline_after: Duration) -> Vec<u32> {
        let mut flagged: Vec<u32> = self
            .nodes
            .values_mut()
            .filter(|r| !r.offline && now.saturating_duration_since(r.last_seen) >= offline_after)
            .map(|r| {
                r.offline = true;
                r.node_id
            })
            .collect();
        flagged.sort_unstable();
        flagged
    }

    /// Ids whose derived status is not offline, ascending.
    pub fn reachable_ids(&self, now: Instant, weak_rssi_dbm: i32, offline_after: Duration) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .nodes
            .values()
            .filter(|r| r.status(now, weak_rssi_dbm, offline_after) != NodeStatus::Offline)
            .map(|r| r.node_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_reachable(
        &self,
        node_id: u32,
        now: Instant,
        weak_rssi_dbm: i32,
        offline_after: Duration,
    ) -> bool {
        self.nodes
            .get(&node_id)
            .is_some_and(|r| r.status(now, weak_rssi_dbm, offline_after) != NodeStatus::Offline)
    }
}
