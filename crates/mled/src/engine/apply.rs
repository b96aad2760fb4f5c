use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::{Engine, EngineError, lock, read};
use crate::node::{format_node_id, parse_node_id};
use crate::pattern::{PatternSpec, build_wire_pattern};
use crate::proto::{CueFire, CuePrepare, MessageType, PatternConfig, TargetMode, encode_packet};

/// How far ahead of "now" the fire is scheduled, in show-time milliseconds.
pub const FIRE_LEAD_MS: u32 = 50;
/// Number of identical `CUE_FIRE` datagrams per cue.
pub const FIRE_REPEAT: usize = 3;
pub const FIRE_GAP: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Targets {
    /// Every node whose derived status is not offline.
    All,
    /// Hex node ids, with or without a `0x` prefix.
    Nodes(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyRequest {
    pub targets: Targets,
    pub pattern: PatternConfig,
    pub fade_in_ms: u16,
    pub fade_out_ms: u16,
}

impl ApplyRequest {
    pub fn new(targets: Targets, pattern: PatternConfig) -> Self {
        Self {
            targets,
            pattern,
            fade_in_ms: 0,
            fade_out_ms: 0,
        }
    }

    pub fn with_fades(mut self, fade_in_ms: u16, fade_out_ms: u16) -> Self {
        self.fade_in_ms = fade_in_ms;
        self.fade_out_ms = fade_out_ms;
        self
    }
}

/// Which nodes were sent a prepare and which explicit targets were skipped.
/// Acks are not awaited; they arrive later as `apply.ack` events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub sent_to: Vec<String>,
    pub failed: Vec<String>,
}

impl Engine {
    /// Prepares each target individually, then broadcasts the fire
    /// [`FIRE_REPEAT`] times for [`FIRE_LEAD_MS`] in the future.
    pub async fn apply(&self, request: ApplyRequest) -> Result<ApplyResult, EngineError> {
        let (targets, failed) = self.resolve_targets(&request.targets)?;
        if targets.is_empty() {
            log::debug!("apply skipped: no reachable targets ({} failed)", failed.len());
            return Ok(ApplyResult {
                sent_to: Vec::new(),
                failed,
            });
        }
        if read(&self.transport).is_none() {
            return Err(EngineError::NotRunning);
        }

        let cue_id: u32 = rand::random();
        let prepare = CuePrepare {
            cue_id,
            fade_in_ms: request.fade_in_ms,
            fade_out_ms: request.fade_out_ms,
            pattern: request.pattern,
        };

        for &node_id in &targets {
            if let Err(e) = self.send_cue_prepare(node_id, &prepare).await {
                self.report_error(format!(
                    "cue prepare to {} failed: {}",
                    format_node_id(node_id),
                    e
                ));
            }
        }

        let execute_at = self.show_ms().wrapping_add(FIRE_LEAD_MS);
        let mut fire_errors = 0;
        for _ in 0..FIRE_REPEAT {
            if self.send_cue_fire(cue_id, execute_at).await.is_err() {
                fire_errors += 1;
            }
            tokio::time::sleep(FIRE_GAP).await;
        }
        if fire_errors == FIRE_REPEAT {
            log::warn!("every cue fire for {:08X} failed to send", cue_id);
        }

        log::info!(
            "cue {:08X} ({:?}) prepared on {} nodes, fires at {} ({} failed)",
            cue_id,
            request.pattern.pattern_type,
            targets.len(),
            execute_at,
            failed.len()
        );

        Ok(ApplyResult {
            sent_to: targets.into_iter().map(format_node_id).collect(),
            failed,
        })
    }

    /// Translates `spec` and applies it with no fades.
    pub async fn apply_pattern(
        &self,
        targets: Targets,
        spec: &PatternSpec,
    ) -> Result<ApplyResult, EngineError> {
        let pattern = build_wire_pattern(spec)?;
        self.apply(ApplyRequest::new(targets, pattern)).await
    }

    /// Splits targets into reachable ids and failed display ids. An id that
    /// does not parse fails the whole call.
    pub(crate) fn resolve_targets(
        &self,
        targets: &Targets,
    ) -> Result<(Vec<u32>, Vec<String>), EngineError> {
        let config = self.config();
        let now = Instant::now();
        let nodes = read(&self.nodes);

        match targets {
            Targets::All => Ok((
                nodes.reachable_ids(now, config.weak_rssi_dbm, config.offline_threshold),
                Vec::new(),
            )),
            Targets::Nodes(ids) => {
                let mut reachable = Vec::with_capacity(ids.len());
                let mut failed = Vec::new();
                for text in ids {
                    let node_id = parse_node_id(text)
                        .ok_or_else(|| EngineError::InvalidNodeId(text.clone()))?;
                    if nodes.is_reachable(
                        node_id,
                        now,
                        config.weak_rssi_dbm,
                        config.offline_threshold,
                    ) {
                        if !reachable.contains(&node_id) {
                            reachable.push(node_id);
                        }
                    } else {
                        let display = format_node_id(node_id);
                        if !failed.contains(&display) {
                            failed.push(display);
                        }
                    }
                }
                Ok((reachable, failed))
            }
        }
    }

    /// Tracks the ack before sending.
    async fn send_cue_prepare(&self, node_id: u32, prepare: &CuePrepare) -> Result<(), EngineError> {
        let mut header = self.header(MessageType::CuePrepare, TargetMode::Node, node_id);
        header.set_ack_requested(true);
        let packet = encode_packet(&header, prepare)?;

        lock(&self.acks).track(header.msg_id, node_id);
        self.send_multicast(&packet).await
    }

    async fn send_cue_fire(&self, cue_id: u32, execute_at: u32) -> Result<(), EngineError> {
        let mut header = self.header(MessageType::CueFire, TargetMode::All, 0);
        header.execute_at_ms = execute_at;
        let packet = encode_packet(&header, &CueFire { cue_id })?;
        self.send_multicast(&packet).await
    }
}
