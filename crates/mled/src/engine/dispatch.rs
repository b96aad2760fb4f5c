use std::net::SocketAddr;
use std::time::{Instant, SystemTime};

use super::{Engine, EngineEvent, lock, write};
use crate::node::{Upsert, format_node_id};
use crate::proto::{
    Ack, HEADER_SIZE, Header, MessageType, Pong, TargetMode, TimeResp, WirePayload, encode_packet,
};

impl Engine {
    /// Routes one received datagram. Returns a reply to unicast back to the
    /// sender, if the message calls for one.
    pub(crate) fn handle_datagram(&self, datagram: &[u8], from: SocketAddr) -> Option<Vec<u8>> {
        if datagram.len() < HEADER_SIZE {
            self.stats.record_dropped();
            return None;
        }

        let header = match Header::decode(datagram) {
            Ok(header) => header,
            Err(e) => {
                log::trace!("dropping datagram from {}: {}", from, e);
                self.stats.record_dropped();
                return None;
            }
        };

        let end = HEADER_SIZE + usize::from(header.payload_len);
        if end > datagram.len() {
            log::trace!(
                "dropping truncated {:?} from {}: {} of {} bytes",
                header.msg_type,
                from,
                datagram.len(),
                end
            );
            self.stats.record_dropped();
            return None;
        }

        self.stats.record_received(datagram.len());
        let payload = &datagram[HEADER_SIZE..end];

        match header.msg_type {
            MessageType::Pong => {
                self.handle_pong(&header, payload, from);
                None
            }
            MessageType::Ack => {
                self.handle_ack(payload);
                None
            }
            MessageType::TimeReq => self.time_response(&header),
            _ => None,
        }
    }

    fn handle_pong(&self, header: &Header, payload: &[u8], from: SocketAddr) {
        let Ok(pong) = Pong::decode(payload) else {
            return;
        };

        let config = self.config();
        let now = Instant::now();
        let (outcome, dto) = {
            let mut nodes = write(&self.nodes);
            let outcome = nodes.upsert(header.sender_id, from, pong, now, SystemTime::now());
            let dto = nodes
                .get(header.sender_id)
                .map(|r| r.to_dto(now, config.weak_rssi_dbm, config.offline_threshold));
            (outcome, dto)
        };

        let Some(dto) = dto else {
            return;
        };
        match outcome {
            Upsert::Created => log::info!("discovered node {} ({}) at {}", dto.node_id, dto.name, from),
            Upsert::Recovered => log::info!("node {} back online", dto.node_id),
            Upsert::Updated => {}
        }
        self.emit(EngineEvent::NodeUpdate(dto));
    }

    fn handle_ack(&self, payload: &[u8]) {
        let Ok(ack) = Ack::decode(payload) else {
            return;
        };

        let Some(node_id) = lock(&self.acks).take(ack.ack_for_msg_id) else {
            return;
        };

        let node_id = format_node_id(node_id);
        if ack.code != 0 {
            log::warn!("node {} rejected message {} with code {}", node_id, ack.ack_for_msg_id, ack.code);
        }
        self.emit(EngineEvent::ApplyAck {
            node_id,
            success: ack.code == 0,
        });
    }

    /// Requests carrying another controller's epoch get no answer.
    fn time_response(&self, request: &Header) -> Option<Vec<u8>> {
        if request.epoch_id != self.epoch_id {
            return None;
        }

        let received_at = self.show_ms();
        let header = self.header(MessageType::TimeResp, TargetMode::Node, request.sender_id);
        let response = TimeResp {
            req_msg_id: request.msg_id,
            master_rx_show_ms: received_at,
            master_tx_show_ms: self.show_ms(),
        };
        encode_packet(&header, &response).ok()
    }
}
