use std::collections::HashMap;

/// Outstanding ack-requested messages, keyed by controller message id.
///
/// Entries leave only when their ack arrives or the table is cleared on
/// start. Nodes that never answer leave their entries behind.
#[derive(Debug, Default)]
pub struct AckTable {
    pending: HashMap<u32, u32>,
}

impl AckTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, msg_id: u32, node_id: u32) {
        self.pending.insert(msg_id, node_id);
    }

    /// Removes and returns the node an ack for `msg_id` belongs to.
    pub fn take(&mut self, msg_id: u32) -> Option<u32> {
        self.pending.remove(&msg_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
