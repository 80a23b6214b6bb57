//! `GetSystemStats` (§6): an aggregate snapshot across Membership and
//! the Metadata Store, computed on demand rather than maintained
//! incrementally — this runs far less often than any hot path.

use meshvault_core::NodeStatus;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SystemStats {
    pub nodes_total: usize,
    pub nodes_healthy: usize,
    pub nodes_degraded: usize,
    pub nodes_failed: usize,
    pub chunks_total: usize,
    pub under_replicated: usize,
    pub storage_capacity: u64,
    pub storage_used: u64,
}

impl SystemStats {
    pub fn record_node(&mut self, status: NodeStatus, capacity: u64, used: u64) {
        self.nodes_total += 1;
        match status {
            NodeStatus::Online => self.nodes_healthy += 1,
            NodeStatus::Degraded => self.nodes_degraded += 1,
            NodeStatus::Failed => self.nodes_failed += 1,
            NodeStatus::Unknown => {}
        }
        self.storage_capacity += capacity;
        self.storage_used += used;
    }
}
