//! Membership & Health (§4.2): tracks every known peer's liveness, probes
//! on a fixed heartbeat, and notifies the Replica Manager when a node
//! fails — via a message channel, never a direct call back into it, per
//! §9's "typed handles + message channel" design note.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use meshvault_core::{NodeId, NodeRecord, NodeStatus};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use meshvault_transport::{ProbeResult, TransportAdapter, DEFAULT_PROBE_TIMEOUT};

/// Default heartbeat interval (§4.2).
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
/// A node is treated as at least degraded once its last heartbeat is
/// older than this, regardless of failure count (§4.2).
pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(60);
/// Consecutive probe failures before a degraded node is marked failed.
const FAILURE_THRESHOLD: u32 = 3;

/// Emitted when a node transitions into `Failed`. Delivered at-least-once
/// (§5); the Replica Manager's handler must be idempotent.
#[derive(Clone, Debug)]
pub struct NodeFailureEvent {
    pub node_id: NodeId,
}

/// Apply one probe outcome to `(status, failure_count)`, returning the new
/// state. Pure so the state machine in §4.2's diagram is testable without
/// any async machinery.
pub fn transition(status: NodeStatus, failure_count: u32, probe_ok: bool) -> (NodeStatus, u32) {
    match (status, probe_ok) {
        (NodeStatus::Unknown, true) => (NodeStatus::Online, 0),
        (NodeStatus::Unknown, false) => (NodeStatus::Degraded, 1),
        (NodeStatus::Online, true) => (NodeStatus::Online, 0),
        (NodeStatus::Online, false) => (NodeStatus::Degraded, 1),
        (NodeStatus::Degraded, true) => (NodeStatus::Online, 0),
        (NodeStatus::Degraded, false) => {
            let failures = failure_count + 1;
            if failures >= FAILURE_THRESHOLD {
                (NodeStatus::Failed, failures)
            } else {
                (NodeStatus::Degraded, failures)
            }
        }
        (NodeStatus::Failed, true) => (NodeStatus::Online, 0),
        (NodeStatus::Failed, false) => (NodeStatus::Failed, failure_count + 1),
    }
}

/// Concurrent NodeID → NodeRecord map. A single `DashMap` satisfies §5's
/// "membership map: a single reader-writer lock" since `DashMap` shards an
/// internal `RwLock` per bucket rather than layering a coarser lock.
#[derive(Clone)]
pub struct MembershipTable {
    nodes: Arc<DashMap<NodeId, NodeRecord>>,
    failure_tx: mpsc::Sender<NodeFailureEvent>,
}

impl MembershipTable {
    pub fn new(failure_tx: mpsc::Sender<NodeFailureEvent>) -> Self {
        Self {
            nodes: Arc::new(DashMap::new()),
            failure_tx,
        }
    }

    /// Register a node on first observation (§3: "created on first
    /// observation; retained across restarts"). A no-op if already known.
    pub fn register(&self, node_id: NodeId, address: String, port: u16) {
        self.nodes.entry(node_id.clone()).or_insert_with(|| NodeRecord {
            node_id,
            address,
            port,
            last_seen: Utc::now(),
            status: NodeStatus::Unknown,
            capacity: 0,
            used: 0,
            chunk_count: 0,
            latency_seconds: 0.0,
            failure_count: 0,
        });
    }

    /// Apply the outcome of one probe, transitioning status and emitting
    /// [`NodeFailureEvent`] on `healthy → failed` (§4.2).
    #[instrument(skip(self))]
    pub async fn record_probe_result(&self, node_id: &NodeId, probe_ok: bool, latency_seconds: f64) {
        let transitioned_to_failed = {
            let mut entry = match self.nodes.get_mut(node_id) {
                Some(entry) => entry,
                None => return,
            };
            let (new_status, new_count) = transition(entry.status, entry.failure_count, probe_ok);
            let was_failed = entry.status == NodeStatus::Failed;
            entry.status = new_status;
            entry.failure_count = new_count;
            if probe_ok {
                entry.last_seen = Utc::now();
                entry.latency_seconds = latency_seconds;
            }
            new_status == NodeStatus::Failed && !was_failed
        };

        if transitioned_to_failed {
            tracing::warn!(node_id = %node_id, "node marked failed");
            let _ = self
                .failure_tx
                .send(NodeFailureEvent {
                    node_id: node_id.clone(),
                })
                .await;
        }
    }

    /// Report updated capacity/usage for a node, as self-reported by the
    /// node itself. Independent of the probe-driven health transitions.
    pub fn record_capacity(&self, node_id: &NodeId, capacity: u64, used: u64, chunk_count: u64) {
        if let Some(mut entry) = self.nodes.get_mut(node_id) {
            entry.capacity = capacity;
            entry.used = used;
            entry.chunk_count = chunk_count;
        }
    }

    /// Apply the "stale heartbeat" timeout rule: an `Online` node whose
    /// last heartbeat is older than `node_timeout` is treated as at least
    /// `Degraded`, independent of `failure_count` (§4.2). Does not touch
    /// `Degraded`/`Failed` nodes, which are already at or below that floor.
    pub fn apply_timeout_decay(&self, node_timeout: Duration) {
        let now = Utc::now();
        for mut entry in self.nodes.iter_mut() {
            if entry.status == NodeStatus::Online {
                let age = now.signed_duration_since(entry.last_seen);
                if age.num_seconds() as u64 > node_timeout.as_secs() {
                    entry.status = NodeStatus::Degraded;
                }
            }
        }
    }

    pub fn snapshot(&self, node_id: &NodeId) -> Option<NodeRecord> {
        self.nodes.get(node_id).map(|e| e.clone())
    }

    pub fn snapshot_all(&self) -> Vec<NodeRecord> {
        self.nodes.iter().map(|e| e.clone()).collect()
    }

    pub fn healthy_nodes(&self) -> Vec<NodeRecord> {
        self.nodes
            .iter()
            .filter(|e| e.status == NodeStatus::Online)
            .map(|e| e.clone())
            .collect()
    }
}

/// Spawn the heartbeat ticker: probes every known node once per
/// `interval`, feeding results back into `table`. Stoppable via `token`
/// rather than running forever with no exit path (§9 Design Notes).
pub fn spawn_heartbeat_ticker(
    table: MembershipTable,
    transport: Arc<dyn TransportAdapter>,
    interval: Duration,
    node_timeout: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("heartbeat ticker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    for node in table.snapshot_all() {
                        let result = transport.probe(&node.node_id, DEFAULT_PROBE_TIMEOUT).await;
                        apply_probe_outcome(&table, &node.node_id, result).await;
                    }
                    table.apply_timeout_decay(node_timeout);
                }
            }
        }
    })
}

async fn apply_probe_outcome(
    table: &MembershipTable,
    node_id: &NodeId,
    result: meshvault_transport::Result<ProbeResult>,
) {
    match result {
        Ok(probe) => {
            table
                .record_probe_result(node_id, true, probe.latency.as_secs_f64())
                .await
        }
        Err(_) => table.record_probe_result(node_id, false, 0.0).await,
    }
}
